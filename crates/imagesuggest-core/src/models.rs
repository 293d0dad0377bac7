//! Core data models for imagesuggest.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::defaults;

/// Page identifier (`page.page_id`).
pub type PageId = i64;

/// User identifier (`user.user_id`).
pub type UserId = i64;

// =============================================================================
// PAGES & USERS
// =============================================================================

/// A resolved wiki page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub namespace: i32,
    /// Database key form of the title (underscores, no namespace prefix).
    pub db_key: String,
}

impl Page {
    pub fn new(id: PageId, namespace: i32, db_key: impl Into<String>) -> Self {
        Self {
            id,
            namespace,
            db_key: db_key.into(),
        }
    }

    /// Human-readable title text (underscores replaced by spaces).
    pub fn text(&self) -> String {
        self.db_key.replace('_', " ")
    }
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
}

impl User {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

// =============================================================================
// SUGGESTIONS
// =============================================================================

/// One raw image suggestion row from the suggestion API.
///
/// A missing `section_heading` marks an article-level suggestion; section-level
/// suggestions carry the heading and their on-page `section_index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSuggestion {
    pub origin_wiki: String,
    pub image: String,
    /// Confidence score, 0-100.
    pub confidence: f64,
    #[serde(default)]
    pub section_heading: Option<String>,
    #[serde(default)]
    pub section_index: Option<i64>,
}

impl CandidateSuggestion {
    /// Article-level suggestion (no section).
    pub fn article(origin_wiki: &str, image: &str, confidence: f64) -> Self {
        Self {
            origin_wiki: origin_wiki.to_string(),
            image: image.to_string(),
            confidence,
            section_heading: None,
            section_index: None,
        }
    }

    /// Section-level suggestion.
    pub fn section(
        origin_wiki: &str,
        image: &str,
        confidence: f64,
        heading: &str,
        index: i64,
    ) -> Self {
        Self {
            origin_wiki: origin_wiki.to_string(),
            image: image.to_string(),
            confidence,
            section_heading: Some(heading.to_string()),
            section_index: Some(index),
        }
    }

    pub fn is_article_level(&self) -> bool {
        self.section_heading.is_none()
    }

    /// Deduplication key: article-level suggestions share `None`.
    pub fn section_key(&self) -> Option<&str> {
        self.section_heading.as_deref()
    }

    /// File page title of the suggested image, without namespace.
    pub fn file_title(&self) -> String {
        format!("{}:{}", defaults::FILE_NAMESPACE, self.image)
    }
}

/// A candidate that survived ranking, in display-priority order.
pub type RankedSuggestion = CandidateSuggestion;

/// Suggestion API response body.
///
/// Rows stay raw so that one malformed row does not discard the others.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestionsResponse {
    #[serde(default)]
    pub rows: Vec<JsonValue>,
}

/// One row of the instance-of API response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceOfRow {
    #[serde(default)]
    pub instance_of: Vec<String>,
}

/// Instance-of API response body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceOfResponse {
    #[serde(default)]
    pub rows: Vec<InstanceOfRow>,
}

impl InstanceOfResponse {
    /// Entity tags of the page (first row only).
    pub fn into_tags(self) -> Vec<String> {
        self.rows
            .into_iter()
            .next()
            .map(|row| row.instance_of)
            .unwrap_or_default()
    }
}

/// Everything fetched for one page's evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuggestionFetch {
    pub suggestions: Vec<CandidateSuggestion>,
    /// Instance-of entity tags; empty when not requested.
    pub instance_of: Vec<String>,
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// A notification to be created for one suggestion.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    /// Agent of the event; also its recipient.
    pub user: User,
    pub page: Page,
    pub media_url: String,
    pub section_heading: Option<String>,
}

impl NotificationRecord {
    /// Extra payload stored with the event.
    pub fn extra(&self) -> JsonValue {
        serde_json::json!({
            "media-url": self.media_url,
            "section-heading": self.section_heading,
        })
    }
}

/// Subscription channels a user may enable for the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationChannel {
    Web,
    Email,
    Push,
}

impl NotificationChannel {
    /// Channels in the order they are checked.
    pub const ALL: [NotificationChannel; 3] = [
        NotificationChannel::Web,
        NotificationChannel::Email,
        NotificationChannel::Push,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Web => "web",
            NotificationChannel::Email => "email",
            NotificationChannel::Push => "push",
        }
    }

    /// User option that enables this channel for `event`.
    pub fn option_name(&self, event: &str) -> String {
        format!("echo-subscriptions-{}-{}", self.as_str(), event)
    }
}

// =============================================================================
// RUN STATE
// =============================================================================

/// Which candidates an instance-of match removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceOfScope {
    /// Only article-level candidates are dropped.
    #[default]
    Article,
    /// Every candidate for the page is dropped.
    Page,
}

/// Category-targeted run: named users about pages in given categories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryTarget {
    /// Category names without namespace, subcategories included.
    pub categories: Vec<String>,
    /// The only users that may be notified.
    pub user_ids: Vec<UserId>,
}

/// Run parameters fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunConfig {
    pub min_edit_count: i64,
    pub min_confidence: f64,
    pub min_confidence_section: f64,
    pub max_notifications_per_user: u32,
    pub exclude_instance_of: BTreeSet<String>,
    pub instance_of_scope: InstanceOfScope,
    pub batch_size: usize,
    pub dry_run: bool,
    pub verbose: bool,
    pub queue: bool,
    /// Set for category runs; watchers are the candidates otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryTarget>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            min_edit_count: defaults::MIN_EDIT_COUNT,
            min_confidence: defaults::MIN_CONFIDENCE,
            min_confidence_section: defaults::MIN_CONFIDENCE_SECTION,
            max_notifications_per_user: defaults::MAX_NOTIFICATIONS_PER_USER,
            exclude_instance_of: BTreeSet::new(),
            instance_of_scope: InstanceOfScope::default(),
            batch_size: defaults::BATCH_SIZE,
            dry_run: false,
            verbose: false,
            queue: false,
            category: None,
        }
    }
}

/// Resumable job parameters, round-tripped between batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunState {
    #[serde(flatten)]
    pub config: RunConfig,
    /// Search cursor; 0 starts from the beginning.
    pub last_page_id: PageId,
    /// Pages considered across the run.
    pub num_pages: u64,
    /// Pages notified about, per user.
    pub notified_user_ids: BTreeMap<UserId, u32>,
    /// Cached opt-in decisions, per user.
    pub opted_in_user_ids: BTreeMap<UserId, bool>,
    pub job_number: u32,
    /// Batch cap; 0 means unlimited.
    pub max_jobs: u32,
    /// A category run found none of its users available; no batch follows.
    pub users_exhausted: bool,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new(RunConfig::default())
    }
}

impl RunState {
    /// Fresh state for a new run.
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            last_page_id: 0,
            num_pages: 0,
            notified_user_ids: BTreeMap::new(),
            opted_in_user_ids: BTreeMap::new(),
            job_number: defaults::FIRST_JOB_NUMBER,
            max_jobs: 0,
            users_exhausted: false,
        }
    }

    pub fn with_max_jobs(mut self, max_jobs: u32) -> Self {
        self.max_jobs = max_jobs;
        self
    }

    /// Decode a job payload, filling missing keys with defaults.
    pub fn from_payload(payload: &JsonValue) -> crate::Result<Self> {
        Ok(serde_json::from_value(payload.clone())?)
    }

    pub fn to_payload(&self) -> crate::Result<JsonValue> {
        Ok(serde_json::to_value(self)?)
    }

    /// Users already notified `max_notifications_per_user` times.
    pub fn users_at_quota(&self) -> Vec<UserId> {
        let max = self.config.max_notifications_per_user;
        self.notified_user_ids
            .iter()
            .filter(|(_, &count)| count >= max)
            .map(|(&id, _)| id)
            .collect()
    }

    pub fn record_notified(&mut self, user_id: UserId) {
        *self.notified_user_ids.entry(user_id).or_insert(0) += 1;
    }

    /// Whether the scheduler has reached its batch cap.
    pub fn reached_max_jobs(&self) -> bool {
        self.max_jobs > 0 && self.job_number >= self.max_jobs
    }

    pub fn summary(&self) -> RunSummary {
        let num_users = self.notified_user_ids.len() as u64;
        let num_notifications: u64 = self.notified_user_ids.values().map(|&n| n as u64).sum();
        RunSummary {
            num_users,
            num_notifications,
            num_missing: self.num_pages.saturating_sub(num_notifications),
        }
    }
}

/// Cumulative statistics of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub num_users: u64,
    /// Pages notified about (one per user per page).
    pub num_notifications: u64,
    /// Pages considered without a notification.
    pub num_missing: u64,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Finished job. In total have notified {} users about {} pages. \
             Notifications not sent for {} pages as they had no available users \
             or the suggestions were excluded or didn't meet the confidence threshold.",
            self.num_users, self.num_notifications, self.num_missing
        )
    }
}

// =============================================================================
// JOB QUEUE
// =============================================================================

/// Status of a queued batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// A notification batch persisted in the job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedBatch {
    pub id: Uuid,
    pub status: JobStatus,
    pub state: RunState,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_target_round_trips_in_payload() {
        let mut state = RunState::default();
        state.config.category = Some(CategoryTarget {
            categories: vec!["Moons".to_string()],
            user_ids: vec![3, 7],
        });
        state.users_exhausted = true;

        let payload = state.to_payload().unwrap();
        assert_eq!(payload["category"]["userIds"], serde_json::json!([3, 7]));
        assert_eq!(payload["usersExhausted"], true);
        assert_eq!(RunState::from_payload(&payload).unwrap(), state);

        let watched = RunState::default().to_payload().unwrap();
        assert!(watched.get("category").is_none());
    }

    #[test]
    fn test_page_text_replaces_underscores() {
        let page = Page::new(1, 0, "Title_with_spaces");
        assert_eq!(page.text(), "Title with spaces");
    }

    #[test]
    fn test_candidate_levels() {
        let article = CandidateSuggestion::article("enwiki", "A.jpg", 80.0);
        let section = CandidateSuggestion::section("enwiki", "B.jpg", 70.0, "History", 2);
        assert!(article.is_article_level());
        assert_eq!(article.section_key(), None);
        assert!(!section.is_article_level());
        assert_eq!(section.section_key(), Some("History"));
        assert_eq!(section.file_title(), "File:B.jpg");
    }

    #[test]
    fn test_candidate_deserializes_null_section() {
        let row: CandidateSuggestion = serde_json::from_str(
            r#"{"origin_wiki":"enwiki","image":"A.jpg","confidence":70,"section_heading":null,"section_index":null}"#,
        )
        .unwrap();
        assert!(row.is_article_level());
        assert_eq!(row.confidence, 70.0);
    }

    #[test]
    fn test_instance_of_uses_first_row() {
        let response: InstanceOfResponse = serde_json::from_str(
            r#"{"rows":[{"instance_of":["Q5","Q1"]},{"instance_of":["Q9"]}]}"#,
        )
        .unwrap();
        assert_eq!(response.into_tags(), vec!["Q5".to_string(), "Q1".to_string()]);
        assert!(InstanceOfResponse::default().into_tags().is_empty());
    }

    #[test]
    fn test_notification_extra_payload() {
        let record = NotificationRecord {
            user: User::new(1, "Alice"),
            page: Page::new(999, 0, "Title_1"),
            media_url: "https://commons/File:A.jpg".to_string(),
            section_heading: None,
        };
        let extra = record.extra();
        assert_eq!(extra["media-url"], "https://commons/File:A.jpg");
        assert!(extra["section-heading"].is_null());
    }

    #[test]
    fn test_channel_option_names() {
        let names: Vec<String> = NotificationChannel::ALL
            .iter()
            .map(|c| c.option_name(defaults::EVENT_NAME))
            .collect();
        assert_eq!(
            names,
            vec![
                "echo-subscriptions-web-image-suggestions",
                "echo-subscriptions-email-image-suggestions",
                "echo-subscriptions-push-image-suggestions",
            ]
        );
    }

    #[test]
    fn test_run_state_defaults_merge_for_missing_keys() {
        let payload = serde_json::json!({
            "minConfidence": 70,
            "lastPageId": 999,
            "notifiedUserIds": { "1": 2 },
        });
        let state = RunState::from_payload(&payload).unwrap();
        assert_eq!(state.config.min_confidence, 70.0);
        assert_eq!(state.config.batch_size, defaults::BATCH_SIZE);
        assert_eq!(state.config.max_notifications_per_user, 2);
        assert_eq!(state.last_page_id, 999);
        assert_eq!(state.notified_user_ids.get(&1), Some(&2));
        assert_eq!(state.job_number, 1);
        assert_eq!(state.max_jobs, 0);
    }

    #[test]
    fn test_run_state_payload_keeps_caches() {
        let mut state = RunState::default();
        state.record_notified(7);
        state.opted_in_user_ids.insert(7, true);
        state.opted_in_user_ids.insert(8, false);
        state.config.exclude_instance_of.insert("Q1".to_string());

        let payload = state.to_payload().unwrap();
        assert_eq!(payload["optedInUserIds"]["8"], false);
        assert_eq!(payload["excludeInstanceOf"][0], "Q1");
        assert_eq!(RunState::from_payload(&payload).unwrap(), state);
    }

    #[test]
    fn test_users_at_quota() {
        let mut state = RunState::default();
        state.record_notified(1);
        state.record_notified(1);
        state.record_notified(2);
        assert_eq!(state.users_at_quota(), vec![1]);
    }

    #[test]
    fn test_reached_max_jobs() {
        let mut state = RunState::default();
        assert!(!state.reached_max_jobs());
        state.max_jobs = 2;
        assert!(!state.reached_max_jobs());
        state.job_number = 2;
        assert!(state.reached_max_jobs());
    }

    #[test]
    fn test_summary_message() {
        let mut state = RunState::default();
        state.num_pages = 5;
        state.notified_user_ids.insert(1, 2);
        state.notified_user_ids.insert(5, 1);
        let summary = state.summary();
        assert_eq!(summary.num_users, 2);
        assert_eq!(summary.num_notifications, 3);
        assert_eq!(summary.num_missing, 2);
        assert!(summary.to_string().starts_with(
            "Finished job. In total have notified 2 users about 3 pages. \
             Notifications not sent for 2 pages"
        ));
    }

    #[test]
    fn test_job_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("cancelled"), None);
    }
}
