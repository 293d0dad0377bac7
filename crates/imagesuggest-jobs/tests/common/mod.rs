//! In-memory collaborators for pipeline tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use imagesuggest_client::SiteWikiMap;
use imagesuggest_jobs::{
    CandidateSuggestion, Error, JobQueue, JobStatus, NotificationLog, NotificationRecord,
    NotificationSink, Notifier, Page, PageCandidateStream, PageCursor, PageId, PageLookup,
    PageQuery, QueuedBatch, ReplicationGate, Result, RunState, SuggestionFetch, SuggestionRanker,
    SuggestionSource, User, UserId, UserOptionsLookup, UserRepository, UserSelector, WatcherQuery,
};

pub const WIKI_ID: &str = "testwiki";
pub const COMMONS: &str = "commonswiki";

/// Page stream over a fixed, sorted list of page ids.
///
/// Pages listed in `page_categories` only match queries naming one of their
/// categories; unlisted pages match every query.
#[derive(Default)]
pub struct ScriptedStream {
    pub page_ids: Vec<PageId>,
    pub page_categories: HashMap<PageId, Vec<String>>,
    pub cursors: Mutex<Vec<PageCursor>>,
    pub categories: Mutex<Vec<Vec<String>>>,
}

impl ScriptedStream {
    pub fn new(mut page_ids: Vec<PageId>) -> Self {
        page_ids.sort_unstable();
        Self {
            page_ids,
            ..Self::default()
        }
    }

    pub fn in_category(mut self, page_id: PageId, category: &str) -> Self {
        self.page_categories
            .entry(page_id)
            .or_default()
            .push(category.to_string());
        self
    }

    fn matches(&self, page_id: PageId, categories: &[String]) -> bool {
        if categories.is_empty() {
            return true;
        }
        self.page_categories
            .get(&page_id)
            .map(|own| own.iter().any(|c| categories.contains(c)))
            .unwrap_or(true)
    }
}

#[async_trait]
impl PageCandidateStream for ScriptedStream {
    async fn next_batch(&self, query: PageQuery<'_>) -> Result<Vec<PageId>> {
        self.cursors.lock().unwrap().push(query.cursor);
        self.categories
            .lock()
            .unwrap()
            .push(query.categories.to_vec());
        Ok(self
            .page_ids
            .iter()
            .copied()
            .filter(|&id| id > query.cursor.0 && self.matches(id, query.categories))
            .take(query.batch_size)
            .collect())
    }
}

/// Page stream that always errors.
pub struct BrokenStream;

#[async_trait]
impl PageCandidateStream for BrokenStream {
    async fn next_batch(&self, _query: PageQuery<'_>) -> Result<Vec<PageId>> {
        Err(Error::Search("index unavailable".to_string()))
    }
}

#[derive(Default)]
pub struct FakePages {
    pub pages: HashMap<PageId, Page>,
}

impl FakePages {
    pub fn with(mut self, id: PageId, db_key: &str) -> Self {
        self.pages.insert(id, Page::new(id, 0, db_key));
        self
    }
}

#[async_trait]
impl PageLookup for FakePages {
    async fn page_by_id(&self, page_id: PageId) -> Result<Option<Page>> {
        Ok(self.pages.get(&page_id).cloned())
    }

    async fn page_by_title(&self, namespace: i32, db_key: &str) -> Result<Option<Page>> {
        Ok(self
            .pages
            .values()
            .find(|p| p.namespace == namespace && p.db_key == db_key)
            .cloned())
    }
}

/// Watchers per page, listed most recent editor first, with edit counts.
///
/// `editors` lists a page's editors most recent first, for category runs;
/// `named` holds users known by name only.
#[derive(Default)]
pub struct FakeUsers {
    pub watchers: HashMap<PageId, Vec<(User, i64)>>,
    pub editors: HashMap<PageId, Vec<UserId>>,
    pub named: Vec<User>,
    pub queries: Mutex<Vec<Vec<UserId>>>,
    pub recent_edit_queries: Mutex<Vec<Vec<UserId>>>,
}

impl FakeUsers {
    pub fn watch(mut self, page_id: PageId, user: User, edit_count: i64) -> Self {
        self.watchers
            .entry(page_id)
            .or_default()
            .push((user, edit_count));
        self
    }

    pub fn named(mut self, user: User) -> Self {
        self.named.push(user);
        self
    }

    pub fn edited(mut self, page_id: PageId, user_id: UserId) -> Self {
        self.editors.entry(page_id).or_default().push(user_id);
        self
    }

    fn known(&self) -> impl Iterator<Item = &User> {
        self.named
            .iter()
            .chain(self.watchers.values().flatten().map(|(u, _)| u))
    }
}

#[async_trait]
impl UserRepository for FakeUsers {
    async fn watchers(&self, query: WatcherQuery<'_>) -> Result<Vec<User>> {
        self.queries
            .lock()
            .unwrap()
            .push(query.exclude_user_ids.to_vec());
        Ok(self
            .watchers
            .get(&query.page.id)
            .map(|list| {
                list.iter()
                    .filter(|(u, edits)| {
                        *edits >= query.min_edit_count && !query.exclude_user_ids.contains(&u.id)
                    })
                    .take(query.limit as usize)
                    .map(|(u, _)| u.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn by_recent_edit(
        &self,
        page: &Page,
        user_ids: &[UserId],
        limit: i64,
    ) -> Result<Vec<User>> {
        self.recent_edit_queries
            .lock()
            .unwrap()
            .push(user_ids.to_vec());
        let editors = self.editors.get(&page.id).cloned().unwrap_or_default();
        let mut ordered: Vec<UserId> = editors
            .iter()
            .copied()
            .filter(|id| user_ids.contains(id))
            .collect();
        let mut rest: Vec<UserId> = user_ids
            .iter()
            .copied()
            .filter(|id| !editors.contains(id))
            .collect();
        rest.sort_unstable();
        ordered.extend(rest);
        Ok(ordered
            .into_iter()
            .filter_map(|id| self.known().find(|u| u.id == id).cloned())
            .take(limit as usize)
            .collect())
    }

    async fn user_by_name(&self, name: &str) -> Result<Option<User>> {
        Ok(self.known().find(|u| u.name == name).cloned())
    }
}

#[derive(Default)]
pub struct FakeLog {
    pub notified: HashMap<PageId, Vec<UserId>>,
}

#[async_trait]
impl NotificationLog for FakeLog {
    async fn notified_users_for_page(
        &self,
        _event_type: &str,
        page_id: PageId,
    ) -> Result<Vec<UserId>> {
        Ok(self.notified.get(&page_id).cloned().unwrap_or_default())
    }
}

/// Enabled options per user; counts every lookup.
#[derive(Default)]
pub struct FakeOptions {
    pub enabled: HashMap<UserId, Vec<String>>,
    pub lookups: AtomicUsize,
}

impl FakeOptions {
    pub fn enable(mut self, user_id: UserId, option: &str) -> Self {
        self.enabled
            .entry(user_id)
            .or_default()
            .push(option.to_string());
        self
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserOptionsLookup for FakeOptions {
    async fn is_enabled(&self, user: &User, option: &str) -> Result<bool> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .enabled
            .get(&user.id)
            .map(|opts| opts.iter().any(|o| o == option))
            .unwrap_or(false))
    }
}

/// Suggestions per page; records whether instance-of was requested.
#[derive(Default)]
pub struct FakeSource {
    pub fetches: HashMap<PageId, SuggestionFetch>,
    pub calls: Mutex<Vec<(PageId, bool)>>,
}

impl FakeSource {
    pub fn with(mut self, page_id: PageId, suggestions: Vec<CandidateSuggestion>) -> Self {
        self.fetches.entry(page_id).or_default().suggestions = suggestions;
        self
    }

    pub fn with_instance_of(mut self, page_id: PageId, tags: &[&str]) -> Self {
        self.fetches.entry(page_id).or_default().instance_of =
            tags.iter().map(|t| t.to_string()).collect();
        self
    }
}

#[async_trait]
impl SuggestionSource for FakeSource {
    async fn fetch(
        &self,
        _wiki_id: &str,
        page_id: PageId,
        with_instance_of: bool,
    ) -> Result<SuggestionFetch> {
        self.calls.lock().unwrap().push((page_id, with_instance_of));
        let mut fetch = self.fetches.get(&page_id).cloned().unwrap_or_default();
        if !with_instance_of {
            fetch.instance_of.clear();
        }
        Ok(fetch)
    }
}

/// Sink recording every record and its dry-run flag.
#[derive(Default)]
pub struct RecordingSink {
    pub created: Mutex<Vec<(NotificationRecord, bool)>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<NotificationRecord> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|(r, _)| r.clone())
            .collect()
    }

    pub fn media_urls(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.media_url).collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn create(&self, record: &NotificationRecord, dry_run: bool) -> Result<bool> {
        self.created.lock().unwrap().push((record.clone(), dry_run));
        Ok(!dry_run)
    }
}

#[derive(Default)]
pub struct CountingGate {
    pub waits: AtomicUsize,
}

#[async_trait]
impl ReplicationGate for CountingGate {
    async fn wait_for_replication(&self) -> Result<()> {
        self.waits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// FIFO job queue in memory.
#[derive(Default)]
pub struct MemoryQueue {
    pub pending: Mutex<VecDeque<QueuedBatch>>,
    pub completed: Mutex<Vec<Uuid>>,
    pub failed: Mutex<Vec<(Uuid, String)>>,
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn push(&self, state: &RunState) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.pending.lock().unwrap().push_back(QueuedBatch {
            id,
            status: JobStatus::Pending,
            state: state.clone(),
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        });
        Ok(id)
    }

    async fn claim_next(&self) -> Result<Option<QueuedBatch>> {
        Ok(self.pending.lock().unwrap().pop_front().map(|mut batch| {
            batch.status = JobStatus::Running;
            batch.started_at = Some(Utc::now());
            batch
        }))
    }

    async fn complete(&self, id: Uuid) -> Result<()> {
        self.completed.lock().unwrap().push(id);
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<()> {
        self.failed.lock().unwrap().push((id, error.to_string()));
        Ok(())
    }

    async fn pending_count(&self) -> Result<i64> {
        Ok(self.pending.lock().unwrap().len() as i64)
    }
}

/// Collaborators of one Notifier, kept for assertions.
pub struct Fixture {
    pub stream: Arc<ScriptedStream>,
    pub pages: Arc<FakePages>,
    pub users: Arc<FakeUsers>,
    pub log: Arc<FakeLog>,
    pub options: Arc<FakeOptions>,
    pub source: Arc<FakeSource>,
    pub sink: Arc<RecordingSink>,
}

impl Fixture {
    pub fn new(
        stream: ScriptedStream,
        pages: FakePages,
        users: FakeUsers,
        log: FakeLog,
        options: FakeOptions,
        source: FakeSource,
    ) -> Self {
        Self {
            stream: Arc::new(stream),
            pages: Arc::new(pages),
            users: Arc::new(users),
            log: Arc::new(log),
            options: Arc::new(options),
            source: Arc::new(source),
            sink: Arc::new(RecordingSink::default()),
        }
    }

    pub fn selector(&self) -> UserSelector {
        UserSelector::new(self.log.clone(), self.users.clone(), self.options.clone())
    }

    pub fn notifier(&self) -> Notifier {
        Notifier::new(
            self.stream.clone(),
            self.pages.clone(),
            self.selector(),
            SuggestionRanker::new(self.source.clone(), WIKI_ID),
            Arc::new(wiki_map()),
            self.sink.clone(),
        )
    }
}

pub fn wiki_map() -> SiteWikiMap {
    SiteWikiMap::new().with_site(COMMONS, "https://commons.example.org")
}

pub fn media_url(image: &str) -> String {
    format!("https://commons.example.org/wiki/File:{}", image)
}

pub fn web_option() -> String {
    imagesuggest_jobs::NotificationChannel::Web.option_name(imagesuggest_jobs::defaults::EVENT_NAME)
}

pub fn email_option() -> String {
    imagesuggest_jobs::NotificationChannel::Email
        .option_name(imagesuggest_jobs::defaults::EVENT_NAME)
}

pub fn push_option() -> String {
    imagesuggest_jobs::NotificationChannel::Push.option_name(imagesuggest_jobs::defaults::EVENT_NAME)
}
