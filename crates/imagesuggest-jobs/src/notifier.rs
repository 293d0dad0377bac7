//! One batch of the notification run.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};

use imagesuggest_core::{
    NotificationRecord, NotificationSink, Page, PageCandidateStream, PageCursor, PageLookup,
    PageQuery, RankedSuggestion, Result, RunConfig, RunState, User, WikiMap,
};

use crate::ranker::SuggestionRanker;
use crate::user_selector::UserSelector;

/// Runs one batch: pages from the stream, a user and suggestions per page,
/// notifications to the sink.
#[derive(Clone)]
pub struct Notifier {
    stream: Arc<dyn PageCandidateStream>,
    pages: Arc<dyn PageLookup>,
    selector: UserSelector,
    ranker: SuggestionRanker,
    wiki_map: Arc<dyn WikiMap>,
    sink: Arc<dyn NotificationSink>,
}

impl Notifier {
    pub fn new(
        stream: Arc<dyn PageCandidateStream>,
        pages: Arc<dyn PageLookup>,
        selector: UserSelector,
        ranker: SuggestionRanker,
        wiki_map: Arc<dyn WikiMap>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            stream,
            pages,
            selector,
            ranker,
            wiki_map,
            sink,
        }
    }

    /// Process the next batch after `state.last_page_id`.
    ///
    /// Returns the updated state, or `None` once the stream is exhausted. A
    /// category run that finds no available user marks the state
    /// `users_exhausted` and stops the batch early.
    /// Failures scoped to a single page skip that page; only a failing page
    /// stream is returned as an error.
    #[instrument(skip(self, state), fields(subsystem = "jobs", component = "notifier", op = "run", job_number = state.job_number))]
    pub async fn run(&self, mut state: RunState) -> Result<Option<RunState>> {
        let start = Instant::now();
        let categories = state
            .config
            .category
            .as_ref()
            .map(|target| target.categories.clone())
            .unwrap_or_default();
        let query = PageQuery::new(PageCursor::after(state.last_page_id), state.config.batch_size)
            .in_categories(&categories);
        let page_ids = self.stream.next_batch(query).await?;

        if page_ids.is_empty() {
            error!(last_page_id = state.last_page_id, "No more articles with suggestions found");
            return Ok(None);
        }

        for page_id in page_ids {
            // Advance first so a failing page is never revisited.
            state.last_page_id = page_id;

            let page = match self.pages.page_by_id(page_id).await {
                Ok(Some(page)) => page,
                Ok(None) => {
                    debug!(page_id, "No title found for {}", page_id);
                    continue;
                }
                Err(e) => {
                    warn!(page_id, error = %e, "Page lookup failed, skipping");
                    continue;
                }
            };

            state.num_pages += 1;

            let user = match self.selector.select_user(&page, &mut state).await {
                Ok(Some(user)) => user,
                Ok(None) if state.config.category.is_some() => {
                    // Named users only shrink as the run goes on.
                    info!(page_id, "No user available for {}, stopping", page.db_key);
                    state.users_exhausted = true;
                    break;
                }
                Ok(None) => {
                    debug!(page_id, "No user found for {}", page.db_key);
                    continue;
                }
                Err(e) => {
                    warn!(page_id, error = %e, "User selection failed, skipping");
                    continue;
                }
            };

            let mut ranked = self.ranker.rank(page.id, &state.config).await;
            if state.config.category.is_some() {
                // Targeted users get the single most confident suggestion.
                ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
                ranked.truncate(1);
            }
            if ranked.is_empty() {
                debug!(page_id, "No suggestions found for {}", page.id);
                continue;
            }

            state.record_notified(user.id);

            // The sink shows the newest notification first, so create them
            // lowest priority first.
            for suggestion in ranked.iter().rev() {
                self.notify(&user, &page, suggestion, &state.config).await;
            }
        }

        let summary = state.summary();
        info!(
            num_users = summary.num_users,
            num_notifications = summary.num_notifications,
            num_missing = summary.num_missing,
            last_page_id = state.last_page_id,
            duration_ms = start.elapsed().as_millis() as u64,
            "{}",
            summary
        );
        Ok(Some(state))
    }

    async fn notify(
        &self,
        user: &User,
        page: &Page,
        suggestion: &RankedSuggestion,
        config: &RunConfig,
    ) {
        let Some(media_url) = self
            .wiki_map
            .foreign_url(&suggestion.origin_wiki, &suggestion.file_title())
        else {
            debug!(
                page_id = page.id,
                origin_wiki = %suggestion.origin_wiki,
                "Unknown origin wiki, skipping suggestion"
            );
            return;
        };

        let record = NotificationRecord {
            user: user.clone(),
            page: page.clone(),
            media_url,
            section_heading: suggestion.section_heading.clone(),
        };

        if config.verbose {
            info!(
                "Notification: user: {} (id: {}), title: {} (id: {}), media-url: {}, section-heading: {}",
                user.name,
                user.id,
                page.text(),
                page.id,
                record.media_url,
                record.section_heading.as_deref().unwrap_or("none")
            );
        }

        if let Err(e) = self.sink.create(&record, config.dry_run).await {
            warn!(
                page_id = page.id,
                user_id = user.id,
                error = %e,
                "Failed to create notification"
            );
        }
    }
}
