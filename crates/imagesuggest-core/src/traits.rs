//! Core traits for imagesuggest collaborators.
//!
//! These traits define the seams between the notification pipeline and the
//! systems it reads from and writes to, enabling pluggable backends and
//! in-memory fakes for tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// PAGE STREAM
// =============================================================================

/// Resume position in the page stream: the last page id already seen.
///
/// Resumption is strictly after the cursor; `PageCursor::START` (0) begins at
/// the first page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageCursor(pub PageId);

impl PageCursor {
    pub const START: PageCursor = PageCursor(0);

    pub fn after(last_page_id: PageId) -> Self {
        Self(last_page_id)
    }

    pub fn is_start(&self) -> bool {
        self.0 <= 0
    }

    /// Search-after sort values, if any.
    pub fn search_after(&self) -> Option<PageId> {
        if self.is_start() {
            None
        } else {
            Some(self.0)
        }
    }
}

/// One page-stream request.
#[derive(Debug, Clone, Copy)]
pub struct PageQuery<'a> {
    pub cursor: PageCursor,
    pub batch_size: usize,
    /// Only pages in at least one of these categories; empty for all pages.
    pub categories: &'a [String],
}

impl PageQuery<'static> {
    pub fn new(cursor: PageCursor, batch_size: usize) -> Self {
        Self {
            cursor,
            batch_size,
            categories: &[],
        }
    }
}

impl PageQuery<'_> {
    pub fn in_categories<'b>(self, categories: &'b [String]) -> PageQuery<'b> {
        PageQuery {
            cursor: self.cursor,
            batch_size: self.batch_size,
            categories,
        }
    }
}

/// Ordered source of page ids that have at least one suggestion.
#[async_trait]
pub trait PageCandidateStream: Send + Sync {
    /// Next batch of page ids strictly after `query.cursor`, sorted ascending.
    /// An empty batch means the stream is exhausted.
    async fn next_batch(&self, query: PageQuery<'_>) -> Result<Vec<PageId>>;
}

/// Expands root categories with their subcategories.
#[async_trait]
pub trait CategoryExpander: Send + Sync {
    /// Root categories plus descendants, names without namespace.
    async fn expand(&self, roots: &[String]) -> Result<Vec<String>>;
}

// =============================================================================
// PAGES & USERS
// =============================================================================

/// Page resolution.
#[async_trait]
pub trait PageLookup: Send + Sync {
    async fn page_by_id(&self, page_id: PageId) -> Result<Option<Page>>;

    async fn page_by_title(&self, namespace: i32, db_key: &str) -> Result<Option<Page>>;
}

/// Candidate-watcher query for one page.
#[derive(Debug, Clone)]
pub struct WatcherQuery<'a> {
    pub page: &'a Page,
    pub min_edit_count: i64,
    pub exclude_user_ids: &'a [UserId],
    pub limit: i64,
}

/// User lookups backing user selection.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Users watching the page with at least `min_edit_count` edits, minus
    /// `exclude_user_ids`, most recent editor of the page first (watchers who
    /// never edited it last), at most `limit`.
    async fn watchers(&self, query: WatcherQuery<'_>) -> Result<Vec<User>>;

    /// The given users, most recent editor of the page first (users who never
    /// edited it last), at most `limit`.
    async fn by_recent_edit(&self, page: &Page, user_ids: &[UserId], limit: i64)
        -> Result<Vec<User>>;

    async fn user_by_name(&self, name: &str) -> Result<Option<User>>;
}

/// Read access to previously created notifications.
#[async_trait]
pub trait NotificationLog: Send + Sync {
    /// Users who already received an `event_type` notification for the page.
    async fn notified_users_for_page(&self, event_type: &str, page_id: PageId)
        -> Result<Vec<UserId>>;
}

/// Per-user option lookup.
#[async_trait]
pub trait UserOptionsLookup: Send + Sync {
    /// Whether the boolean option is enabled for the user (stored value or default).
    async fn is_enabled(&self, user: &User, option: &str) -> Result<bool>;
}

// =============================================================================
// OPT-IN CACHE
// =============================================================================

/// Run-scoped cache of opt-in decisions.
///
/// Once a user has an entry it is never recomputed for the rest of the run.
pub trait OptInCache: Send {
    fn get(&self, user_id: UserId) -> Option<bool>;

    fn insert(&mut self, user_id: UserId, opted_in: bool);

    /// Users cached as not opted in.
    fn opted_out(&self) -> Vec<UserId>;
}

impl OptInCache for BTreeMap<UserId, bool> {
    fn get(&self, user_id: UserId) -> Option<bool> {
        BTreeMap::get(self, &user_id).copied()
    }

    fn insert(&mut self, user_id: UserId, opted_in: bool) {
        BTreeMap::insert(self, user_id, opted_in);
    }

    fn opted_out(&self) -> Vec<UserId> {
        self.iter()
            .filter(|(_, &opted_in)| !opted_in)
            .map(|(&id, _)| id)
            .collect()
    }
}

// =============================================================================
// SUGGESTIONS & DELIVERY
// =============================================================================

/// External source of raw image suggestions.
#[async_trait]
pub trait SuggestionSource: Send + Sync {
    /// Suggestions for the page, plus instance-of tags when
    /// `with_instance_of` is set. Malformed or missing bodies decode to empty.
    async fn fetch(
        &self,
        wiki_id: &str,
        page_id: PageId,
        with_instance_of: bool,
    ) -> Result<SuggestionFetch>;
}

/// Resolves titles on other wikis to URLs.
pub trait WikiMap: Send + Sync {
    /// Full URL of `title` on `wiki_id`, or `None` for an unknown wiki.
    fn foreign_url(&self, wiki_id: &str, title: &str) -> Option<String>;
}

/// Destination for created notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Persist and dispatch a notification. Returns `false` when nothing was
    /// persisted (dry run).
    async fn create(&self, record: &NotificationRecord, dry_run: bool) -> Result<bool>;
}

// =============================================================================
// SCHEDULING
// =============================================================================

/// Queue of notification batches awaiting a worker.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn push(&self, state: &RunState) -> Result<Uuid>;

    /// Claim the oldest pending batch, marking it running.
    async fn claim_next(&self) -> Result<Option<QueuedBatch>>;

    async fn complete(&self, id: Uuid) -> Result<()>;

    async fn fail(&self, id: Uuid, error: &str) -> Result<()>;

    async fn pending_count(&self) -> Result<i64>;
}

/// Waits for read replicas to catch up between batches.
#[async_trait]
pub trait ReplicationGate: Send + Sync {
    async fn wait_for_replication(&self) -> Result<()>;
}
