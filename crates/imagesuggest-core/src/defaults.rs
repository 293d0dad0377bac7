//! Centralized default constants for imagesuggest.
//!
//! **This module is the single source of truth** for shared default values.
//! Run parameters, HTTP clients and the job worker all reference these
//! constants instead of defining their own magic numbers.

// =============================================================================
// EVENT
// =============================================================================

/// Notification event type (and category) for image suggestions.
pub const EVENT_NAME: &str = "image-suggestions";

/// Canonical name of the file namespace on every wiki.
pub const FILE_NAMESPACE: &str = "File";

/// Namespace name of category pages.
pub const CATEGORY_NAMESPACE: &str = "Category";

/// Namespace id of main-namespace articles.
pub const MAIN_NAMESPACE: i32 = 0;

// =============================================================================
// RUN PARAMETERS
// =============================================================================

/// Minimum edit count for a watcher to be considered.
pub const MIN_EDIT_COUNT: i64 = 1;

/// Minimum confidence (0-100) for article-level suggestions.
pub const MIN_CONFIDENCE: f64 = 0.0;

/// Minimum confidence (0-100) for section-level suggestions.
pub const MIN_CONFIDENCE_SECTION: f64 = 0.0;

/// Maximum pages a single user is notified about within one run.
pub const MAX_NOTIFICATIONS_PER_USER: u32 = 2;

/// Pages pulled from the search index per batch.
pub const BATCH_SIZE: usize = 100;

/// First batch number of a run.
pub const FIRST_JOB_NUMBER: u32 = 1;

// =============================================================================
// SELECTION & RANKING
// =============================================================================

/// Maximum section-level suggestions bundled into one page's notifications.
pub const MAX_SECTION_SUGGESTIONS_PER_NOTIFICATION: usize = 5;

/// Cap on watcher candidates considered per page.
pub const CANDIDATE_USER_LIMIT: i64 = 1000;

// =============================================================================
// SEARCH INDEX
// =============================================================================

/// Weighted-tags field holding recommendation flags.
pub const WEIGHTED_TAGS_FIELD: &str = "weighted_tags";

/// Tag marking pages with an article-level image recommendation.
pub const TAG_IMAGE_RECOMMENDATION: &str = "recommendation.image/exists";

/// Tag marking pages with a section-level image recommendation.
pub const TAG_SECTION_IMAGE_RECOMMENDATION: &str = "recommendation.image_section/exists";

/// Search field holding a page's categories, matched case-insensitively.
pub const CATEGORY_FIELD: &str = "category.lowercase_keyword";

/// Subcategory levels followed when expanding a category.
pub const CATEGORY_DEPTH: u32 = 5;

/// Most categories one root expands to.
pub const CATEGORY_MAX: u32 = 256;

/// Default search index name (content namespaces).
pub const SEARCH_INDEX: &str = "wiki_content";

// =============================================================================
// DATABASE
// =============================================================================

/// Connection pool size.
pub const DB_MAX_CONNECTIONS: u32 = 4;

/// Wait for a free pooled connection this long (seconds).
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Close pooled connections idle for this long (seconds).
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

// =============================================================================
// HTTP
// =============================================================================

/// Timeout for suggestion/search HTTP requests in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Requests slower than this are logged as slow (milliseconds).
pub const SLOW_REQUEST_MS: u64 = 5_000;

// =============================================================================
// JOB PROCESSING
// =============================================================================

/// Job type string for queued notification batches.
pub const NOTIFICATIONS_JOB_TYPE: &str = "image_suggestions_notifications";

/// Worker poll interval when the queue is empty (milliseconds).
pub const JOB_POLL_INTERVAL_MS: u64 = 5_000;

/// Replica lag tolerated before the next batch starts (milliseconds).
pub const REPLICATION_MAX_LAG_MS: u64 = 1_000;

/// Give up waiting for replicas after this long (seconds).
pub const REPLICATION_WAIT_TIMEOUT_SECS: u64 = 60;

/// Default event broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;
