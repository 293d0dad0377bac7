//! Structured logging schema and field name constants for imagesuggest.
//!
//! All crates use these names for structured `tracing` fields so that log
//! aggregation can query one batch run across the stream, selection, ranking
//! and delivery stages.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Run exhausted, misconfiguration, requires operator attention |
//! | WARN  | A page or collaborator failed and was skipped |
//! | INFO  | Batch summary, queueing, worker lifecycle, verbose notifications |
//! | DEBUG | Skip decisions (no title, no user, no suggestions) |
//! | TRACE | Per-candidate iteration |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "jobs", "search", "suggestions", "db"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "notifier", "user_selector", "ranker", "page_stream", "worker"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "run", "select_user", "rank", "next_batch"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Page id being processed.
pub const PAGE_ID: &str = "page_id";

/// User id selected or evaluated.
pub const USER_ID: &str = "user_id";

/// Batch sequence number within a run.
pub const JOB_NUMBER: &str = "job_number";

/// Queued job UUID.
pub const JOB_ID: &str = "job_id";

/// Wiki id a request is scoped to.
pub const WIKI_ID: &str = "wiki_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a query.
pub const RESULT_COUNT: &str = "result_count";

/// Number of candidates before filtering.
pub const CANDIDATE_COUNT: &str = "candidate_count";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Slow operation threshold exceeded.
pub const SLOW: &str = "slow";
