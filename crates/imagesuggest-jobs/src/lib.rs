//! # imagesuggest-jobs
//!
//! Notification pipeline and batch scheduling for imagesuggest.
//!
//! This crate provides:
//! - [`SuggestionRanker`]: confidence thresholds, instance-of exclusion and
//!   per-section deduplication of a page's suggestions
//! - [`UserSelector`]: one opted-in, under-quota watcher per page, or one of
//!   the named users of a category run
//! - [`prepare_category_target`]: named users and expanded categories of a
//!   category run
//! - [`Notifier`]: one batch of pages, emitting notifications in reverse rank
//!   order and returning resumable state
//! - [`BatchScheduler`]: runs batches in-process or hands them to the job queue
//! - [`JobWorker`]: claims queued batches one at a time
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use imagesuggest_jobs::{AppConfig, AppNotifierFactory, BatchScheduler, RunConfig, RunState};
//! use imagesuggest_db::Database;
//!
//! let db = Database::connect("postgres://...").await?;
//! let factory = AppNotifierFactory::new(db.clone(), AppConfig::from_env());
//! let scheduler = BatchScheduler::new(Arc::new(factory))
//!     .with_replication_gate(Arc::new(db.replication.clone()));
//!
//! let outcome = scheduler.start(RunState::new(RunConfig::default())).await?;
//! ```

pub mod category;
pub mod config;
pub mod factory;
pub mod handler;
pub mod notifier;
pub mod ranker;
pub mod scheduler;
pub mod user_selector;
pub mod worker;

// Re-export core types
pub use imagesuggest_core::*;

pub use category::prepare_category_target;
pub use config::AppConfig;
pub use factory::{AppNotifierFactory, NotifierFactory, StaticNotifierFactory};
pub use handler::{JobContext, JobHandler, JobResult, NotificationsJob};
pub use notifier::Notifier;
pub use ranker::{rank_candidates, SuggestionRanker};
pub use scheduler::{BatchOutcome, BatchScheduler};
pub use user_selector::UserSelector;
pub use worker::{JobWorker, WorkerConfig, WorkerEvent, WorkerHandle};
