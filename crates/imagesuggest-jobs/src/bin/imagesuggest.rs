//! imagesuggest: notify watchers about image suggestions for their pages, or
//! named users about pages in given categories.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imagesuggest_db::{Database, PgReplicationGate};
use imagesuggest_jobs::{
    defaults, prepare_category_target, AppConfig, AppNotifierFactory, BatchOutcome, BatchScheduler,
    CategoryExpander, Error, InstanceOfScope, JobWorker, NotificationRecord, NotificationSink,
    NotificationsJob, PageLookup, RunConfig, RunState, UserRepository, WorkerConfig, WorkerEvent,
};

#[derive(Parser)]
#[command(name = "imagesuggest")]
#[command(author, version, about = "Image suggestion notifications for watched pages")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    /// Drop article-level suggestions only
    Article,
    /// Drop every suggestion for the page
    Page,
}

impl From<ScopeArg> for InstanceOfScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Article => InstanceOfScope::Article,
            ScopeArg::Page => InstanceOfScope::Page,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Send notifications for pages with image suggestions
    Notify {
        /// Minimum edit count for a user to be notified
        #[arg(long, default_value_t = defaults::MIN_EDIT_COUNT)]
        min_edit_count: i64,

        /// Minimum confidence score (0-100) for article-level suggestions
        #[arg(long, default_value_t = defaults::MIN_CONFIDENCE)]
        min_confidence: f64,

        /// Minimum confidence score (0-100) for section-level suggestions
        #[arg(long, default_value_t = defaults::MIN_CONFIDENCE_SECTION)]
        min_confidence_section: f64,

        /// Maximum pages a user is notified about in one run
        #[arg(long, default_value_t = defaults::MAX_NOTIFICATIONS_PER_USER)]
        max_notifications_per_user: u32,

        /// Exclude pages that are an instance of this entity (repeatable)
        #[arg(long = "exclude-instance-of")]
        exclude_instance_of: Vec<String>,

        /// Which suggestions an instance-of match removes
        #[arg(long, value_enum, default_value = "article")]
        instance_of_scope: ScopeArg,

        /// Pages per batch
        #[arg(long, default_value_t = defaults::BATCH_SIZE)]
        batch_size: usize,

        /// Stop after this many batches (0 = unlimited)
        #[arg(long, default_value_t = 0)]
        max_jobs: u32,

        /// Resume after this page id
        #[arg(long, default_value_t = 0)]
        start_after: i64,

        /// Run the selection without creating notifications
        #[arg(long)]
        dry_run: bool,

        /// Log every notification
        #[arg(long)]
        verbose: bool,

        /// Hand batches to the job queue instead of running them here
        #[arg(long)]
        queue: bool,
    },

    /// Notify named users about pages with image suggestions in given categories
    NotifyCategory {
        /// Name of a user to notify (repeatable)
        #[arg(long = "user", required = true)]
        users: Vec<String>,

        /// Category to find pages in, subcategories included (repeatable)
        #[arg(long = "category", required = true)]
        categories: Vec<String>,

        /// Minimum confidence score (0-100) for suggestions
        #[arg(long, default_value_t = 0.0)]
        min_confidence: f64,

        /// Maximum pages a user is notified about in one run
        #[arg(long, default_value_t = 2)]
        max_notifications_per_user: u32,

        /// Exclude pages that are an instance of this entity (repeatable)
        #[arg(long = "exclude-instance-of")]
        exclude_instance_of: Vec<String>,

        /// Pages per batch
        #[arg(long, default_value_t = defaults::BATCH_SIZE)]
        batch_size: usize,

        /// Run the selection without creating notifications
        #[arg(long)]
        dry_run: bool,

        /// Log every notification
        #[arg(long)]
        verbose: bool,
    },

    /// Process queued notification batches
    Worker {
        /// Exit once the queue is empty
        #[arg(long)]
        drain: bool,
    },

    /// Send a single test notification
    SendTest {
        /// User to send the notification to
        #[arg(long)]
        agent: String,

        /// Title of the page the suggestion is for
        #[arg(long)]
        title: String,

        /// URL of the suggested image
        #[arg(long)]
        media_url: String,

        /// Section of the article the suggestion is for
        #[arg(long)]
        section_heading: Option<String>,
    },

    /// Apply database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _file_guard = init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env();
    let database_url = config
        .database_url
        .clone()
        .context("DATABASE_URL is not set")?;
    let db = Database::connect(&database_url).await?;

    match cli.command {
        Commands::Notify {
            min_edit_count,
            min_confidence,
            min_confidence_section,
            max_notifications_per_user,
            exclude_instance_of,
            instance_of_scope,
            batch_size,
            max_jobs,
            start_after,
            dry_run,
            verbose,
            queue,
        } => {
            let run_config = RunConfig {
                min_edit_count,
                min_confidence,
                min_confidence_section,
                max_notifications_per_user,
                exclude_instance_of: exclude_instance_of.into_iter().collect::<BTreeSet<_>>(),
                instance_of_scope: instance_of_scope.into(),
                batch_size,
                dry_run,
                verbose,
                queue,
                category: None,
            };
            let mut state = RunState::new(run_config).with_max_jobs(max_jobs);
            state.last_page_id = start_after;

            let scheduler = build_scheduler(&db, &config);
            report(scheduler.start(state).await?);
        }

        Commands::NotifyCategory {
            users,
            categories,
            min_confidence,
            max_notifications_per_user,
            exclude_instance_of,
            batch_size,
            dry_run,
            verbose,
        } => {
            let factory = AppNotifierFactory::new(db.clone(), config.clone());
            let expander = factory.category_expander()?;
            let target = prepare_category_target(
                &db.users,
                expander.as_ref().map(|e| e as &dyn CategoryExpander),
                &users,
                &categories,
            )
            .await?;

            let run_config = RunConfig {
                min_confidence,
                min_confidence_section: min_confidence,
                max_notifications_per_user,
                exclude_instance_of: exclude_instance_of.into_iter().collect::<BTreeSet<_>>(),
                instance_of_scope: InstanceOfScope::Page,
                batch_size,
                dry_run,
                verbose,
                category: Some(target),
                ..RunConfig::default()
            };

            let scheduler = build_scheduler(&db, &config);
            report(scheduler.start(RunState::new(run_config)).await?);
        }

        Commands::Worker { drain } => {
            let queue = Arc::new(db.job_queue());
            let wake = queue.job_notify();
            let scheduler = Arc::new(build_scheduler(&db, &config));
            let worker = JobWorker::new(
                queue,
                Arc::new(NotificationsJob::new(scheduler)),
                WorkerConfig::from_env().with_poll_interval(config.job_poll_interval_ms),
            )
            .with_wake(wake);

            if drain {
                let processed = worker.run_until_idle().await?;
                info!(processed, "Queue drained");
            } else {
                let handle = worker.start();
                let mut events = handle.events();
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Shutdown requested");
                        handle.shutdown().await?;
                    }
                    _ = async {
                        while let Ok(event) = events.recv().await {
                            if event == WorkerEvent::WorkerStopped {
                                break;
                            }
                        }
                    } => {}
                }
            }
        }

        Commands::SendTest {
            agent,
            title,
            media_url,
            section_heading,
        } => {
            let user = db
                .users
                .user_by_name(&agent)
                .await?
                .ok_or(Error::UserNotFound(agent))?;
            let page = db
                .pages
                .page_by_title(defaults::MAIN_NAMESPACE, &title)
                .await?
                .ok_or(Error::PageNotFound(title))?;

            let record = NotificationRecord {
                user,
                page,
                media_url,
                section_heading,
            };
            if db.notifications.create(&record, false).await? {
                println!("Notification sent");
            } else {
                println!("Notification not sent");
            }
        }

        Commands::Migrate => {
            db.migrate().await?;
            info!("Migrations applied");
        }
    }

    Ok(())
}

fn report(outcome: BatchOutcome) {
    match outcome {
        BatchOutcome::Exhausted => info!("Run finished: no more pages"),
        BatchOutcome::MaxJobsReached(state) => {
            info!(last_page_id = state.last_page_id, "Run finished: batch limit reached")
        }
        BatchOutcome::UsersExhausted(state) => {
            info!(last_page_id = state.last_page_id, "Run finished: {}", state.summary())
        }
        BatchOutcome::Queued { job_id, .. } => info!(%job_id, "Batch queued"),
        BatchOutcome::RunNext(state) => {
            info!(last_page_id = state.last_page_id, "Run stopped")
        }
    }
}

fn build_scheduler(db: &Database, config: &AppConfig) -> BatchScheduler {
    let gate = PgReplicationGate::new(db.pool().clone()).with_max_lag(config.replication_max_lag);
    BatchScheduler::new(Arc::new(AppNotifierFactory::new(db.clone(), config.clone())))
        .with_queue(Arc::new(db.job_queue()))
        .with_replication_gate(Arc::new(gate))
}

/// Initialize tracing with configurable output.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter (default: "imagesuggest=info,imagesuggest_jobs=info")
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "imagesuggest=info,imagesuggest_jobs=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("imagesuggest.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            // No ANSI in files unless asked for.
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    guard
}
