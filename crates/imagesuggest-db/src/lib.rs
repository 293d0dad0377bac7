//! # imagesuggest-db
//!
//! PostgreSQL database layer for imagesuggest.
//!
//! This crate provides:
//! - Connection pool management and replica catch-up waiting
//! - Page and user lookups (watchers of a page, by edit recency)
//! - User option lookup for notification subscriptions
//! - Notification event storage (prior-notification lookup and the sink)
//! - The persisted queue of notification batches
//!
//! ## Example
//!
//! ```rust,ignore
//! use imagesuggest_db::{Database, PageLookup};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/wiki").await?;
//!     let page = db.pages.page_by_id(999).await?;
//!     println!("Resolved: {:?}", page);
//!     Ok(())
//! }
//! ```
pub mod jobs;
pub mod notifications;
pub mod pages;
pub mod pool;
pub mod user_options;
pub mod users;

// Test fixtures for integration tests
pub mod test_fixtures;

// Re-export core types
pub use imagesuggest_core::*;

pub use jobs::PgJobRepository;
pub use notifications::PgNotificationRepository;
pub use pages::{title_to_db_key, PgPageRepository};
pub use pool::{create_pool, create_pool_with_config, PgReplicationGate, PoolConfig};
pub use user_options::PgUserOptionsLookup;
pub use users::PgUserRepository;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Page lookups.
    pub pages: PgPageRepository,
    /// Watchers and user lookups.
    pub users: PgUserRepository,
    /// Notification subscription options.
    pub user_options: PgUserOptionsLookup,
    /// Notification events (log and sink).
    pub notifications: PgNotificationRepository,
    /// Replica catch-up gate.
    pub replication: PgReplicationGate,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            pages: PgPageRepository::new(pool.clone()),
            users: PgUserRepository::new(pool.clone()),
            user_options: PgUserOptionsLookup::new(pool.clone()),
            notifications: PgNotificationRepository::new(pool.clone()),
            replication: PgReplicationGate::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Job queue sharing this database's pool.
    pub fn job_queue(&self) -> PgJobRepository {
        PgJobRepository::new(self.pool.clone())
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
