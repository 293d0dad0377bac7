//! Database connection pool management and replica catch-up.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use imagesuggest_core::{defaults, Error, ReplicationGate, Result};

/// Connection pool sizing.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: defaults::DB_MAX_CONNECTIONS,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(defaults::DB_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(defaults::DB_IDLE_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// A pool pinned to one connection, so session settings apply to every query.
    pub fn single() -> Self {
        Self {
            max_connections: 1,
            min_connections: 1,
            ..Self::default()
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(self.min_connections);
        self
    }
}

/// Connect with [`PoolConfig::default`].
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        max_connections = config.max_connections,
        duration_ms = start.elapsed().as_millis() as u64,
        "Connected to database"
    );
    Ok(pool)
}

/// Waits until the connected server's replay lag is under a threshold.
///
/// A primary (not in recovery) always reports zero lag.
#[derive(Clone)]
pub struct PgReplicationGate {
    pool: PgPool,
    max_lag: Duration,
    timeout: Duration,
    poll_interval: Duration,
}

impl PgReplicationGate {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            max_lag: Duration::from_millis(defaults::REPLICATION_MAX_LAG_MS),
            timeout: Duration::from_secs(defaults::REPLICATION_WAIT_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(250),
        }
    }

    pub fn with_max_lag(mut self, max_lag: Duration) -> Self {
        self.max_lag = max_lag;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Current replay lag in milliseconds.
    pub async fn replay_lag_ms(&self) -> Result<i64> {
        let lag: Option<i64> = sqlx::query_scalar(
            "SELECT CASE WHEN pg_is_in_recovery()
                 THEN (COALESCE(EXTRACT(EPOCH FROM (now() - pg_last_xact_replay_timestamp())), 0) * 1000)::BIGINT
                 ELSE 0 END",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(lag.unwrap_or(0))
    }
}

#[async_trait]
impl ReplicationGate for PgReplicationGate {
    async fn wait_for_replication(&self) -> Result<()> {
        let start = Instant::now();
        let max_lag_ms = self.max_lag.as_millis() as i64;
        loop {
            let lag_ms = self.replay_lag_ms().await?;
            if lag_ms <= max_lag_ms {
                debug!(
                    subsystem = "db",
                    component = "replication",
                    lag_ms,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Replicas caught up"
                );
                return Ok(());
            }
            if start.elapsed() >= self.timeout {
                warn!(
                    subsystem = "db",
                    component = "replication",
                    lag_ms,
                    max_lag_ms,
                    "Timed out waiting for replication, continuing"
                );
                return Ok(());
            }
            sleep(self.poll_interval).await;
        }
    }
}
