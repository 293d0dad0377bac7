//! Notification event storage: prior-notification lookups and the sink.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres};
use tracing::debug;

use imagesuggest_core::{
    defaults, Error, NotificationLog, NotificationRecord, NotificationSink, PageId, Result, UserId,
};

/// PostgreSQL notification repository.
///
/// Each notification is one `echo_event` row (agent = recipient) plus one
/// `echo_notification` row delivering it to that agent.
#[derive(Clone)]
pub struct PgNotificationRepository {
    pool: Pool<Postgres>,
    event_type: String,
}

impl PgNotificationRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            event_type: defaults::EVENT_NAME.to_string(),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }
}

#[async_trait]
impl NotificationLog for PgNotificationRepository {
    async fn notified_users_for_page(
        &self,
        event_type: &str,
        page_id: PageId,
    ) -> Result<Vec<UserId>> {
        let user_ids: Vec<UserId> = sqlx::query_scalar(
            "SELECT DISTINCT n.notification_user
             FROM echo_notification n
             JOIN echo_event e ON n.notification_event = e.event_id
             WHERE e.event_type = $1 AND e.event_page_id = $2",
        )
        .bind(event_type)
        .bind(page_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(user_ids)
    }
}

#[async_trait]
impl NotificationSink for PgNotificationRepository {
    async fn create(&self, record: &NotificationRecord, dry_run: bool) -> Result<bool> {
        if dry_run {
            return Ok(false);
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let event_id: i64 = sqlx::query_scalar(
            "INSERT INTO echo_event (event_type, event_agent_id, event_page_id, event_extra, event_created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING event_id",
        )
        .bind(&self.event_type)
        .bind(record.user.id)
        .bind(record.page.id)
        .bind(record.extra())
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query(
            "INSERT INTO echo_notification (notification_event, notification_user, notification_timestamp)
             VALUES ($1, $2, $3)",
        )
        .bind(event_id)
        .bind(record.user.id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "notifications",
            event_id,
            user_id = record.user.id,
            page_id = record.page.id,
            "Notification event created"
        );
        Ok(true)
    }
}
