//! User repository: watchers of a page and lookups by name.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, instrument};

use imagesuggest_core::{Error, Page, Result, User, UserId, UserRepository, WatcherQuery};

/// Watchers of a page with enough edits, most recent editor of that page first.
///
/// The revision join is outer: a watcher who never edited the page still
/// qualifies and sorts after every editor. `$4` is the exclusion list (an
/// empty array excludes nobody).
pub(crate) const WATCHERS_SQL: &str = r#"
SELECT u.user_id, u.user_name
FROM watchlist wl
JOIN "user" u ON u.user_id = wl.wl_user
JOIN actor a ON a.actor_user = wl.wl_user
JOIN page p ON p.page_namespace = wl.wl_namespace AND p.page_title = wl.wl_title
LEFT JOIN revision r ON r.rev_page = p.page_id AND r.rev_actor = a.actor_id
WHERE wl.wl_namespace = $1
  AND wl.wl_title = $2
  AND u.user_editcount >= $3
  AND wl.wl_user <> ALL($4)
GROUP BY u.user_id, u.user_name
ORDER BY MAX(r.rev_timestamp) DESC NULLS LAST, u.user_id ASC
LIMIT $5
"#;

/// Given users, most recent editor of the page first.
///
/// Users who never edited the page sort last. `$2` is the user id list.
pub(crate) const RECENT_EDITORS_SQL: &str = r#"
SELECT u.user_id, u.user_name
FROM "user" u
JOIN actor a ON a.actor_user = u.user_id
LEFT JOIN revision r ON r.rev_page = $1 AND r.rev_actor = a.actor_id
WHERE u.user_id = ANY($2)
GROUP BY u.user_id, u.user_name
ORDER BY MAX(r.rev_timestamp) DESC NULLS LAST, u.user_id ASC
LIMIT $3
"#;

/// PostgreSQL implementation of UserRepository.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: Pool<Postgres>,
}

impl PgUserRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_user_row(row: sqlx::postgres::PgRow) -> User {
        User {
            id: row.get("user_id"),
            name: row.get("user_name"),
        }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    #[instrument(skip(self, query), fields(subsystem = "db", component = "users", op = "watchers", page_id = query.page.id))]
    async fn watchers(&self, query: WatcherQuery<'_>) -> Result<Vec<User>> {
        let rows = sqlx::query(WATCHERS_SQL)
            .bind(query.page.namespace)
            .bind(&query.page.db_key)
            .bind(query.min_edit_count)
            .bind(query.exclude_user_ids)
            .bind(query.limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        debug!(
            result_count = rows.len(),
            excluded = query.exclude_user_ids.len(),
            "Fetched watcher candidates"
        );
        Ok(rows.into_iter().map(Self::parse_user_row).collect())
    }

    #[instrument(skip(self, page, user_ids), fields(subsystem = "db", component = "users", op = "by_recent_edit", page_id = page.id))]
    async fn by_recent_edit(
        &self,
        page: &Page,
        user_ids: &[UserId],
        limit: i64,
    ) -> Result<Vec<User>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(RECENT_EDITORS_SQL)
            .bind(page.id)
            .bind(user_ids)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        debug!(result_count = rows.len(), "Ordered named users by recent edit");
        Ok(rows.into_iter().map(Self::parse_user_row).collect())
    }

    async fn user_by_name(&self, name: &str) -> Result<Option<User>> {
        let row = sqlx::query(r#"SELECT user_id, user_name FROM "user" WHERE user_name = $1"#)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_user_row))
    }
}
