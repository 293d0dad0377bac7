//! Page repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use imagesuggest_core::{Error, Page, PageId, PageLookup, Result};

/// PostgreSQL implementation of PageLookup.
#[derive(Clone)]
pub struct PgPageRepository {
    pool: Pool<Postgres>,
}

impl PgPageRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_page_row(row: sqlx::postgres::PgRow) -> Page {
        Page {
            id: row.get("page_id"),
            namespace: row.get("page_namespace"),
            db_key: row.get("page_title"),
        }
    }
}

/// Normalize a display title to its database key form.
pub fn title_to_db_key(title: &str) -> String {
    title.trim().replace(' ', "_")
}

#[async_trait]
impl PageLookup for PgPageRepository {
    async fn page_by_id(&self, page_id: PageId) -> Result<Option<Page>> {
        let row = sqlx::query(
            "SELECT page_id, page_namespace, page_title FROM page WHERE page_id = $1",
        )
        .bind(page_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_page_row))
    }

    async fn page_by_title(&self, namespace: i32, db_key: &str) -> Result<Option<Page>> {
        let row = sqlx::query(
            "SELECT page_id, page_namespace, page_title FROM page
             WHERE page_namespace = $1 AND page_title = $2",
        )
        .bind(namespace)
        .bind(title_to_db_key(db_key))
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_page_row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_to_db_key() {
        assert_eq!(title_to_db_key(" Main Page "), "Main_Page");
        assert_eq!(title_to_db_key("Already_Keyed"), "Already_Keyed");
    }
}
