//! User option lookup backed by `user_properties`.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use imagesuggest_core::{Error, Result, User, UserOptionsLookup};

/// PostgreSQL implementation of UserOptionsLookup.
///
/// Users only have a `user_properties` row for options they changed; anything
/// else falls back to the configured default (false when unset).
#[derive(Clone)]
pub struct PgUserOptionsLookup {
    pool: Pool<Postgres>,
    defaults: HashMap<String, bool>,
}

impl PgUserOptionsLookup {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            defaults: HashMap::new(),
        }
    }

    /// Set the value used when a user has no stored row for `option`.
    pub fn with_default(mut self, option: impl Into<String>, enabled: bool) -> Self {
        self.defaults.insert(option.into(), enabled);
        self
    }

    pub fn default_for(&self, option: &str) -> bool {
        self.defaults.get(option).copied().unwrap_or(false)
    }
}

/// Interpret a stored option value as a boolean.
pub fn option_value_enabled(value: &str) -> bool {
    !matches!(value.trim(), "" | "0" | "false")
}

#[async_trait]
impl UserOptionsLookup for PgUserOptionsLookup {
    async fn is_enabled(&self, user: &User, option: &str) -> Result<bool> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT up_value FROM user_properties WHERE up_user = $1 AND up_property = $2",
        )
        .bind(user.id)
        .bind(option)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(match value {
            Some(value) => option_value_enabled(&value),
            None => self.default_for(option),
        })
    }
}
