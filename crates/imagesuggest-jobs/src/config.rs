//! Environment configuration for the notifier binary.

use std::time::Duration;

use imagesuggest_core::{defaults, NotificationChannel};

/// Process-level configuration read from the environment.
///
/// Endpoints stay optional here; [`crate::factory::AppNotifierFactory`]
/// reports the missing ones when a batch is about to run.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `DATABASE_URL` | (none) | Postgres connection string |
/// | `SEARCH_URL` | (none) | Search index base URL |
/// | `SEARCH_INDEX` | `wiki_content` | Index holding recommendation tags |
/// | `SUGGESTIONS_API` | (none) | Suggestion URL template (`{wiki_id}`, `{page_id}`) |
/// | `INSTANCE_OF_API` | (none) | Instance-of URL template (`{wiki_id}`, `{page_id}`) |
/// | `WIKI_ID` | (none) | Id of the wiki being notified about |
/// | `WIKI_SITES` | empty | `wiki=https://host,...` for media URLs |
/// | `OPT_IN_DEFAULT_CHANNELS` | empty | Channels enabled for users without a stored option |
/// | `CATEGORY_ENDPOINT` | (none) | SPARQL endpoint for subcategory expansion |
/// | `CATEGORY_DEPTH` | `5` | Subcategory levels followed from each category |
/// | `CATEGORY_MAX` | `256` | Most categories one category expands to |
/// | `HTTP_TIMEOUT_SECS` | `30` | Search and suggestion request timeout |
/// | `JOB_POLL_INTERVAL_MS` | `5000` | Worker polling interval when the queue is empty |
/// | `REPLICATION_MAX_LAG_MS` | `1000` | Replica lag tolerated between batches |
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub search_url: Option<String>,
    pub search_index: String,
    pub suggestions_api: Option<String>,
    pub instance_of_api: Option<String>,
    pub wiki_id: Option<String>,
    pub wiki_sites: String,
    pub default_channels: Vec<NotificationChannel>,
    pub category_endpoint: Option<String>,
    pub category_depth: u32,
    pub category_max: u32,
    pub http_timeout: Duration,
    pub job_poll_interval_ms: u64,
    pub replication_max_lag: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            search_url: None,
            search_index: defaults::SEARCH_INDEX.to_string(),
            suggestions_api: None,
            instance_of_api: None,
            wiki_id: None,
            wiki_sites: String::new(),
            default_channels: Vec::new(),
            category_endpoint: None,
            category_depth: defaults::CATEGORY_DEPTH,
            category_max: defaults::CATEGORY_MAX,
            http_timeout: Duration::from_secs(defaults::HTTP_TIMEOUT_SECS),
            job_poll_interval_ms: defaults::JOB_POLL_INTERVAL_MS,
            replication_max_lag: Duration::from_millis(defaults::REPLICATION_MAX_LAG_MS),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let base = Self::default();

        let default_channels = get("OPT_IN_DEFAULT_CHANNELS")
            .map(|v| {
                v.split(',')
                    .filter_map(|name| {
                        NotificationChannel::ALL
                            .into_iter()
                            .find(|c| c.as_str() == name.trim())
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            database_url: get("DATABASE_URL"),
            search_url: get("SEARCH_URL"),
            search_index: get("SEARCH_INDEX").unwrap_or(base.search_index),
            suggestions_api: get("SUGGESTIONS_API"),
            instance_of_api: get("INSTANCE_OF_API"),
            wiki_id: get("WIKI_ID"),
            wiki_sites: get("WIKI_SITES").unwrap_or_default(),
            default_channels,
            category_endpoint: get("CATEGORY_ENDPOINT"),
            category_depth: get("CATEGORY_DEPTH")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(base.category_depth),
            category_max: get("CATEGORY_MAX")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(base.category_max),
            http_timeout: get("HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(base.http_timeout),
            job_poll_interval_ms: get("JOB_POLL_INTERVAL_MS")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(base.job_poll_interval_ms),
            replication_max_lag: get("REPLICATION_MAX_LAG_MS")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(base.replication_max_lag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[]));
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.search_index, "wiki_content");
        assert!(config.search_url.is_none());
    }

    #[test]
    fn test_reads_values() {
        let config = AppConfig::from_lookup(lookup(&[
            ("SEARCH_URL", "http://search:9200"),
            ("SEARCH_INDEX", "enwiki_content"),
            ("WIKI_ID", "enwiki"),
            ("HTTP_TIMEOUT_SECS", "5"),
            ("OPT_IN_DEFAULT_CHANNELS", "web, push, carrier-pigeon"),
            ("REPLICATION_MAX_LAG_MS", "250"),
            ("CATEGORY_ENDPOINT", "https://query.example.org/sparql"),
            ("CATEGORY_DEPTH", "2"),
        ]));
        assert_eq!(config.search_url.as_deref(), Some("http://search:9200"));
        assert_eq!(config.search_index, "enwiki_content");
        assert_eq!(config.wiki_id.as_deref(), Some("enwiki"));
        assert_eq!(config.http_timeout, Duration::from_secs(5));
        assert_eq!(
            config.default_channels,
            vec![NotificationChannel::Web, NotificationChannel::Push]
        );
        assert_eq!(config.replication_max_lag, Duration::from_millis(250));
        assert_eq!(
            config.category_endpoint.as_deref(),
            Some("https://query.example.org/sparql")
        );
        assert_eq!(config.category_depth, 2);
        assert_eq!(config.category_max, defaults::CATEGORY_MAX);
    }

    #[test]
    fn test_blank_and_invalid_values_fall_back() {
        let config = AppConfig::from_lookup(lookup(&[
            ("SEARCH_URL", "  "),
            ("JOB_POLL_INTERVAL_MS", "soon"),
        ]));
        assert!(config.search_url.is_none());
        assert_eq!(config.job_poll_interval_ms, defaults::JOB_POLL_INTERVAL_MS);
    }
}
