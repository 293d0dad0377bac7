//! HTTP page stream over the search index.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value as JsonValue;
use tracing::{debug, instrument, warn};

use imagesuggest_core::{
    defaults, Error, PageCandidateStream, PageCursor, PageId, PageQuery, Result,
};

use crate::query::{parse_hits, RecommendationQuery};

/// Page stream backed by a search index `_search` endpoint.
pub struct SearchPageStream {
    client: Client,
    base_url: String,
    index: String,
}

impl SearchPageStream {
    /// Create a stream with the default request timeout.
    pub fn new(base_url: impl Into<String>, index: impl Into<String>) -> Result<Self> {
        Self::with_timeout(
            base_url,
            index,
            Duration::from_secs(defaults::HTTP_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        index: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            index: index.into(),
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    fn search_url(&self) -> String {
        format!("{}/{}/_search", self.base_url, self.index)
    }

    async fn search(&self, body: &JsonValue) -> Result<JsonValue> {
        let response = self
            .client
            .post(self.search_url())
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Search(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Search(format!(
                "Search index returned {}: {}",
                status, text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Search(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl PageCandidateStream for SearchPageStream {
    #[instrument(skip(self, query), fields(subsystem = "search", component = "page_stream", op = "next_batch", index = %self.index, last_page_id = query.cursor.0))]
    async fn next_batch(&self, query: PageQuery<'_>) -> Result<Vec<PageId>> {
        let start = Instant::now();
        let mut cursor = query.cursor;

        let page_ids = loop {
            let body = RecommendationQuery::new()
                .with_size(query.batch_size)
                .with_cursor(cursor)
                .with_categories(query.categories)
                .to_body();
            let hits = parse_hits(&self.search(&body).await?)?;

            if !hits.page_ids.is_empty() || hits.hit_count == 0 {
                break hits.page_ids;
            }
            // A full batch of unusable hits is not the end of the stream.
            match hits.last_sort_key {
                Some(key) if key > cursor.0 => {
                    warn!(
                        skipped = hits.hit_count,
                        after = key,
                        "No usable page id in batch, continuing"
                    );
                    cursor = PageCursor::after(key);
                }
                _ => {
                    warn!(
                        skipped = hits.hit_count,
                        "No usable page id in batch and no sort key to resume from"
                    );
                    break Vec::new();
                }
            }
        };

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            result_count = page_ids.len(),
            categories = query.categories.len(),
            duration_ms = elapsed,
            "Fetched candidate pages"
        );
        if elapsed > defaults::SLOW_REQUEST_MS {
            warn!(duration_ms = elapsed, slow = true, "Slow search request");
        }
        Ok(page_ids)
    }
}
