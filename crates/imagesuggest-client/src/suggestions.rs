//! Suggestion and instance-of API client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, instrument, warn};

use imagesuggest_core::{
    defaults, CandidateSuggestion, Error, InstanceOfResponse, PageId, Result, SuggestionFetch,
    SuggestionSource, SuggestionsResponse,
};

/// Fill the `{wiki_id}` and `{page_id}` placeholders of an API URL template.
pub fn expand_template(template: &str, wiki_id: &str, page_id: PageId) -> String {
    template
        .replace("{wiki_id}", wiki_id)
        .replace("{page_id}", &page_id.to_string())
}

/// Decode suggestion rows one by one, dropping the ones that do not fit.
pub fn decode_rows(rows: Vec<JsonValue>) -> Vec<CandidateSuggestion> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<CandidateSuggestion>(row.clone()) {
            Ok(suggestion) => Some(suggestion),
            Err(e) => {
                debug!(row = %row, error = %e, "Dropping malformed suggestion row");
                None
            }
        })
        .collect()
}

/// HTTP implementation of SuggestionSource.
///
/// Both endpoints are plain GETs. A failed request, an error status or a body
/// that does not decode all yield the empty response for that endpoint; a
/// suggestion row that does not decode is dropped on its own.
pub struct HttpSuggestionSource {
    client: Client,
    suggestions_template: String,
    instance_of_template: String,
}

impl HttpSuggestionSource {
    pub fn new(
        suggestions_template: impl Into<String>,
        instance_of_template: impl Into<String>,
    ) -> Result<Self> {
        Self::with_timeout(
            suggestions_template,
            instance_of_template,
            Duration::from_secs(defaults::HTTP_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(
        suggestions_template: impl Into<String>,
        instance_of_template: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            suggestions_template: suggestions_template.into(),
            instance_of_template: instance_of_template.into(),
        })
    }

    async fn get_json<T: DeserializeOwned + Default>(&self, url: String) -> T {
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "Suggestion API request failed");
                return T::default();
            }
        };

        if !response.status().is_success() {
            debug!(url = %url, status = %response.status(), "Suggestion API returned error status");
            return T::default();
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to read suggestion API body");
                return T::default();
            }
        };

        serde_json::from_slice(&body).unwrap_or_else(|e| {
            debug!(url = %url, error = %e, "Malformed suggestion API body");
            T::default()
        })
    }
}

#[async_trait]
impl SuggestionSource for HttpSuggestionSource {
    #[instrument(skip(self), fields(subsystem = "suggestions", component = "client", op = "fetch"))]
    async fn fetch(
        &self,
        wiki_id: &str,
        page_id: PageId,
        with_instance_of: bool,
    ) -> Result<SuggestionFetch> {
        let start = Instant::now();
        let suggestions_url = expand_template(&self.suggestions_template, wiki_id, page_id);

        let (suggestions, instance_of) = if with_instance_of {
            let instance_of_url = expand_template(&self.instance_of_template, wiki_id, page_id);
            let (suggestions, instance_of) = tokio::join!(
                self.get_json::<SuggestionsResponse>(suggestions_url),
                self.get_json::<InstanceOfResponse>(instance_of_url),
            );
            (suggestions, instance_of.into_tags())
        } else {
            (
                self.get_json::<SuggestionsResponse>(suggestions_url).await,
                Vec::new(),
            )
        };

        let suggestions = decode_rows(suggestions.rows);
        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            result_count = suggestions.len(),
            instance_of_count = instance_of.len(),
            duration_ms = elapsed,
            "Fetched suggestions"
        );
        if elapsed > defaults::SLOW_REQUEST_MS {
            warn!(duration_ms = elapsed, slow = true, "Slow suggestion fetch");
        }

        Ok(SuggestionFetch {
            suggestions,
            instance_of,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_template() {
        assert_eq!(
            expand_template("https://api/{wiki_id}/pages/{page_id}", "enwiki", 999),
            "https://api/enwiki/pages/999"
        );
        assert_eq!(expand_template("https://api/static", "enwiki", 1), "https://api/static");
    }

    #[test]
    fn test_decode_rows_keeps_valid_rows() {
        let rows = vec![
            serde_json::json!({ "origin_wiki": "commonswiki", "image": "Moon.jpg", "confidence": 80 }),
            serde_json::json!({ "origin_wiki": "commonswiki", "image": "X.jpg", "confidence": null }),
            serde_json::json!("not a row"),
        ];

        assert_eq!(
            decode_rows(rows),
            vec![CandidateSuggestion::article("commonswiki", "Moon.jpg", 80.0)]
        );
    }
}
