//! Search request body for pages with image recommendations.

use serde_json::{json, Value as JsonValue};
use tracing::warn;

use imagesuggest_core::{defaults, Error, PageCursor, PageId, Result};

/// Builder for the recommendation search request.
///
/// Matches any page carrying one of the recommendation tags, returns only
/// document ids, and sorts by page id so that search-after resumes in a
/// stable order. With categories set, pages must also be in at least one of
/// them.
#[derive(Debug, Clone)]
pub struct RecommendationQuery {
    field: String,
    tags: Vec<String>,
    categories: Vec<String>,
    size: usize,
    cursor: PageCursor,
}

impl Default for RecommendationQuery {
    fn default() -> Self {
        Self {
            field: defaults::WEIGHTED_TAGS_FIELD.to_string(),
            tags: vec![
                defaults::TAG_IMAGE_RECOMMENDATION.to_string(),
                defaults::TAG_SECTION_IMAGE_RECOMMENDATION.to_string(),
            ],
            categories: Vec::new(),
            size: defaults::BATCH_SIZE,
            cursor: PageCursor::START,
        }
    }
}

impl RecommendationQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_cursor(mut self, cursor: PageCursor) -> Self {
        self.cursor = cursor;
        self
    }

    /// Restrict to pages in any of these categories (names without namespace).
    pub fn with_categories(mut self, categories: &[String]) -> Self {
        self.categories = categories.iter().map(|c| c.replace('_', " ")).collect();
        self
    }

    /// Override the tag field (e.g. for indexes using a different mapping).
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn to_body(&self) -> JsonValue {
        let tag_clauses = match_any(&self.field, &self.tags);
        let query = if self.categories.is_empty() {
            tag_clauses
        } else {
            json!({
                "bool": {
                    "filter": [
                        tag_clauses,
                        match_any(defaults::CATEGORY_FIELD, &self.categories)
                    ]
                }
            })
        };

        let mut body = json!({
            "size": self.size,
            "_source": false,
            "stored_fields": ["_id"],
            "query": query,
            "sort": [{ "page_id": "asc" }]
        });

        if let Some(after) = self.cursor.search_after() {
            body["search_after"] = json!([after]);
        }
        body
    }
}

fn match_any(field: &str, values: &[String]) -> JsonValue {
    let should: Vec<JsonValue> = values
        .iter()
        .map(|value| {
            let mut clause = serde_json::Map::new();
            clause.insert(field.to_string(), json!(value));
            json!({ "match": clause })
        })
        .collect();
    json!({
        "bool": {
            "should": should,
            "minimum_should_match": 1
        }
    })
}

/// Page ids of one search response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHits {
    /// Ids of the hits that resolved to a page, in hit order.
    pub page_ids: Vec<PageId>,
    /// Hits in the response, including unusable ones.
    pub hit_count: usize,
    /// `page_id` sort value of the last hit, when the index returned one.
    pub last_sort_key: Option<PageId>,
}

/// Page id from a document id: a plain number, or `wiki|number`.
pub fn parse_page_id(id: &JsonValue) -> Option<PageId> {
    let id = match id {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.rsplit('|').next().and_then(|s| s.trim().parse().ok()),
        _ => None,
    }?;
    (id > 0).then_some(id)
}

/// Extract page ids from a search response, in hit order.
///
/// Hits whose id does not resolve to a page are skipped. Only a response
/// without a hits array is an error.
pub fn parse_hits(response: &JsonValue) -> Result<SearchHits> {
    let hits = response
        .get("hits")
        .and_then(|h| h.get("hits"))
        .and_then(JsonValue::as_array)
        .ok_or_else(|| Error::Search("Response has no hits array".to_string()))?;

    let mut page_ids = Vec::with_capacity(hits.len());
    for hit in hits {
        match hit.get("_id").and_then(parse_page_id) {
            Some(id) => page_ids.push(id),
            None => warn!(
                subsystem = "search",
                component = "page_stream",
                id = %hit.get("_id").unwrap_or(&JsonValue::Null),
                "Skipping hit without a usable page id"
            ),
        }
    }

    let last_sort_key = hits
        .last()
        .and_then(|hit| hit.get("sort"))
        .and_then(|sort| sort.get(0))
        .and_then(JsonValue::as_i64);

    Ok(SearchHits {
        page_ids,
        hit_count: hits.len(),
        last_sort_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_matches_either_tag() {
        let body = RecommendationQuery::new().to_body();
        let should = body["query"]["bool"]["should"].as_array().unwrap();
        assert_eq!(should.len(), 2);
        assert_eq!(
            should[0]["match"]["weighted_tags"],
            "recommendation.image/exists"
        );
        assert_eq!(
            should[1]["match"]["weighted_tags"],
            "recommendation.image_section/exists"
        );
        assert_eq!(body["query"]["bool"]["minimum_should_match"], 1);
    }

    #[test]
    fn test_body_returns_ids_only_sorted_by_page_id() {
        let body = RecommendationQuery::new().with_size(25).to_body();
        assert_eq!(body["size"], 25);
        assert_eq!(body["_source"], false);
        assert_eq!(body["stored_fields"], json!(["_id"]));
        assert_eq!(body["sort"], json!([{ "page_id": "asc" }]));
    }

    #[test]
    fn test_search_after_only_when_resuming() {
        let fresh = RecommendationQuery::new().to_body();
        assert!(fresh.get("search_after").is_none());

        let resumed = RecommendationQuery::new()
            .with_cursor(PageCursor::after(999))
            .to_body();
        assert_eq!(resumed["search_after"], json!([999]));
    }

    #[test]
    fn test_category_filter_wraps_tag_clauses() {
        let body = RecommendationQuery::new()
            .with_categories(&["Lunar_craters".to_string(), "Moons".to_string()])
            .to_body();
        let filter = body["query"]["bool"]["filter"].as_array().unwrap();
        assert_eq!(filter.len(), 2);
        assert_eq!(filter[0]["bool"]["should"].as_array().unwrap().len(), 2);
        assert_eq!(
            filter[1]["bool"]["should"],
            json!([
                { "match": { "category.lowercase_keyword": "Lunar craters" } },
                { "match": { "category.lowercase_keyword": "Moons" } }
            ])
        );
        assert_eq!(filter[1]["bool"]["minimum_should_match"], 1);
    }

    #[test]
    fn test_parse_hits() {
        let response = json!({
            "hits": { "hits": [ { "_id": "12" }, { "_id": "40" }, { "_id": 41, "sort": [41] } ] }
        });
        let hits = parse_hits(&response).unwrap();
        assert_eq!(hits.page_ids, vec![12, 40, 41]);
        assert_eq!(hits.hit_count, 3);
        assert_eq!(hits.last_sort_key, Some(41));
    }

    #[test]
    fn test_parse_page_id_forms() {
        assert_eq!(parse_page_id(&json!("17")), Some(17));
        assert_eq!(parse_page_id(&json!(17)), Some(17));
        assert_eq!(parse_page_id(&json!("enwiki|9")), Some(9));
        assert_eq!(parse_page_id(&json!("abc")), None);
        assert_eq!(parse_page_id(&json!("enwiki|")), None);
        assert_eq!(parse_page_id(&json!(-3)), None);
        assert_eq!(parse_page_id(&json!(null)), None);
    }

    #[test]
    fn test_unusable_hits_are_skipped() {
        let response = json!({
            "hits": { "hits": [ { "_id": "5" }, { "_id": "abc" }, {}, { "_id": "enwiki|12" } ] }
        });
        let hits = parse_hits(&response).unwrap();
        assert_eq!(hits.page_ids, vec![5, 12]);
        assert_eq!(hits.hit_count, 4);

        let empty = json!({ "hits": { "hits": [] } });
        assert!(parse_hits(&empty).unwrap().page_ids.is_empty());
        assert!(parse_hits(&json!({})).is_err());
    }
}
