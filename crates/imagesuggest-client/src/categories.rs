//! Subcategory expansion through a SPARQL category-tree service.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use imagesuggest_core::{defaults, CategoryExpander, Error, Result, WikiMap};

/// SPARQL JSON results, reduced to the `?out` binding.
#[derive(Debug, Default, Deserialize)]
struct SparqlResponse {
    #[serde(default)]
    results: SparqlResults,
}

#[derive(Debug, Default, Deserialize)]
struct SparqlResults {
    #[serde(default)]
    bindings: Vec<SparqlBinding>,
}

#[derive(Debug, Deserialize)]
struct SparqlBinding {
    out: Option<SparqlTerm>,
}

#[derive(Debug, Deserialize)]
struct SparqlTerm {
    value: String,
}

/// Category expander backed by a category-tree SPARQL endpoint.
///
/// Categories are identified by their full page URL; `category_prefix` is the
/// URL of the category namespace up to the name, e.g.
/// `https://en.example.org/wiki/Category:`.
pub struct SparqlCategoryExpander {
    client: Client,
    endpoint: String,
    category_prefix: String,
    depth: u32,
    limit: u32,
}

impl SparqlCategoryExpander {
    pub fn new(endpoint: impl Into<String>, category_prefix: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(defaults::HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            category_prefix: category_prefix.into(),
            depth: defaults::CATEGORY_DEPTH,
            limit: defaults::CATEGORY_MAX,
        })
    }

    /// Expander for the categories of `wiki_id`, with the prefix taken from
    /// the wiki map.
    pub fn for_wiki(
        endpoint: impl Into<String>,
        wiki_map: &dyn WikiMap,
        wiki_id: &str,
    ) -> Result<Self> {
        let placeholder = format!("{}:ZZ", defaults::CATEGORY_NAMESPACE);
        let prefix = wiki_map
            .foreign_url(wiki_id, &placeholder)
            .and_then(|url| url.strip_suffix("ZZ").map(str::to_string))
            .ok_or_else(|| Error::Config(format!("No site configured for {}", wiki_id)))?;
        Self::new(endpoint, prefix)
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    fn category_url(&self, name: &str) -> String {
        format!(
            "{}{}",
            self.category_prefix,
            urlencoding::encode(&name.trim().replace(' ', "_"))
        )
    }

    /// Category-tree query for one root, closest subcategories first.
    pub fn tree_query(&self, root: &str) -> String {
        format!(
            "SELECT ?out WHERE {{\n\
             \tSERVICE mediawiki:categoryTree {{\n\
             \t\tbd:serviceParam mediawiki:start <{}> .\n\
             \t\tbd:serviceParam mediawiki:direction \"Reverse\" .\n\
             \t\tbd:serviceParam mediawiki:depth {} .\n\
             \t}}\n\
             }} ORDER BY ASC(?depth)\n\
             LIMIT {}",
            self.category_url(root),
            self.depth,
            self.limit
        )
    }

    /// Category name of a result URL, or `None` when it is not a category of
    /// this wiki.
    fn category_name(&self, url: &str) -> Option<String> {
        let encoded = url.strip_prefix(&self.category_prefix)?;
        let name = urlencoding::decode(encoded).ok()?.replace('_', " ");
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }

    async fn query(&self, root: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("query", self.tree_query(root)), ("format", "json".to_string())])
            .header("Accept", "application/sparql-results+json")
            .send()
            .await
            .map_err(|e| Error::Request(format!("Category query failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Request(format!(
                "Category query returned {}",
                response.status()
            )));
        }

        let body: SparqlResponse = response
            .json()
            .await
            .map_err(|e| Error::Request(format!("Malformed category query response: {}", e)))?;

        Ok(body
            .results
            .bindings
            .into_iter()
            .filter_map(|binding| binding.out)
            .filter_map(|term| {
                let name = self.category_name(&term.value);
                if name.is_none() {
                    debug!(url = %term.value, "Ignoring foreign category URL");
                }
                name
            })
            .collect())
    }
}

#[async_trait]
impl CategoryExpander for SparqlCategoryExpander {
    #[instrument(skip(self, roots), fields(subsystem = "suggestions", component = "category_expander", op = "expand", root_count = roots.len()))]
    async fn expand(&self, roots: &[String]) -> Result<Vec<String>> {
        let start = Instant::now();
        let mut categories: Vec<String> = Vec::new();
        for root in roots {
            for name in self.query(root).await? {
                if !categories.contains(&name) {
                    categories.push(name);
                }
            }
        }

        if categories.is_empty() {
            warn!("Category query found nothing, using the given categories");
            return Ok(roots.to_vec());
        }

        debug!(
            result_count = categories.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Expanded categories"
        );
        Ok(categories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SiteWikiMap;

    fn expander() -> SparqlCategoryExpander {
        SparqlCategoryExpander::new(
            "https://query.example.org/sparql",
            "https://en.example.org/wiki/Category:",
        )
        .unwrap()
        .with_depth(3)
        .with_limit(10)
    }

    #[test]
    fn test_tree_query_names_root_url_and_bounds() {
        let query = expander().tree_query("Lunar craters");

        assert!(query.contains("mediawiki:start <https://en.example.org/wiki/Category:Lunar_craters>"));
        assert!(query.contains("mediawiki:direction \"Reverse\""));
        assert!(query.contains("mediawiki:depth 3 ."));
        assert!(query.ends_with("LIMIT 10"));
    }

    #[test]
    fn test_category_name_decodes_and_rejects_foreign_urls() {
        let expander = expander();

        assert_eq!(
            expander
                .category_name("https://en.example.org/wiki/Category:Caf%C3%A9s_of_Paris")
                .as_deref(),
            Some("Cafés of Paris")
        );
        assert!(expander
            .category_name("https://de.example.org/wiki/Kategorie:Krater")
            .is_none());
        assert!(expander
            .category_name("https://en.example.org/wiki/Category:")
            .is_none());
    }

    #[test]
    fn test_prefix_from_wiki_map() {
        let map = SiteWikiMap::new().with_site("enwiki", "https://en.example.org");

        let expander = SparqlCategoryExpander::for_wiki("https://q", &map, "enwiki").unwrap();
        assert_eq!(expander.category_prefix, "https://en.example.org/wiki/Category:");

        assert!(SparqlCategoryExpander::for_wiki("https://q", &map, "dewiki").is_err());
    }
}
