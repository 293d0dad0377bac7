//! Wiki id to server mapping for foreign URLs.

use std::collections::HashMap;

use imagesuggest_core::{Error, Result, WikiMap};

/// Default article path appended to a wiki's server.
pub const DEFAULT_ARTICLE_PATH: &str = "/wiki/";

/// Static map of wiki ids to their servers.
#[derive(Debug, Clone)]
pub struct SiteWikiMap {
    servers: HashMap<String, String>,
    article_path: String,
}

impl Default for SiteWikiMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteWikiMap {
    pub fn new() -> Self {
        Self {
            servers: HashMap::new(),
            article_path: DEFAULT_ARTICLE_PATH.to_string(),
        }
    }

    pub fn with_site(mut self, wiki_id: impl Into<String>, server: impl Into<String>) -> Self {
        let server: String = server.into();
        self.servers
            .insert(wiki_id.into(), server.trim_end_matches('/').to_string());
        self
    }

    pub fn with_article_path(mut self, path: impl Into<String>) -> Self {
        self.article_path = path.into();
        self
    }

    /// Parse `wiki=https://host,other=https://host2`.
    pub fn parse(sites: &str) -> Result<Self> {
        let mut map = Self::new();
        for entry in sites.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (wiki_id, server) = entry
                .split_once('=')
                .ok_or_else(|| Error::InvalidInput(format!("Invalid wiki site entry: {}", entry)))?;
            let (wiki_id, server) = (wiki_id.trim(), server.trim());
            if wiki_id.is_empty() || server.is_empty() {
                return Err(Error::InvalidInput(format!("Invalid wiki site entry: {}", entry)));
            }
            map = map.with_site(wiki_id, server);
        }
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// Encode a title for use in a URL path, keeping `:` and `/` readable.
fn encode_title(title: &str) -> String {
    urlencoding::encode(&title.trim().replace(' ', "_"))
        .replace("%3A", ":")
        .replace("%2F", "/")
}

impl WikiMap for SiteWikiMap {
    fn foreign_url(&self, wiki_id: &str, title: &str) -> Option<String> {
        let server = self.servers.get(wiki_id)?;
        Some(format!(
            "{}{}{}",
            server,
            self.article_path,
            encode_title(title)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreign_url_normalizes_title() {
        let map = SiteWikiMap::new().with_site("commonswiki", "https://commons.example.org/");
        assert_eq!(
            map.foreign_url("commonswiki", "File:Full Moon.jpg").as_deref(),
            Some("https://commons.example.org/wiki/File:Full_Moon.jpg")
        );
        assert_eq!(
            map.foreign_url("commonswiki", "File:Café (night).jpg").as_deref(),
            Some("https://commons.example.org/wiki/File:Caf%C3%A9_%28night%29.jpg")
        );
    }

    #[test]
    fn test_unknown_wiki_has_no_url() {
        let map = SiteWikiMap::new().with_site("enwiki", "https://en.example.org");
        assert!(map.foreign_url("dewiki", "File:X.jpg").is_none());
    }

    #[test]
    fn test_parse_sites() {
        let map =
            SiteWikiMap::parse("commonswiki=https://commons.example.org, enwiki=https://en.example.org")
                .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(
            map.foreign_url("enwiki", "Main Page").as_deref(),
            Some("https://en.example.org/wiki/Main_Page")
        );

        assert!(SiteWikiMap::parse("").unwrap().is_empty());
        assert!(SiteWikiMap::parse("enwiki").is_err());
        assert!(SiteWikiMap::parse("=https://x").is_err());
    }
}
