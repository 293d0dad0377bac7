//! Construction of a Notifier for each batch.

use std::sync::Arc;

use imagesuggest_client::{HttpSuggestionSource, SiteWikiMap, SparqlCategoryExpander};
use imagesuggest_core::{defaults, Error, Result};
use imagesuggest_db::Database;
use imagesuggest_search::SearchPageStream;

use crate::config::AppConfig;
use crate::notifier::Notifier;
use crate::ranker::SuggestionRanker;
use crate::user_selector::UserSelector;

/// Builds the Notifier that runs a batch.
///
/// An error here is a misconfiguration: the batch is abandoned before any
/// page is processed.
pub trait NotifierFactory: Send + Sync {
    fn create(&self) -> Result<Notifier>;
}

/// Factory handing out clones of a prebuilt Notifier.
pub struct StaticNotifierFactory {
    notifier: Notifier,
}

impl StaticNotifierFactory {
    pub fn new(notifier: Notifier) -> Self {
        Self { notifier }
    }
}

impl NotifierFactory for StaticNotifierFactory {
    fn create(&self) -> Result<Notifier> {
        Ok(self.notifier.clone())
    }
}

/// Factory wiring the Postgres, search and HTTP collaborators from [`AppConfig`].
pub struct AppNotifierFactory {
    db: Database,
    config: AppConfig,
}

impl AppNotifierFactory {
    pub fn new(db: Database, config: AppConfig) -> Self {
        Self { db, config }
    }

    fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
        value
            .as_deref()
            .ok_or_else(|| Error::Config(format!("{} is not set", name)))
    }

    /// Site map used for media URLs.
    pub fn wiki_map(&self) -> Result<SiteWikiMap> {
        SiteWikiMap::parse(&self.config.wiki_sites)
    }

    /// Subcategory expander, or `None` when `CATEGORY_ENDPOINT` is unset.
    pub fn category_expander(&self) -> Result<Option<SparqlCategoryExpander>> {
        let Some(endpoint) = self.config.category_endpoint.as_deref() else {
            return Ok(None);
        };
        let wiki_id = Self::required(&self.config.wiki_id, "WIKI_ID")?;
        let expander = SparqlCategoryExpander::for_wiki(endpoint, &self.wiki_map()?, wiki_id)?
            .with_depth(self.config.category_depth)
            .with_limit(self.config.category_max);
        Ok(Some(expander))
    }
}

impl NotifierFactory for AppNotifierFactory {
    fn create(&self) -> Result<Notifier> {
        let search_url = Self::required(&self.config.search_url, "SEARCH_URL")?;
        let suggestions_api = Self::required(&self.config.suggestions_api, "SUGGESTIONS_API")?;
        let instance_of_api = Self::required(&self.config.instance_of_api, "INSTANCE_OF_API")?;
        let wiki_id = Self::required(&self.config.wiki_id, "WIKI_ID")?;

        let stream = SearchPageStream::with_timeout(
            search_url,
            self.config.search_index.as_str(),
            self.config.http_timeout,
        )?;
        let source = HttpSuggestionSource::with_timeout(
            suggestions_api,
            instance_of_api,
            self.config.http_timeout,
        )?;

        let options = self
            .config
            .default_channels
            .iter()
            .fold(self.db.user_options.clone(), |options, channel| {
                options.with_default(channel.option_name(defaults::EVENT_NAME), true)
            });

        let selector = UserSelector::new(
            Arc::new(self.db.notifications.clone()),
            Arc::new(self.db.users.clone()),
            Arc::new(options),
        );

        Ok(Notifier::new(
            Arc::new(stream),
            Arc::new(self.db.pages.clone()),
            selector,
            SuggestionRanker::new(Arc::new(source), wiki_id),
            Arc::new(self.wiki_map()?),
            Arc::new(self.db.notifications.clone()),
        ))
    }
}
