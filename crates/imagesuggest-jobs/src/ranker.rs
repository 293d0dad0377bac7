//! Suggestion filtering and ranking.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use imagesuggest_core::{
    defaults, CandidateSuggestion, InstanceOfScope, PageId, RankedSuggestion, RunConfig,
    SuggestionSource,
};

/// Rank raw candidates for one page.
///
/// Output is at most one article-level suggestion (the most confident) followed
/// by up to [`defaults::MAX_SECTION_SUGGESTIONS_PER_NOTIFICATION`] section-level
/// suggestions, one per section, ordered by their position on the page.
pub fn rank_candidates(
    candidates: Vec<CandidateSuggestion>,
    instance_of: &[String],
    config: &RunConfig,
) -> Vec<RankedSuggestion> {
    let excluded = !config.exclude_instance_of.is_empty()
        && instance_of
            .iter()
            .any(|tag| config.exclude_instance_of.contains(tag));

    let mut kept: Vec<CandidateSuggestion> = candidates
        .into_iter()
        .filter(|c| match (excluded, config.instance_of_scope) {
            (true, InstanceOfScope::Page) => false,
            (true, InstanceOfScope::Article) => !c.is_article_level(),
            (false, _) => true,
        })
        .filter(|c| {
            if c.is_article_level() {
                c.confidence >= config.min_confidence
            } else {
                c.confidence >= config.min_confidence_section
            }
        })
        .collect();

    // Stable: equal confidences keep their source order.
    kept.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut seen: HashSet<Option<String>> = HashSet::new();
    kept.retain(|c| seen.insert(c.section_heading.clone()));

    let mut article = None;
    let mut sections = Vec::new();
    for candidate in kept {
        if candidate.is_article_level() {
            article.get_or_insert(candidate);
        } else if sections.len() < defaults::MAX_SECTION_SUGGESTIONS_PER_NOTIFICATION {
            sections.push(candidate);
        }
    }
    sections.sort_by_key(|c| c.section_index.unwrap_or(i64::MAX));

    article.into_iter().chain(sections).collect()
}

/// Fetches suggestions for a page and ranks them.
#[derive(Clone)]
pub struct SuggestionRanker {
    source: Arc<dyn SuggestionSource>,
    wiki_id: String,
}

impl SuggestionRanker {
    pub fn new(source: Arc<dyn SuggestionSource>, wiki_id: impl Into<String>) -> Self {
        Self {
            source,
            wiki_id: wiki_id.into(),
        }
    }

    /// Ranked suggestions for the page; any fetch failure ranks as empty.
    pub async fn rank(&self, page_id: PageId, config: &RunConfig) -> Vec<RankedSuggestion> {
        let with_instance_of = !config.exclude_instance_of.is_empty();
        let fetch = match self
            .source
            .fetch(&self.wiki_id, page_id, with_instance_of)
            .await
        {
            Ok(fetch) => fetch,
            Err(e) => {
                warn!(
                    subsystem = "jobs",
                    component = "ranker",
                    page_id,
                    error = %e,
                    "Suggestion fetch failed"
                );
                return Vec::new();
            }
        };

        let candidate_count = fetch.suggestions.len();
        trace!(page_id, candidate_count, instance_of = ?fetch.instance_of, "Ranking candidates");
        let ranked = rank_candidates(fetch.suggestions, &fetch.instance_of, config);
        debug!(
            subsystem = "jobs",
            component = "ranker",
            page_id,
            candidate_count,
            result_count = ranked.len(),
            "Ranked suggestions"
        );
        ranked
    }
}
