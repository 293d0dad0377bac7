//! # imagesuggest-client
//!
//! Clients for the external systems a notification run reads from.
//!
//! This crate provides:
//! - [`HttpSuggestionSource`]: per-page suggestion and instance-of API calls,
//!   issued concurrently and decoded leniently
//! - [`SiteWikiMap`]: wiki id to server mapping for building media URLs
//! - [`SparqlCategoryExpander`]: subcategories of the categories a targeted
//!   run is limited to
//!
//! ## Example
//!
//! ```ignore
//! use imagesuggest_client::{HttpSuggestionSource, SuggestionSource};
//!
//! let source = HttpSuggestionSource::new(
//!     "https://api.example.org/image-suggestions/{wiki_id}/{page_id}",
//!     "https://api.example.org/instanceof/{wiki_id}/{page_id}",
//! )?;
//! let fetch = source.fetch("enwiki", 999, false).await?;
//! ```

pub mod categories;
pub mod suggestions;
pub mod wiki_map;

// Re-export core types
pub use imagesuggest_core::*;

pub use categories::SparqlCategoryExpander;
pub use suggestions::{decode_rows, expand_template, HttpSuggestionSource};
pub use wiki_map::SiteWikiMap;
