//! # imagesuggest-search
//!
//! Page stream over the search index for imagesuggest.
//!
//! This crate provides:
//! - The query body matching pages tagged with an image or section-image
//!   recommendation, sorted by page id
//! - A reqwest client that pages through matches with search-after, resuming
//!   strictly after a [`PageCursor`], optionally restricted to categories
//!
//! ## Example
//!
//! ```ignore
//! use imagesuggest_search::{PageCandidateStream, PageCursor, PageQuery, SearchPageStream};
//!
//! let stream = SearchPageStream::new("http://localhost:9200", "enwiki_content")?;
//! let ids = stream.next_batch(PageQuery::new(PageCursor::after(999), 100)).await?;
//! ```

pub mod query;
pub mod stream;

// Re-export core types
pub use imagesuggest_core::*;

pub use query::{parse_hits, parse_page_id, RecommendationQuery, SearchHits};
pub use stream::SearchPageStream;
