//! # imagesuggest-core
//!
//! Core types, traits, and abstractions for imagesuggest.
//!
//! This crate provides the run state, suggestion and notification models, the
//! shared error type, and the collaborator traits that the database, search,
//! suggestion-client and job crates implement or depend on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
