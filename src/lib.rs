//! Car Recommender
//!
//! Turns stored used-car listings into a ranked shortlist:
//! - Pulls candidates matching buyer criteria from the listing store
//! - Has a language model write an analysis for every unanalyzed candidate
//! - Ranks analyzed listings by price, or by mining a model ranking response
//! - Never fails a request; every problem degrades to a shorter list
//!
//! PIPELINE:
//! CRITERIA → CANDIDATES → ANALYZE → RANK → TOP N

pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod llm;
pub mod logger;
pub mod models;
pub mod prompts;
pub mod ranking;
pub mod recommender;
pub mod store;

pub use error::Result;

// Re-export common types
pub use config::AppConfig;
pub use llm::{Completion, CompletionClient};
pub use models::{Criteria, Listing, ListingId, NewListing};
pub use recommender::Recommender;
pub use store::{InMemoryListingStore, ListingStore, SqliteListingStore};
