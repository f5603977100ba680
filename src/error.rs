//! Error types for the car recommender

use thiserror::Error;

/// Result type alias for recommender operations
pub type Result<T> = std::result::Result<T, RecommendationError>;

#[derive(Error, Debug)]
pub enum RecommendationError {

    // =============================
    // Pipeline Errors
    // =============================

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sqlx::Error> for RecommendationError {
    fn from(e: sqlx::Error) -> Self {
        RecommendationError::DatabaseError(e.to_string())
    }
}
