//! Custom error types for scopus-roster.
//!
//! This module defines all error types used throughout the application.
//! All functions return `Result<T, RosterError>` instead of using `unwrap()`.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for scopus-roster operations.
///
/// Uses `thiserror` for ergonomic error handling and automatic `Display` implementation.
#[derive(Debug, Error)]
pub enum RosterError {
    /// Network/HTTP request error (transient external fetch failure)
    #[error("Fetch error: {0}")]
    Fetch(#[from] reqwest::Error),

    /// External API returned an error status
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code from the API
        code: i32,
        /// Error message from the API
        message: String,
    },

    /// Response body could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// Operator referenced an author id not present in the table
    #[error("Author {0} is not in the table")]
    MissingAuthor(u64),

    /// Integer coercion or record validation failure
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation requires an existing table file
    #[error("Table file not found: {0}")]
    TableNotFound(PathBuf),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using `RosterError`
pub type Result<T> = std::result::Result<T, RosterError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| RosterError::Parse(msg.to_string()))
    }
}
