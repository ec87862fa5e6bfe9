//! Common error types for Polaris

use thiserror::Error;

/// Common result type for Polaris operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across Polaris services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Landmark table could not be read as CSV
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A landmark row failed schema validation
    #[error("Invalid landmark at row {row}: {reason}")]
    InvalidLandmark { row: usize, reason: String },

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
