//! Error types for the eligibility update pass.
//!
//! Errors are classified by recoverability:
//! - Invalid input: malformed CLI values, caught before any record is touched
//! - Runtime: database or wiring failures that abort the remainder of a pass
//!
//! Unfetchable snapshots are deliberately NOT here: they are per-record skip
//! conditions handled inside the update loop, never batch failures.

use thiserror::Error;

use crate::db::DbError;
use crate::snapshot::FetchError;

/// Error types for a batch eligibility update.
#[derive(Debug, Error)]
pub enum UpdateError {
    // Invalid input: fails fast at startup
    #[error("Invalid --datetime value '{value}': {source}")]
    InvalidTimestamp {
        value: String,
        source: chrono::ParseError,
    },

    #[error("Invalid --global-userinfo payload: {0}")]
    InvalidSnapshot(#[from] serde_json::Error),

    #[error("Invalid --timedelta-days value '{0}'")]
    InvalidDays(String),

    #[error("Unknown argument '{0}'")]
    UnknownArgument(String),

    #[error("Missing value for argument '{0}'")]
    MissingValue(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Runtime failures: abort the remainder of the pass
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Snapshot source error: {0}")]
    Fetch(#[from] FetchError),
}

impl UpdateError {
    /// Returns true if this error is a bad-input condition detected before
    /// any record was touched.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            UpdateError::InvalidTimestamp { .. }
                | UpdateError::InvalidSnapshot(_)
                | UpdateError::InvalidDays(_)
                | UpdateError::UnknownArgument(_)
                | UpdateError::MissingValue(_)
                | UpdateError::Configuration(_)
        )
    }
}
