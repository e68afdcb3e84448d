//! Domain errors surfaced to the user by the profiling modules.
//!
//! Command handlers work in `anyhow::Result` and attach context; these typed
//! errors are what the analyses themselves raise, so callers (and tests) can
//! `downcast_ref::<ProfileError>()` to tell a bad upload from a bad rule.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProfileError>;

/// Which snapshot of a comparison an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Old,
    New,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Old => write!(f, "old"),
            Side::New => write!(f, "new"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProfileError {
    /// Input could not be read as a rectangular table.
    #[error("Malformed input: {message}")]
    MalformedInput { message: String },

    /// A validation rule could not be compiled or evaluated.
    #[error("Invalid rule for '{column}': {message}")]
    InvalidRule { column: String, message: String },

    /// A row key occurs more than once within one snapshot.
    #[error("Duplicate row key ({key}) in {side} table")]
    DuplicateKey { side: Side, key: String },

    #[error("Column '{0}' not found")]
    ColumnNotFound(String),
}

impl ProfileError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: message.into(),
        }
    }

    pub fn invalid_rule(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRule {
            column: column.into(),
            message: message.into(),
        }
    }
}
