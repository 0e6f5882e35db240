//! Shared error types for the engine

use thiserror::Error;

/// Main error type for callforest operations
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed forest definition (fatal configuration error)
    #[error("Invalid forest definition: {0}")]
    InvalidForest(String),

    /// A metric name that is not one of the forest's public metric columns
    #[error("Unknown metric column: {0}")]
    UnknownMetric(String),

    /// Tree index outside the forest
    #[error("No tree at index {0}")]
    TreeIndex(usize),

    /// Node index outside a tree's arena
    #[error("No node at arena index {0}")]
    NodeIndex(usize),

    /// A node reference minted against an earlier tree generation
    #[error("Stale node reference: forest is at generation {expected}, reference was minted at generation {found}")]
    StaleReference { expected: u64, found: u64 },

    /// A named host variable the bridge does not carry
    #[error("Host variable not present: {0}")]
    MissingVariable(String),

    /// JSON errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Wrapped external errors
    #[error(transparent)]
    External(#[from] anyhow::Error),
}

impl Error {
    /// Create an invalid-forest error with context
    pub fn invalid_forest(message: impl Into<String>) -> Self {
        Self::InvalidForest(message.into())
    }

    /// Create an unknown-metric error
    pub fn unknown_metric(metric: impl Into<String>) -> Self {
        Self::UnknownMetric(metric.into())
    }
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, Error>;
