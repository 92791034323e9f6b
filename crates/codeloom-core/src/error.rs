//! Error types for codeloom-core

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by graph sources and graph persistence.
#[derive(Error, Debug)]
pub enum GraphError {
    /// The graph source cannot serve requests
    #[error("graph store unavailable: {0}")]
    Unavailable(String),

    /// Failed to read or write a persisted artifact
    #[error("failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Persisted artifact is not valid JSON for its schema
    #[error("malformed graph state in '{path}': {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Failed to serialize a snapshot
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GraphError {
    /// Create an Unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Create an Io error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a Malformed error.
    pub fn malformed(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Malformed {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised by the TF-IDF vector index.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VectorIndexError {
    /// A numeric setting is outside its valid range
    #[error("invalid vector index configuration for '{key}': {message}")]
    InvalidConfig { key: String, message: String },
}

impl VectorIndexError {
    /// Create an InvalidConfig error.
    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Errors that abort a composition attempt.
///
/// These never leave [`ContextComposer::compose`](crate::composer::ContextComposer::compose);
/// they are turned into a degraded result there.
#[derive(Error, Debug)]
pub enum ComposeError {
    /// Graph source failed
    #[error("graph source failed: {0}")]
    Graph(#[from] GraphError),

    /// Vector index failed
    #[error("vector index failed: {0}")]
    Vector(#[from] VectorIndexError),
}

/// Errors raised while assembling a [`RetrievalEngine`](crate::engine::RetrievalEngine).
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration is invalid
    #[error("configuration error: {0}")]
    Config(#[from] codeloom_config::ConfigError),

    /// Vector index rejected its settings
    #[error(transparent)]
    Vector(#[from] VectorIndexError),
}

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;
