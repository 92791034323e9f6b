//! Codeloom Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.codeloom/config.toml`
//! - Local config: `.codeloom/config.toml` (in workspace)
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → CLI overrides.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default data directory, relative to the workspace root.
pub const DEFAULT_DATA_DIR: &str = ".codeloom";

/// Default file name of the persisted node list.
pub const DEFAULT_NODES_FILE: &str = "nodes.json";

/// Default file name of the persisted reverse adjacency map.
pub const DEFAULT_RELATIONSHIPS_FILE: &str = "relationships.json";

/// Default node capacity of the knowledge graph store.
pub const DEFAULT_MAX_NODES: usize = 10_000;

/// Default vocabulary size cap for the TF-IDF index.
pub const DEFAULT_MAX_FEATURES: usize = 1_000;

/// Default upper document-frequency ratio for vocabulary terms.
pub const DEFAULT_MAX_DOC_FREQ: f64 = 0.95;

/// Default similarity threshold for vector search.
pub const DEFAULT_THRESHOLD: f32 = 0.1;

/// Default number of vector search results.
pub const DEFAULT_TOP_K: usize = 10;

/// Default token budget for context composition.
pub const DEFAULT_MAX_TOKENS: usize = 4_000;

/// Root configuration for Codeloom.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoomConfig {
    /// Storage configuration
    pub storage: StorageConfig,

    /// Knowledge graph store configuration
    pub graph: GraphConfig,

    /// Lexical vector index configuration
    pub vector: VectorConfig,

    /// Context composition configuration
    pub context: ContextConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Storage configuration for persisted graph state.
///
/// # Example TOML
///
/// ```toml
/// [storage]
/// data_dir = ".codeloom"
/// persist = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for Codeloom data (default: `.codeloom`)
    pub data_dir: PathBuf,

    /// Write the graph to disk after every mutation
    pub persist: bool,

    /// File name of the node list artifact
    pub nodes_file: String,

    /// File name of the relationship adjacency artifact
    pub relationships_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            persist: false,
            nodes_file: DEFAULT_NODES_FILE.to_string(),
            relationships_file: DEFAULT_RELATIONSHIPS_FILE.to_string(),
        }
    }
}

/// Knowledge graph store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Which graph backend to construct
    pub backend: GraphBackendType,

    /// Maximum number of nodes kept when LRU eviction is enabled
    pub max_nodes: usize,

    /// Evict least-recently-used nodes at capacity
    pub enable_lru: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: GraphBackendType::default(),
            max_nodes: DEFAULT_MAX_NODES,
            enable_lru: true,
        }
    }
}

/// Graph backend selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackendType {
    /// Plain in-memory store owned by a single caller (default)
    #[default]
    Memory,
    /// In-memory store behind a reader/writer lock, cloneable across threads
    Shared,
}

impl std::fmt::Display for GraphBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Shared => write!(f, "shared"),
        }
    }
}

impl std::str::FromStr for GraphBackendType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "shared" => Ok(Self::Shared),
            _ => Err(ConfigError::invalid_value(
                "graph.backend",
                format!("unknown backend '{}'. Valid values: memory, shared", s),
            )),
        }
    }
}

/// TF-IDF vector index configuration.
///
/// # Example TOML
///
/// ```toml
/// [vector]
/// enabled = true
/// max_features = 2000
/// max_doc_freq = 0.9
/// stop_words = ["todo", "fixme"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Build and consult the vector index
    pub enabled: bool,

    /// Maximum vocabulary size
    pub max_features: usize,

    /// Minimum number of documents a term must appear in
    pub min_doc_freq: usize,

    /// Maximum share of documents a term may appear in (0, 1]
    pub max_doc_freq: f64,

    /// Additional stop words excluded from the vocabulary
    pub stop_words: Vec<String>,

    /// Apply the suffix-stripping stemmer during tokenization
    pub enable_stemming: bool,

    /// Default number of search results
    pub top_k: usize,

    /// Default minimum cosine similarity [0, 1]
    pub threshold: f32,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_features: DEFAULT_MAX_FEATURES,
            min_doc_freq: 1,
            max_doc_freq: DEFAULT_MAX_DOC_FREQ,
            stop_words: Vec::new(),
            enable_stemming: false,
            top_k: DEFAULT_TOP_K,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Layered context composition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Token budget used when the caller does not supply one
    pub default_max_tokens: usize,

    /// Graph matches kept per extracted candidate name
    pub matches_per_candidate: usize,

    /// Cap on the one-hop (L1) neighbor set
    pub one_hop_limit: usize,

    /// Cap on the two-hop (L2) neighbor set
    pub two_hop_limit: usize,

    /// Vector hits merged into L0 when the index is enabled
    pub vector_hits: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: DEFAULT_MAX_TOKENS,
            matches_per_candidate: 5,
            one_hop_limit: 20,
            two_hop_limit: 15,
            vector_hits: 3,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

/// CLI overrides for configuration values.
///
/// Used to apply command-line arguments over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override data directory
    pub data_dir: Option<PathBuf>,

    /// Override persistence
    pub persist: Option<bool>,

    /// Override graph backend
    pub graph_backend: Option<GraphBackendType>,

    /// Override node capacity
    pub max_nodes: Option<usize>,

    /// Override token budget
    pub max_tokens: Option<usize>,

    /// Override log level
    pub log_level: Option<String>,
}

impl LoomConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref dir) = overrides.data_dir {
            self.storage.data_dir = dir.clone();
        }

        if let Some(persist) = overrides.persist {
            self.storage.persist = persist;
        }

        if let Some(backend) = overrides.graph_backend {
            self.graph.backend = backend;
        }

        if let Some(max_nodes) = overrides.max_nodes {
            self.graph.max_nodes = max_nodes;
        }

        if let Some(max_tokens) = overrides.max_tokens {
            self.context.default_max_tokens = max_tokens;
        }

        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validate the configuration.
    ///
    /// Rejects numeric settings the engine cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.graph.max_nodes == 0 {
            return Err(ConfigError::invalid_value(
                "graph.max_nodes",
                "must be greater than zero",
            ));
        }

        let vector = &self.vector;
        if vector.max_features == 0 {
            return Err(ConfigError::invalid_value(
                "vector.max_features",
                "must be greater than zero",
            ));
        }
        if vector.min_doc_freq == 0 {
            return Err(ConfigError::invalid_value(
                "vector.min_doc_freq",
                "must be at least 1",
            ));
        }
        if !(vector.max_doc_freq > 0.0 && vector.max_doc_freq <= 1.0) {
            return Err(ConfigError::invalid_value(
                "vector.max_doc_freq",
                format!("{} is outside (0, 1]", vector.max_doc_freq),
            ));
        }
        if !(0.0..=1.0).contains(&vector.threshold) {
            return Err(ConfigError::invalid_value(
                "vector.threshold",
                format!("{} is outside [0, 1]", vector.threshold),
            ));
        }
        if vector.top_k == 0 {
            return Err(ConfigError::invalid_value(
                "vector.top_k",
                "must be greater than zero",
            ));
        }

        Ok(())
    }

    /// Get the effective data directory for a workspace.
    pub fn data_dir(&self, workspace_root: &Path) -> PathBuf {
        if self.storage.data_dir.is_absolute() {
            self.storage.data_dir.clone()
        } else {
            workspace_root.join(&self.storage.data_dir)
        }
    }

    /// Get the node list artifact path for a workspace.
    pub fn nodes_path(&self, workspace_root: &Path) -> PathBuf {
        self.data_dir(workspace_root).join(&self.storage.nodes_file)
    }

    /// Get the relationship adjacency artifact path for a workspace.
    pub fn relationships_path(&self, workspace_root: &Path) -> PathBuf {
        self.data_dir(workspace_root)
            .join(&self.storage.relationships_file)
    }
}
