//! Codeloom Core - Embedded knowledge retrieval
//!
//! This crate provides the in-process retrieval engine:
//! - Knowledge graph store with LRU eviction and reverse-edge derivation
//! - Optional JSON persistence of the graph
//! - TF-IDF lexical vector index
//! - Token-budgeted, layered context composition (L0-L3)

pub mod budget;
pub mod composer;
pub mod engine;
pub mod error;
pub mod model;
pub mod persistence;
pub mod provider;
pub mod store;
pub mod vector;

// Re-exports for convenience
pub use model::{
    FlatRelationship, KnowledgeNode, Metadata, NodeType, Relationship, RelationshipType,
    ReverseEdge,
};
pub use store::{
    GraphStatistics, GraphStoreConfig, KnowledgeGraphStore, QueryFilter, QueryResult,
};

// Persistence re-exports
pub use persistence::{GraphPersistence, PersistedGraph};

// Provider re-exports
pub use provider::{GraphBackend, GraphSource, SharedGraphStore};

// Vector index re-exports
pub use vector::{
    DocumentVector, IndexStats, SearchOptions, SearchResponse, SearchResult, VectorIndex,
    VectorIndexConfig,
};

// Composition re-exports
pub use budget::TokenBudget;
pub use composer::{
    extract_candidates, ComposerConfig, CompositionStatus, ContextComposer, ContextLayer,
    LayerName, LayeredContext,
};

// Engine re-exports
pub use engine::{EngineStats, RetrievalEngine};

// Error re-exports
pub use error::{ComposeError, EngineError, GraphError, VectorIndexError};
