//! Graph sources consumed by the context composer.
//!
//! [`GraphSource`] is the read-only seam the composer depends on. It is
//! fallible so sources backed by something other than local memory can
//! report unavailability; the composer turns such failures into a degraded
//! result.
//!
//! Two in-process backends exist, selected by `graph.backend`:
//!
//! - `memory`: a [`KnowledgeGraphStore`] owned by one caller
//! - `shared`: a [`SharedGraphStore`] (`Arc<RwLock<_>>`) cloneable across
//!   threads with single-writer / multi-reader access

use std::path::Path;
use std::sync::Arc;

use codeloom_config::{GraphBackendType, LoomConfig};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

use crate::error::GraphError;
use crate::model::{FlatRelationship, KnowledgeNode};
use crate::persistence::GraphPersistence;
use crate::store::{GraphStatistics, GraphStoreConfig, KnowledgeGraphStore, QueryFilter, QueryResult};

/// Read access to a knowledge graph.
///
/// None of these reads affect LRU order.
pub trait GraphSource: Send + Sync {
    /// Filter nodes
    fn query(&self, filter: &QueryFilter) -> Result<QueryResult, GraphError>;

    /// Look up a node by id
    fn peek_node(&self, id: &str) -> Result<Option<KnowledgeNode>, GraphError>;

    /// Breadth-first neighbors up to `max_depth` hops, origin excluded
    fn get_neighbors(&self, id: &str, max_depth: usize) -> Result<Vec<KnowledgeNode>, GraphError>;

    /// Declared relationships followed by reverse edges
    fn outgoing_edges(&self, id: &str) -> Result<Vec<FlatRelationship>, GraphError>;

    /// Aggregate statistics
    fn get_statistics(&self) -> Result<GraphStatistics, GraphError>;

    /// Backend identifier
    fn backend_type(&self) -> GraphBackendType;
}

impl GraphSource for KnowledgeGraphStore {
    fn query(&self, filter: &QueryFilter) -> Result<QueryResult, GraphError> {
        Ok(KnowledgeGraphStore::query(self, filter))
    }

    fn peek_node(&self, id: &str) -> Result<Option<KnowledgeNode>, GraphError> {
        Ok(KnowledgeGraphStore::peek_node(self, id).cloned())
    }

    fn get_neighbors(&self, id: &str, max_depth: usize) -> Result<Vec<KnowledgeNode>, GraphError> {
        Ok(KnowledgeGraphStore::get_neighbors(self, id, max_depth))
    }

    fn outgoing_edges(&self, id: &str) -> Result<Vec<FlatRelationship>, GraphError> {
        Ok(KnowledgeGraphStore::outgoing_edges(self, id))
    }

    fn get_statistics(&self) -> Result<GraphStatistics, GraphError> {
        Ok(KnowledgeGraphStore::get_statistics(self))
    }

    fn backend_type(&self) -> GraphBackendType {
        GraphBackendType::Memory
    }
}

// ============================================================================
// Shared Store
// ============================================================================

/// A [`KnowledgeGraphStore`] behind a reader/writer lock.
///
/// Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct SharedGraphStore {
    inner: Arc<RwLock<KnowledgeGraphStore>>,
}

impl SharedGraphStore {
    pub fn new(store: KnowledgeGraphStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Acquire shared read access
    pub fn read(&self) -> RwLockReadGuard<'_, KnowledgeGraphStore> {
        self.inner.read()
    }

    /// Acquire exclusive write access
    pub fn write(&self) -> RwLockWriteGuard<'_, KnowledgeGraphStore> {
        self.inner.write()
    }

    pub fn upsert_node(&self, node: KnowledgeNode) -> Option<String> {
        self.inner.write().upsert_node(node)
    }

    /// Bulk upsert under a single write lock
    pub fn upsert_nodes(&self, nodes: impl IntoIterator<Item = KnowledgeNode>) -> Vec<String> {
        self.inner.write().upsert_nodes(nodes)
    }

    /// Get a node, marking it most recently used (takes the write lock)
    pub fn get_node(&self, id: &str) -> Option<KnowledgeNode> {
        self.inner.write().get_node(id)
    }

    pub fn remove_node(&self, id: &str) -> Option<KnowledgeNode> {
        self.inner.write().remove_node(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl GraphSource for SharedGraphStore {
    fn query(&self, filter: &QueryFilter) -> Result<QueryResult, GraphError> {
        Ok(self.read().query(filter))
    }

    fn peek_node(&self, id: &str) -> Result<Option<KnowledgeNode>, GraphError> {
        Ok(self.read().peek_node(id).cloned())
    }

    fn get_neighbors(&self, id: &str, max_depth: usize) -> Result<Vec<KnowledgeNode>, GraphError> {
        Ok(self.read().get_neighbors(id, max_depth))
    }

    fn outgoing_edges(&self, id: &str) -> Result<Vec<FlatRelationship>, GraphError> {
        Ok(self.read().outgoing_edges(id))
    }

    fn get_statistics(&self) -> Result<GraphStatistics, GraphError> {
        Ok(self.read().get_statistics())
    }

    fn backend_type(&self) -> GraphBackendType {
        GraphBackendType::Shared
    }
}

// ============================================================================
// Backend Selection
// ============================================================================

/// Configuration-selected graph backend.
#[derive(Debug)]
pub enum GraphBackend {
    Memory(KnowledgeGraphStore),
    Shared(SharedGraphStore),
}

impl GraphBackend {
    /// Build the backend named by `graph.backend`.
    ///
    /// With `storage.persist` the store is reloaded from, and written to,
    /// the data directory under `workspace_root`.
    pub fn from_config(config: &LoomConfig, workspace_root: &Path) -> Self {
        let store_config = GraphStoreConfig::from(&config.graph);
        let store = if config.storage.persist {
            let persistence = GraphPersistence::from_config(config, workspace_root);
            info!(
                "Opening persistent graph store at {}",
                persistence.nodes_path().display()
            );
            KnowledgeGraphStore::open(store_config, persistence)
        } else {
            KnowledgeGraphStore::new(store_config)
        };

        match config.graph.backend {
            GraphBackendType::Memory => GraphBackend::Memory(store),
            GraphBackendType::Shared => GraphBackend::Shared(SharedGraphStore::new(store)),
        }
    }

    pub fn upsert_node(&mut self, node: KnowledgeNode) -> Option<String> {
        match self {
            GraphBackend::Memory(store) => store.upsert_node(node),
            GraphBackend::Shared(shared) => shared.upsert_node(node),
        }
    }

    /// Bulk upsert, persisting once. Returns evicted ids.
    pub fn upsert_nodes(&mut self, nodes: impl IntoIterator<Item = KnowledgeNode>) -> Vec<String> {
        match self {
            GraphBackend::Memory(store) => store.upsert_nodes(nodes),
            GraphBackend::Shared(shared) => shared.upsert_nodes(nodes),
        }
    }

    pub fn get_node(&mut self, id: &str) -> Option<KnowledgeNode> {
        match self {
            GraphBackend::Memory(store) => store.get_node(id),
            GraphBackend::Shared(shared) => shared.get_node(id),
        }
    }

    pub fn remove_node(&mut self, id: &str) -> Option<KnowledgeNode> {
        match self {
            GraphBackend::Memory(store) => store.remove_node(id),
            GraphBackend::Shared(shared) => shared.remove_node(id),
        }
    }

    /// Write the current state synchronously, if persistent
    pub fn flush(&self) -> Result<(), GraphError> {
        match self {
            GraphBackend::Memory(store) => store.flush(),
            GraphBackend::Shared(shared) => shared.read().flush(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            GraphBackend::Memory(store) => store.len(),
            GraphBackend::Shared(shared) => shared.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clone every node, least recently used first
    pub fn snapshot_nodes(&self) -> Vec<KnowledgeNode> {
        match self {
            GraphBackend::Memory(store) => store.nodes_lru_first().into_iter().cloned().collect(),
            GraphBackend::Shared(shared) => shared
                .read()
                .nodes_lru_first()
                .into_iter()
                .cloned()
                .collect(),
        }
    }

    /// View as a read-only source
    pub fn as_source(&self) -> &dyn GraphSource {
        match self {
            GraphBackend::Memory(store) => store,
            GraphBackend::Shared(shared) => shared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeType, RelationshipType};
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_backend_from_config() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = LoomConfig::default();

        let backend = GraphBackend::from_config(&config, temp_dir.path());
        assert_eq!(backend.as_source().backend_type(), GraphBackendType::Memory);

        config.graph.backend = GraphBackendType::Shared;
        let backend = GraphBackend::from_config(&config, temp_dir.path());
        assert_eq!(backend.as_source().backend_type(), GraphBackendType::Shared);
    }

    #[test]
    fn test_backend_dispatch() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = LoomConfig::default();
        config.graph.backend = GraphBackendType::Shared;
        let mut backend = GraphBackend::from_config(&config, temp_dir.path());

        backend.upsert_node(
            KnowledgeNode::new("a", NodeType::Function, "a")
                .with_relationship("b", RelationshipType::Calls),
        );
        backend.upsert_node(KnowledgeNode::new("b", NodeType::Function, "b"));

        let source = backend.as_source();
        assert_eq!(source.get_neighbors("a", 1).unwrap().len(), 1);
        assert_eq!(source.outgoing_edges("b").unwrap().len(), 1);
        assert_eq!(source.get_statistics().unwrap().total_nodes, 2);

        assert!(backend.remove_node("b").is_some());
        assert!(backend.get_node("b").is_none());
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn test_shared_store_across_threads() {
        let shared = SharedGraphStore::default();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        shared.upsert_node(KnowledgeNode::new(
                            format!("n{}-{}", t, i),
                            NodeType::Concept,
                            "concept",
                        ));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(shared.len(), 100);
        assert!(shared.read().verify_indexes());
    }
}
