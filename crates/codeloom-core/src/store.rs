//! Knowledge Graph Store
//!
//! Owns every [`KnowledgeNode`] and keeps three indexes beside the node map:
//!
//! - a type index (`NodeType` → ids) for type-selective queries,
//! - a reverse-edge adjacency map (target id → synthetic inverse edges),
//! - an LRU access list deciding which node is evicted at capacity.
//!
//! # Architecture
//!
//! ```text
//! KnowledgeGraphStore
//! ├── nodes: id → KnowledgeNode (declared relationships live on the node)
//! ├── type_index: NodeType → {id}
//! ├── reverse_edges: target id → [ReverseEdge]
//! ├── access_order: LruCache<id> (touched on get_node and every write)
//! └── persistence: Option<GraphPersistence> (written after each mutation)
//! ```
//!
//! Reads through [`KnowledgeGraphStore::get_node`] count as a use for LRU
//! purposes; [`KnowledgeGraphStore::peek_node`], queries and traversals do not.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant, SystemTime};

use lru::LruCache;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::GraphError;
use crate::model::{FlatRelationship, KnowledgeNode, Metadata, NodeType, ReverseEdge};
use crate::persistence::{GraphPersistence, PersistedGraph};

/// Default node capacity
pub const DEFAULT_MAX_NODES: usize = codeloom_config::DEFAULT_MAX_NODES;

/// Store sizing and eviction settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphStoreConfig {
    /// Maximum node count when LRU eviction is enabled
    pub max_nodes: usize,
    /// Evict the least-recently-used node when inserting at capacity.
    /// When disabled the store grows without bound.
    pub enable_lru: bool,
}

impl Default for GraphStoreConfig {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_NODES,
            enable_lru: true,
        }
    }
}

impl From<&codeloom_config::GraphConfig> for GraphStoreConfig {
    fn from(config: &codeloom_config::GraphConfig) -> Self {
        Self {
            max_nodes: config.max_nodes,
            enable_lru: config.enable_lru,
        }
    }
}

// ============================================================================
// Query Types
// ============================================================================

/// Filter for [`KnowledgeGraphStore::query`]. All predicates are ANDed.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    /// Match any of these types (empty = all types)
    pub node_types: Vec<NodeType>,
    /// Case-insensitive substring of name or content
    pub search_term: Option<String>,
    /// Exact metadata equality per key
    pub metadata: Metadata,
    /// Stop scanning after this many matches
    pub max_results: Option<usize>,
    /// Also return the outgoing edges of every matched node
    pub include_neighbors: bool,
}

impl QueryFilter {
    /// Empty filter matching every node
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(mut self, types: impl IntoIterator<Item = NodeType>) -> Self {
        self.node_types = types.into_iter().collect();
        self
    }

    pub fn with_search_term(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    pub fn with_neighbors(mut self) -> Self {
        self.include_neighbors = true;
        self
    }
}

/// Result of a store query.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Matched nodes in scan order
    pub nodes: Vec<KnowledgeNode>,
    /// Outgoing edges of matched nodes (only with `include_neighbors`)
    pub relationships: Vec<FlatRelationship>,
    /// Number of matched nodes
    pub total_count: usize,
    /// Wall time spent scanning
    pub query_time: Duration,
}

/// Aggregate statistics about the store.
#[derive(Debug, Clone, Serialize)]
pub struct GraphStatistics {
    /// Number of nodes
    pub total_nodes: usize,
    /// Number of declared relationships (reverse edges are not counted)
    pub total_relationships: usize,
    /// Node count per type, types with no nodes omitted
    pub node_type_distribution: BTreeMap<NodeType, usize>,
    /// Time of the last mutation
    pub last_updated: SystemTime,
    /// Nodes evicted since the store was created
    pub evictions: u64,
}

// ============================================================================
// Store
// ============================================================================

/// In-memory knowledge graph with LRU eviction and reverse-edge derivation.
pub struct KnowledgeGraphStore {
    config: GraphStoreConfig,

    nodes: HashMap<String, KnowledgeNode>,

    /// Ordered so type-selective scans are deterministic
    type_index: HashMap<NodeType, BTreeSet<String>>,

    reverse_edges: HashMap<String, Vec<ReverseEdge>>,

    /// Most recently used at the front; values are unused
    access_order: LruCache<String, ()>,

    evictions: u64,

    last_updated: SystemTime,

    persistence: Option<GraphPersistence>,
}

impl Default for KnowledgeGraphStore {
    fn default() -> Self {
        Self::new(GraphStoreConfig::default())
    }
}

impl std::fmt::Debug for KnowledgeGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeGraphStore")
            .field("config", &self.config)
            .field("nodes", &self.nodes.len())
            .field("evictions", &self.evictions)
            .field("persistent", &self.persistence.is_some())
            .finish()
    }
}

impl KnowledgeGraphStore {
    /// Create an empty, non-persistent store
    pub fn new(config: GraphStoreConfig) -> Self {
        Self {
            config,
            nodes: HashMap::new(),
            type_index: HashMap::new(),
            reverse_edges: HashMap::new(),
            access_order: LruCache::unbounded(),
            evictions: 0,
            last_updated: SystemTime::now(),
            persistence: None,
        }
    }

    /// Open a persistent store, reloading any prior state.
    ///
    /// Missing or corrupt artifacts are logged and yield an empty store.
    pub fn open(config: GraphStoreConfig, persistence: GraphPersistence) -> Self {
        let mut store = Self::new(config);
        let persisted = persistence.load();
        store.restore(persisted);
        store.persistence = Some(persistence);
        store
    }

    /// Replace the contents with a persisted snapshot.
    ///
    /// Nodes arrive least-recently-used first, so inserting in order
    /// reproduces the access list. Reverse edges are taken verbatim.
    fn restore(&mut self, persisted: PersistedGraph) {
        let PersistedGraph {
            nodes,
            reverse_edges,
        } = persisted;

        for node in nodes {
            self.type_index
                .entry(node.node_type)
                .or_default()
                .insert(node.id.clone());
            self.access_order.put(node.id.clone(), ());
            self.nodes.insert(node.id.clone(), node);
        }
        self.reverse_edges = reverse_edges;

        if self.config.enable_lru {
            while self.nodes.len() > self.config.max_nodes {
                if self.evict_lru().is_none() {
                    break;
                }
            }
        }

        if !self.nodes.is_empty() {
            info!("Restored {} nodes from persisted graph", self.nodes.len());
        }
    }

    /// Get the store configuration
    pub fn config(&self) -> GraphStoreConfig {
        self.config
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Insert or fully replace a node by id.
    ///
    /// Inserting a new id at capacity first evicts the least-recently-used
    /// node (with cascade cleanup). The written node becomes the most
    /// recently used. Returns the id of the evicted node, if any.
    pub fn upsert_node(&mut self, node: KnowledgeNode) -> Option<String> {
        let evicted = self.insert_node(node);
        self.mark_updated();
        evicted
    }

    /// Upsert many nodes, persisting a single snapshot at the end.
    ///
    /// Returns the ids evicted along the way, oldest eviction first.
    pub fn upsert_nodes(&mut self, nodes: impl IntoIterator<Item = KnowledgeNode>) -> Vec<String> {
        let mut evicted = Vec::new();
        let mut written = 0usize;
        for node in nodes {
            evicted.extend(self.insert_node(node));
            written += 1;
        }
        if written > 0 {
            self.mark_updated();
        }
        evicted
    }

    fn insert_node(&mut self, mut node: KnowledgeNode) -> Option<String> {
        let declared = node.relationships.len();
        node.relationships.retain(|rel| !rel.relationship_type.is_derived());
        if node.relationships.len() < declared {
            warn!(
                "Dropped {} derived relationships declared on {}",
                declared - node.relationships.len(),
                node.id
            );
        }

        let is_new = !self.nodes.contains_key(&node.id);

        let mut evicted = None;
        if is_new && self.config.enable_lru && self.nodes.len() >= self.config.max_nodes {
            evicted = self.evict_lru();
        }

        if let Some(previous) = self.nodes.remove(&node.id) {
            self.unindex_type(&previous);
            self.drop_derived_edges(&previous);
        }

        for rel in &node.relationships {
            self.reverse_edges
                .entry(rel.target_id.clone())
                .or_default()
                .push(ReverseEdge {
                    source_id: node.id.clone(),
                    relationship_type: rel.relationship_type.inverse(),
                    weight: rel.weight,
                });
        }

        self.type_index
            .entry(node.node_type)
            .or_default()
            .insert(node.id.clone());
        self.access_order.put(node.id.clone(), ());
        self.nodes.insert(node.id.clone(), node);
        evicted
    }

    /// Remove a node and scrub every relationship pointing at it.
    ///
    /// Unknown ids are a no-op.
    pub fn remove_node(&mut self, id: &str) -> Option<KnowledgeNode> {
        let removed = self.detach(id)?;
        self.mark_updated();
        Some(removed)
    }

    /// Remove every node, index and reverse edge.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.type_index.clear();
        self.reverse_edges.clear();
        self.access_order.clear();
        self.mark_updated();
    }

    /// Evict the least-recently-used node. Returns its id.
    fn evict_lru(&mut self) -> Option<String> {
        let (lru_id, _) = self.access_order.pop_lru()?;
        self.detach(&lru_id);
        self.evictions += 1;
        debug!("Evicted least-recently-used node {}", lru_id);
        Some(lru_id)
    }

    /// Remove a node with cascade cleanup, without persisting.
    fn detach(&mut self, id: &str) -> Option<KnowledgeNode> {
        let node = self.nodes.remove(id)?;
        self.access_order.pop(id);
        self.unindex_type(&node);
        self.drop_derived_edges(&node);

        // Reverse edges recorded on the removed node disappear with it,
        // and so do the declared edges that produced them.
        self.reverse_edges.remove(id);
        for other in self.nodes.values_mut() {
            other.relationships.retain(|rel| rel.target_id != id);
        }

        Some(node)
    }

    fn unindex_type(&mut self, node: &KnowledgeNode) {
        if let Some(ids) = self.type_index.get_mut(&node.node_type) {
            ids.remove(&node.id);
            if ids.is_empty() {
                self.type_index.remove(&node.node_type);
            }
        }
    }

    /// Drop the reverse edges a node's declared relationships produced.
    fn drop_derived_edges(&mut self, node: &KnowledgeNode) {
        for rel in &node.relationships {
            if let Some(edges) = self.reverse_edges.get_mut(&rel.target_id) {
                edges.retain(|edge| edge.source_id != node.id);
                if edges.is_empty() {
                    self.reverse_edges.remove(&rel.target_id);
                }
            }
        }
    }

    fn mark_updated(&mut self) {
        self.last_updated = SystemTime::now();
        if let Some(persistence) = &self.persistence {
            let nodes = self.nodes_lru_first();
            persistence.save_in_background(&nodes, &self.reverse_edges);
        }
    }

    /// Write the current state synchronously, if persistence is attached.
    pub fn flush(&self) -> Result<(), GraphError> {
        match &self.persistence {
            Some(persistence) => persistence.save(&self.nodes_lru_first(), &self.reverse_edges),
            None => Ok(()),
        }
    }

    /// Nodes ordered least-recently-used first, the persisted order
    pub fn nodes_lru_first(&self) -> Vec<&KnowledgeNode> {
        self.access_order
            .iter()
            .rev()
            .filter_map(|(id, _)| self.nodes.get(id))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Get a node by id, marking it most recently used.
    pub fn get_node(&mut self, id: &str) -> Option<KnowledgeNode> {
        let node = self.nodes.get(id)?.clone();
        self.access_order.promote(id);
        Some(node)
    }

    /// Get a node by id without touching the LRU order.
    pub fn peek_node(&self, id: &str) -> Option<&KnowledgeNode> {
        self.nodes.get(id)
    }

    /// Check if the store contains a node
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over all nodes (unspecified order)
    pub fn nodes(&self) -> impl Iterator<Item = &KnowledgeNode> {
        self.nodes.values()
    }

    /// Synthetic edges recorded on `id`
    pub fn reverse_edges(&self, id: &str) -> &[ReverseEdge] {
        self.reverse_edges
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Outgoing edges of a node: declared relationships followed by the
    /// reverse edges recorded on it. Empty for unknown ids.
    pub fn outgoing_edges(&self, id: &str) -> Vec<FlatRelationship> {
        let Some(node) = self.nodes.get(id) else {
            return Vec::new();
        };

        let mut edges: Vec<FlatRelationship> = node.flat_relationships().collect();
        edges.extend(self.reverse_edges(id).iter().map(|edge| FlatRelationship {
            source_id: id.to_string(),
            target_id: edge.source_id.clone(),
            relationship_type: edge.relationship_type,
            weight: edge.weight,
        }));
        edges
    }

    /// Breadth-first neighbors along outgoing edges, up to `max_depth` hops.
    ///
    /// Excludes the origin and ids not present in the store. Returns nodes in
    /// discovery order.
    pub fn get_neighbors(&self, id: &str, max_depth: usize) -> Vec<KnowledgeNode> {
        if max_depth == 0 || !self.nodes.contains_key(id) {
            return Vec::new();
        }

        let mut visited: HashSet<String> = HashSet::from([id.to_string()]);
        let mut frontier = vec![id.to_string()];
        let mut neighbors = Vec::new();

        for _ in 0..max_depth {
            let mut next = Vec::new();
            for current in &frontier {
                for edge in self.outgoing_edges(current) {
                    if !visited.insert(edge.target_id.clone()) {
                        continue;
                    }
                    if let Some(node) = self.nodes.get(&edge.target_id) {
                        neighbors.push(node.clone());
                        next.push(edge.target_id);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        neighbors
    }

    /// Filter nodes.
    ///
    /// With `node_types` set, only the type index is scanned (types in filter
    /// order, ids ascending). Otherwise nodes are scanned most recently used
    /// first. Scanning stops once `max_results` matches are found.
    pub fn query(&self, filter: &QueryFilter) -> QueryResult {
        let start = Instant::now();
        let needle = filter.search_term.as_deref().map(str::to_lowercase);
        let limit = filter.max_results.unwrap_or(usize::MAX);

        let matches = |node: &KnowledgeNode| -> bool {
            if let Some(needle) = needle.as_deref() {
                if !node.matches_term(needle) {
                    return false;
                }
            }
            filter
                .metadata
                .iter()
                .all(|(key, value)| node.metadata.get(key) == Some(value))
        };

        let candidates: Box<dyn Iterator<Item = &String> + '_> = if filter.node_types.is_empty() {
            Box::new(self.access_order.iter().map(|(id, _)| id))
        } else {
            let mut seen_types = HashSet::new();
            Box::new(
                filter
                    .node_types
                    .iter()
                    .filter(move |t| seen_types.insert(**t))
                    .filter_map(|t| self.type_index.get(t))
                    .flat_map(|ids| ids.iter()),
            )
        };

        let mut nodes = Vec::new();
        if limit > 0 {
            for id in candidates {
                let Some(node) = self.nodes.get(id) else {
                    continue;
                };
                if matches(node) {
                    nodes.push(node.clone());
                    if nodes.len() >= limit {
                        break;
                    }
                }
            }
        }

        let relationships = if filter.include_neighbors {
            nodes
                .iter()
                .flat_map(|node| self.outgoing_edges(&node.id))
                .collect()
        } else {
            Vec::new()
        };

        QueryResult {
            total_count: nodes.len(),
            nodes,
            relationships,
            query_time: start.elapsed(),
        }
    }

    /// Aggregate statistics
    pub fn get_statistics(&self) -> GraphStatistics {
        let node_type_distribution = self
            .type_index
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(node_type, ids)| (*node_type, ids.len()))
            .collect();

        GraphStatistics {
            total_nodes: self.nodes.len(),
            total_relationships: self.nodes.values().map(|n| n.relationships.len()).sum(),
            node_type_distribution,
            last_updated: self.last_updated,
            evictions: self.evictions,
        }
    }

    /// Check internal consistency, logging any violation found.
    ///
    /// Returns `true` if every index agrees with the node map.
    pub fn verify_indexes(&self) -> bool {
        let mut ok = true;
        let indexed: usize = self.type_index.values().map(BTreeSet::len).sum();
        if indexed != self.nodes.len() || self.access_order.len() != self.nodes.len() {
            warn!(
                "Index size mismatch: {} nodes, {} typed, {} tracked",
                self.nodes.len(),
                indexed,
                self.access_order.len()
            );
            ok = false;
        }
        for (target, edges) in &self.reverse_edges {
            for edge in edges {
                let declared = self.nodes.get(&edge.source_id).is_some_and(|source| {
                    source.relationships.iter().any(|rel| {
                        &rel.target_id == target
                            && rel.relationship_type.inverse() == edge.relationship_type
                    })
                });
                if !declared {
                    warn!(
                        "Orphan reverse edge {} --{}--> {}",
                        target, edge.relationship_type, edge.source_id
                    );
                    ok = false;
                }
            }
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RelationshipType;
    use pretty_assertions::assert_eq;

    fn function(id: &str) -> KnowledgeNode {
        KnowledgeNode::new(id, NodeType::Function, id)
    }

    fn small_store(max_nodes: usize) -> KnowledgeGraphStore {
        KnowledgeGraphStore::new(GraphStoreConfig {
            max_nodes,
            enable_lru: true,
        })
    }

    #[test]
    fn test_upsert_then_get_returns_same_node() {
        let mut store = KnowledgeGraphStore::default();
        let node = KnowledgeNode::new("svc", NodeType::Class, "UserService")
            .with_content("class UserService {}")
            .with_metadata("file", "src/user.ts")
            .with_relationship("getUserById", RelationshipType::Contains);

        store.upsert_node(node.clone());

        assert_eq!(store.get_node("svc"), Some(node));
        assert!(store.get_node("missing").is_none());
    }

    #[test]
    fn test_upsert_replaces_without_merging() {
        let mut store = KnowledgeGraphStore::default();
        store.upsert_node(
            KnowledgeNode::new("a", NodeType::Function, "a")
                .with_relationship("b", RelationshipType::Calls)
                .with_metadata("old", true),
        );
        store.upsert_node(KnowledgeNode::new("a", NodeType::Class, "A"));

        let node = store.peek_node("a").unwrap();
        assert_eq!(node.node_type, NodeType::Class);
        assert!(node.relationships.is_empty());
        assert!(node.metadata.is_empty());
        // The old version's derived edge on "b" is gone
        assert!(store.reverse_edges("b").is_empty());
        assert_eq!(store.len(), 1);
        assert!(store.verify_indexes());
    }

    #[test]
    fn test_reverse_edges_are_derived() {
        let mut store = KnowledgeGraphStore::default();
        store.upsert_node(
            KnowledgeNode::new("svc", NodeType::Class, "UserService")
                .with_relationship("get", RelationshipType::Contains),
        );
        store.upsert_node(function("get"));

        let reverse = store.reverse_edges("get");
        assert_eq!(reverse.len(), 1);
        assert_eq!(reverse[0].source_id, "svc");
        assert_eq!(reverse[0].relationship_type, RelationshipType::ContainedBy);

        let outgoing = store.outgoing_edges("get");
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].target_id, "svc");
    }

    #[test]
    fn test_forward_reference_tolerated() {
        let mut store = KnowledgeGraphStore::default();
        store.upsert_node(function("caller").with_relationship("later", RelationshipType::Calls));

        assert!(store.get_neighbors("caller", 1).is_empty());

        store.upsert_node(function("later"));
        let neighbors = store.get_neighbors("caller", 1);
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].id, "later");
    }

    #[test]
    fn test_remove_scrubs_relationships() {
        let mut store = KnowledgeGraphStore::default();
        store.upsert_node(function("a").with_relationship("b", RelationshipType::Calls));
        store.upsert_node(function("c").with_relationship("b", RelationshipType::References));
        store.upsert_node(function("b").with_relationship("a", RelationshipType::Calls));

        let removed = store.remove_node("b");
        assert!(removed.is_some());

        for node in store.nodes() {
            assert!(node.relationships.iter().all(|r| r.target_id != "b"));
        }
        // "b" had declared a call to "a"; the derived edge on "a" is gone
        assert!(store.reverse_edges("a").is_empty());
        assert!(store.reverse_edges("b").is_empty());
        assert!(store.verify_indexes());
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut store = KnowledgeGraphStore::default();
        store.upsert_node(function("a"));
        assert!(store.remove_node("ghost").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_lru_evicts_least_recently_used() {
        let mut store = small_store(3);
        store.upsert_node(function("a"));
        store.upsert_node(function("b"));
        store.upsert_node(function("c"));

        // Reading "a" makes "b" the least recently used
        store.get_node("a");

        let evicted = store.upsert_node(function("d"));
        assert_eq!(evicted.as_deref(), Some("b"));
        assert_eq!(store.len(), 3);
        assert!(!store.contains("b"));
        assert!(store.contains("a"));
        assert_eq!(store.get_statistics().evictions, 1);
    }

    #[test]
    fn test_eviction_cascades() {
        let mut store = small_store(2);
        store.upsert_node(function("old"));
        store.upsert_node(function("user").with_relationship("old", RelationshipType::Calls));

        store.upsert_node(function("new"));

        assert!(!store.contains("old"));
        let user = store.peek_node("user").unwrap();
        assert!(user.relationships.is_empty());
        assert!(store.verify_indexes());
    }

    #[test]
    fn test_replacing_at_capacity_does_not_evict() {
        let mut store = small_store(2);
        store.upsert_node(function("a"));
        store.upsert_node(function("b"));

        assert!(store.upsert_node(function("a").with_content("v2")).is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_lru_disabled_grows_unbounded() {
        let mut store = KnowledgeGraphStore::new(GraphStoreConfig {
            max_nodes: 1,
            enable_lru: false,
        });
        store.upsert_node(function("a"));
        store.upsert_node(function("b"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_get_neighbors_depth() {
        let mut store = KnowledgeGraphStore::default();
        store.upsert_node(function("a").with_relationship("b", RelationshipType::Calls));
        store.upsert_node(function("b").with_relationship("c", RelationshipType::Calls));
        store.upsert_node(function("c").with_relationship("a", RelationshipType::Calls));

        let one: Vec<String> = store.get_neighbors("a", 1).into_iter().map(|n| n.id).collect();
        // "b" via calls, "c" via the called_by edge recorded on "a"
        assert_eq!(one, vec!["b".to_string(), "c".to_string()]);

        let two = store.get_neighbors("a", 2);
        assert!(two.iter().all(|n| n.id != "a"));
        assert_eq!(two.len(), 2);

        assert!(store.get_neighbors("missing", 1).is_empty());
        assert!(store.get_neighbors("a", 0).is_empty());
    }

    #[test]
    fn test_query_by_type() {
        let mut store = KnowledgeGraphStore::default();
        store.upsert_node(function("f1"));
        store.upsert_node(function("f2"));
        store.upsert_node(KnowledgeNode::new("c1", NodeType::Class, "C1"));

        let result = store.query(&QueryFilter::new().with_types([NodeType::Function]));
        assert_eq!(result.total_count, result.nodes.len());
        assert_eq!(result.total_count, 2);
        assert!(result.nodes.iter().all(|n| n.node_type == NodeType::Function));
    }

    #[test]
    fn test_query_search_metadata_and_limit() {
        let mut store = KnowledgeGraphStore::default();
        store.upsert_node(function("getUser").with_metadata("lang", "ts"));
        store.upsert_node(function("getUserById").with_metadata("lang", "ts"));
        store.upsert_node(
            function("load")
                .with_content("calls getUser internally")
                .with_metadata("lang", "py"),
        );

        let result = store.query(&QueryFilter::new().with_search_term("GETUSER"));
        assert_eq!(result.total_count, 3);

        let result = store.query(
            &QueryFilter::new()
                .with_search_term("getuser")
                .with_metadata("lang", "ts"),
        );
        assert_eq!(result.total_count, 2);

        let result = store.query(&QueryFilter::new().with_max_results(1));
        assert_eq!(result.nodes.len(), 1);
        // Most recently written node is scanned first
        assert_eq!(result.nodes[0].id, "load");
    }

    #[test]
    fn test_query_include_neighbors() {
        let mut store = KnowledgeGraphStore::default();
        store.upsert_node(
            KnowledgeNode::new("svc", NodeType::Class, "UserService")
                .with_relationship("get", RelationshipType::Contains),
        );
        store.upsert_node(function("get"));

        let result = store.query(
            &QueryFilter::new()
                .with_types([NodeType::Class])
                .with_neighbors(),
        );
        assert_eq!(result.relationships.len(), 1);
        assert_eq!(result.relationships[0].source_id, "svc");
        assert_eq!(result.relationships[0].target_id, "get");

        let plain = store.query(&QueryFilter::new().with_types([NodeType::Class]));
        assert!(plain.relationships.is_empty());
    }

    #[test]
    fn test_statistics() {
        let mut store = KnowledgeGraphStore::default();
        store.upsert_node(
            KnowledgeNode::new("m", NodeType::Module, "m")
                .with_relationship("f", RelationshipType::Contains)
                .with_relationship("g", RelationshipType::Contains),
        );
        store.upsert_node(function("f"));

        let stats = store.get_statistics();
        assert_eq!(stats.total_nodes, 2);
        assert_eq!(stats.total_relationships, 2);
        assert_eq!(stats.node_type_distribution.get(&NodeType::Module), Some(&1));
        assert_eq!(stats.node_type_distribution.get(&NodeType::Function), Some(&1));
        assert_eq!(stats.node_type_distribution.get(&NodeType::Error), None);
    }

    #[test]
    fn test_upsert_nodes_persists_once() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let persistence = GraphPersistence::in_dir(temp_dir.path());
        let mut store = KnowledgeGraphStore::open(
            GraphStoreConfig {
                max_nodes: 3,
                enable_lru: true,
            },
            persistence.clone(),
        );

        let evicted = store.upsert_nodes((0..5).map(|i| function(&format!("f{}", i))));

        assert_eq!(evicted, vec!["f0", "f1"]);
        assert_eq!(store.len(), 3);
        assert_eq!(persistence.issued_generation(), 1);
        assert!(store.upsert_nodes(Vec::new()).is_empty());
        assert_eq!(persistence.issued_generation(), 1);
    }

    #[test]
    fn test_nodes_lru_first() {
        let mut store = small_store(10);
        for id in ["a", "b", "c"] {
            store.upsert_node(function(id));
        }
        store.get_node("a");

        let order: Vec<&str> = store.nodes_lru_first().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_declared_derived_relationship_dropped() {
        let mut store = small_store(10);
        store.upsert_node(
            function("a")
                .with_relationship("b", RelationshipType::CalledBy)
                .with_relationship("b", RelationshipType::Calls),
        );
        store.upsert_node(function("b"));

        let a = store.peek_node("a").unwrap();
        assert_eq!(a.relationships.len(), 1);
        assert_eq!(a.relationships[0].relationship_type, RelationshipType::Calls);
        assert!(store.reverse_edges("a").is_empty());
        assert!(store.verify_indexes());
    }
}
