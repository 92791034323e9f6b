//! Layered Context Composer
//!
//! Turns free-text input into a token-budgeted, priority-ordered context for
//! a language model. Layers are built and committed strictly in order:
//!
//! | Layer | Contents                                                     |
//! |-------|--------------------------------------------------------------|
//! | L0    | Nodes named in the input, plus their direct edge targets      |
//! | L1    | One-hop neighbors of L0                                       |
//! | L2    | Two-hop neighbors of L0 + L1, low-signal nodes filtered       |
//! | L3    | Global graph statistics                                       |
//!
//! Each layer is estimated before it is committed. A layer that does not fit
//! the remaining budget loses relationships, then entities, from the tail
//! until it does; a layer that cannot fit at all is omitted. Both cases are
//! recorded as truncation.
//!
//! Failures of the graph source or vector index never escape
//! [`ContextComposer::compose`]; they produce a degraded, empty context.

mod extract;

pub use extract::extract_candidates;

use std::collections::HashSet;
use std::fmt::Write as _;

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::budget::TokenBudget;
use crate::error::ComposeError;
use crate::model::{FlatRelationship, KnowledgeNode};
use crate::provider::GraphSource;
use crate::store::{GraphStatistics, QueryFilter};
use crate::vector::{SearchOptions, VectorIndex};

/// Fixed per-layer overhead in the token estimate
const LAYER_OVERHEAD_TOKENS: usize = 50;
const TOKENS_PER_ENTITY: usize = 20;
const TOKENS_PER_RELATIONSHIP: usize = 15;
const CHARS_PER_TOKEN: usize = 4;

/// Longest content snippet rendered per entity
const SNIPPET_CHARS: usize = 160;

/// `metadata.kind` values considered low-signal in L2
const LOW_SIGNAL_KINDS: [&str; 2] = ["declaration", "call"];

// ============================================================================
// Result Types
// ============================================================================

/// Layer identifier, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum LayerName {
    L0,
    L1,
    L2,
    L3,
}

impl LayerName {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerName::L0 => "L0",
            LayerName::L1 => "L1",
            LayerName::L2 => "L2",
            LayerName::L3 => "L3",
        }
    }

    /// Heading used when rendering the layer
    pub fn title(&self) -> &'static str {
        match self {
            LayerName::L0 => "Core entities",
            LayerName::L1 => "Direct relationships",
            LayerName::L2 => "Extended context",
            LayerName::L3 => "Global summary",
        }
    }
}

impl std::fmt::Display for LayerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One committed layer of context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextLayer {
    pub name: LayerName,
    /// Node ids, in priority order
    pub entities: Vec<String>,
    /// `source --type--> target` lines
    pub relationships: Vec<String>,
    /// Rendered text
    pub content: String,
    pub estimated_tokens: usize,
}

/// Whether composition ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CompositionStatus {
    Complete,
    /// A collaborator failed; layers are empty
    Degraded { reason: String },
}

/// Result of a composition call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayeredContext {
    /// Committed layers, L0 first
    pub layers: Vec<ContextLayer>,
    /// Sum of committed layer estimates, never above the budget
    pub total_tokens: usize,
    /// Whether any layer was cut down or omitted
    pub truncated: bool,
    pub truncation_reasons: Vec<String>,
    pub status: CompositionStatus,
}

impl LayeredContext {
    fn degraded(reason: impl Into<String>) -> Self {
        Self {
            layers: Vec::new(),
            total_tokens: 0,
            truncated: false,
            truncation_reasons: Vec::new(),
            status: CompositionStatus::Degraded {
                reason: reason.into(),
            },
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.status, CompositionStatus::Degraded { .. })
    }

    /// Find a committed layer
    pub fn layer(&self, name: LayerName) -> Option<&ContextLayer> {
        self.layers.iter().find(|layer| layer.name == name)
    }

    /// All entity ids across committed layers
    pub fn entity_ids(&self) -> impl Iterator<Item = &str> {
        self.layers
            .iter()
            .flat_map(|layer| layer.entities.iter().map(String::as_str))
    }

    /// Concatenate layer contents for a prompt
    pub fn render(&self) -> String {
        self.layers
            .iter()
            .map(|layer| layer.content.trim_end())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Composition limits.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposerConfig {
    /// Graph matches kept per extracted candidate
    pub matches_per_candidate: usize,
    /// Cap on L1 entities
    pub one_hop_limit: usize,
    /// Cap on L2 entities
    pub two_hop_limit: usize,
    /// Vector hits merged into L0 (0 disables)
    pub vector_hits: usize,
    /// Similarity threshold for vector hits
    pub vector_threshold: f32,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self::from(&codeloom_config::ContextConfig::default())
    }
}

impl From<&codeloom_config::ContextConfig> for ComposerConfig {
    fn from(config: &codeloom_config::ContextConfig) -> Self {
        Self {
            matches_per_candidate: config.matches_per_candidate,
            one_hop_limit: config.one_hop_limit,
            two_hop_limit: config.two_hop_limit,
            vector_hits: config.vector_hits,
            vector_threshold: codeloom_config::DEFAULT_THRESHOLD,
        }
    }
}

// ============================================================================
// Composer
// ============================================================================

/// A layer before it is fitted to the budget.
struct LayerDraft {
    name: LayerName,
    nodes: Vec<KnowledgeNode>,
    edges: Vec<FlatRelationship>,
}

/// Builds layered context from a graph source and an optional vector index.
pub struct ContextComposer<'a> {
    graph: &'a dyn GraphSource,
    index: Option<&'a VectorIndex>,
    config: ComposerConfig,
}

impl<'a> ContextComposer<'a> {
    pub fn new(graph: &'a dyn GraphSource) -> Self {
        Self {
            graph,
            index: None,
            config: ComposerConfig::default(),
        }
    }

    /// Merge vector hits into L0
    pub fn with_index(mut self, index: &'a VectorIndex) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_config(mut self, config: ComposerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Compose context for `input` within `max_tokens`.
    ///
    /// Never fails: collaborator errors yield a degraded result.
    pub fn compose(&self, input: &str, max_tokens: usize) -> LayeredContext {
        match self.try_compose(input, max_tokens) {
            Ok(context) => context,
            Err(e) => {
                warn!("Context composition degraded: {}", e);
                LayeredContext::degraded(e.to_string())
            }
        }
    }

    /// Compose context, surfacing collaborator errors.
    pub fn try_compose(
        &self,
        input: &str,
        max_tokens: usize,
    ) -> Result<LayeredContext, ComposeError> {
        let mut budget = TokenBudget::new(max_tokens);
        let mut context = LayeredContext {
            layers: Vec::new(),
            total_tokens: 0,
            truncated: false,
            truncation_reasons: Vec::new(),
            status: CompositionStatus::Complete,
        };

        // L0
        let l0 = self.core_layer(input)?;
        let l0_committed = if l0.nodes.is_empty() {
            debug!("No entities matched input, skipping L0-L2");
            false
        } else {
            commit(&mut context, &mut budget, l0)
        };

        // L1
        let l0_ids: Vec<String> = context
            .layer(LayerName::L0)
            .map(|layer| layer.entities.clone())
            .unwrap_or_default();
        let mut l1_ids: Vec<String> = Vec::new();
        if l0_committed && !budget.is_exhausted() {
            let l1 = self.one_hop_layer(&l0_ids)?;
            if !l1.nodes.is_empty() && commit(&mut context, &mut budget, l1) {
                l1_ids = context
                    .layer(LayerName::L1)
                    .map(|layer| layer.entities.clone())
                    .unwrap_or_default();
            }
        }

        // L2
        if l0_committed && !budget.is_exhausted() {
            let l2 = self.two_hop_layer(&l0_ids, &l1_ids)?;
            if !l2.nodes.is_empty() {
                commit(&mut context, &mut budget, l2);
            }
        }

        // L3
        let stats = self.graph.get_statistics()?;
        commit_summary(&mut context, &mut budget, &stats);

        debug!(
            "Composed {} layers using {}/{} tokens (truncated: {})",
            context.layers.len(),
            context.total_tokens,
            max_tokens,
            context.truncated
        );
        Ok(context)
    }

    /// Matched nodes followed by the existing targets of their outgoing edges.
    fn core_layer(&self, input: &str) -> Result<LayerDraft, ComposeError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut matched: Vec<KnowledgeNode> = Vec::new();

        for candidate in extract_candidates(input) {
            let filter = QueryFilter::new()
                .with_search_term(candidate.as_str())
                .with_max_results(self.config.matches_per_candidate);
            let result = self.graph.query(&filter)?;
            trace!("Candidate '{}' matched {} nodes", candidate, result.total_count);
            for node in result.nodes {
                if seen.insert(node.id.clone()) {
                    matched.push(node);
                }
            }
        }

        if let Some(index) = self.index {
            if self.config.vector_hits > 0 && !index.is_empty() {
                let options = SearchOptions::default()
                    .with_top_k(self.config.vector_hits)
                    .with_threshold(self.config.vector_threshold);
                let response = index.search(input, &options)?;
                for hit in response.results {
                    if seen.contains(&hit.id) {
                        continue;
                    }
                    if let Some(node) = self.graph.peek_node(&hit.id)? {
                        seen.insert(node.id.clone());
                        matched.push(node);
                    }
                }
            }
        }

        let mut nodes = matched.clone();
        let mut edges = Vec::new();
        for node in &matched {
            for edge in self.graph.outgoing_edges(&node.id)? {
                let target_known = seen.contains(&edge.target_id);
                if !target_known {
                    match self.graph.peek_node(&edge.target_id)? {
                        Some(target) => {
                            seen.insert(target.id.clone());
                            nodes.push(target);
                        }
                        None => continue,
                    }
                }
                edges.push(edge);
            }
        }

        Ok(LayerDraft {
            name: LayerName::L0,
            nodes,
            edges,
        })
    }

    fn one_hop_layer(&self, l0_ids: &[String]) -> Result<LayerDraft, ComposeError> {
        let seen: HashSet<&str> = l0_ids.iter().map(String::as_str).collect();
        let mut nodes: Vec<KnowledgeNode> = Vec::new();

        'outer: for id in l0_ids {
            for neighbor in self.graph.get_neighbors(id, 1)? {
                if nodes.len() >= self.config.one_hop_limit {
                    break 'outer;
                }
                if !seen.contains(neighbor.id.as_str()) && !nodes.iter().any(|n| n.id == neighbor.id) {
                    nodes.push(neighbor);
                }
            }
        }

        let edges = self.edges_between(l0_ids, &nodes)?;
        Ok(LayerDraft {
            name: LayerName::L1,
            nodes,
            edges,
        })
    }

    fn two_hop_layer(&self, l0_ids: &[String], l1_ids: &[String]) -> Result<LayerDraft, ComposeError> {
        let seeds: Vec<&String> = l0_ids.iter().chain(l1_ids).collect();
        let seed_set: HashSet<&str> = seeds.iter().map(|id| id.as_str()).collect();
        let mut nodes: Vec<KnowledgeNode> = Vec::new();
        let mut filtered = 0usize;

        'outer: for id in &seeds {
            for neighbor in self.graph.get_neighbors(id, 2)? {
                if nodes.len() >= self.config.two_hop_limit {
                    break 'outer;
                }
                if seed_set.contains(neighbor.id.as_str()) || nodes.iter().any(|n| n.id == neighbor.id) {
                    continue;
                }
                if is_low_signal(&neighbor) {
                    filtered += 1;
                    continue;
                }
                nodes.push(neighbor);
            }
        }
        if filtered > 0 {
            trace!("Filtered {} low-signal nodes from L2", filtered);
        }

        let sources: Vec<String> = if l1_ids.is_empty() {
            l0_ids.to_vec()
        } else {
            l1_ids.to_vec()
        };
        let edges = self.edges_between(&sources, &nodes)?;
        Ok(LayerDraft {
            name: LayerName::L2,
            nodes,
            edges,
        })
    }

    /// Outgoing edges of `sources` that land on one of `targets`.
    fn edges_between(
        &self,
        sources: &[String],
        targets: &[KnowledgeNode],
    ) -> Result<Vec<FlatRelationship>, ComposeError> {
        let target_ids: HashSet<&str> = targets.iter().map(|n| n.id.as_str()).collect();
        let mut edges = Vec::new();
        for source in sources {
            edges.extend(
                self.graph
                    .outgoing_edges(source)?
                    .into_iter()
                    .filter(|edge| target_ids.contains(edge.target_id.as_str())),
            );
        }
        Ok(edges)
    }
}

fn is_low_signal(node: &KnowledgeNode) -> bool {
    node.metadata_str("kind")
        .is_some_and(|kind| LOW_SIGNAL_KINDS.contains(&kind))
}

// ============================================================================
// Rendering and Budgeting
// ============================================================================

/// Token estimate for a rendered layer.
pub fn estimate_tokens(entities: usize, relationships: usize, content: &str) -> usize {
    entities * TOKENS_PER_ENTITY
        + relationships * TOKENS_PER_RELATIONSHIP
        + LAYER_OVERHEAD_TOKENS
        + content.chars().count() / CHARS_PER_TOKEN
}

fn render_layer(name: LayerName, nodes: &[KnowledgeNode], edges: &[FlatRelationship]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## {}: {}", name, name.title());
    for node in nodes {
        let _ = writeln!(out, "- {} {} [{}]", node.node_type, node.name, node.id);
        if let Some(snippet) = node.content.as_deref().and_then(snippet) {
            let _ = writeln!(out, "  {}", snippet);
        }
    }
    if !edges.is_empty() {
        out.push_str("Relationships:\n");
        for edge in edges {
            let _ = writeln!(out, "- {}", edge.describe());
        }
    }
    out
}

/// First non-empty line of content, shortened.
fn snippet(content: &str) -> Option<String> {
    let line = content.lines().map(str::trim).find(|l| !l.is_empty())?;
    if line.chars().count() <= SNIPPET_CHARS {
        Some(line.to_string())
    } else {
        let cut: String = line.chars().take(SNIPPET_CHARS).collect();
        Some(format!("{}...", cut))
    }
}

/// Fit a draft to the remaining budget and commit it.
///
/// Returns `true` if the layer was committed with at least one entity.
fn commit(context: &mut LayeredContext, budget: &mut TokenBudget, draft: LayerDraft) -> bool {
    let LayerDraft {
        name,
        mut nodes,
        mut edges,
    } = draft;
    let original = (nodes.len(), edges.len());

    loop {
        let content = render_layer(name, &nodes, &edges);
        let estimate = estimate_tokens(nodes.len(), edges.len(), &content);

        if budget.fits(estimate) {
            let dropped_edges = original.1 - edges.len();
            let dropped_nodes = original.0 - nodes.len();
            if nodes.is_empty() {
                // Nothing left worth sending
                record_truncation(
                    context,
                    format!(
                        "{}: omitted, no entity fits in {} remaining tokens",
                        name,
                        budget.remaining_tokens()
                    ),
                );
                return false;
            }
            if dropped_edges > 0 || dropped_nodes > 0 {
                record_truncation(
                    context,
                    format!(
                        "{}: dropped {} relationships and {} entities to fit {} remaining tokens",
                        name,
                        dropped_edges,
                        dropped_nodes,
                        budget.remaining_tokens()
                    ),
                );
            }
            budget.consume(estimate);
            context.total_tokens += estimate;
            context.layers.push(ContextLayer {
                name,
                entities: nodes.into_iter().map(|n| n.id).collect(),
                relationships: edges.iter().map(FlatRelationship::describe).collect(),
                content,
                estimated_tokens: estimate,
            });
            return true;
        }

        if edges.pop().is_some() {
            continue;
        }
        if nodes.pop().is_some() {
            continue;
        }

        record_truncation(
            context,
            format!(
                "{}: omitted, needs {} tokens but {} remain",
                name,
                estimate,
                budget.remaining_tokens()
            ),
        );
        return false;
    }
}

/// Render statistics as L3 and commit if it fits.
fn commit_summary(context: &mut LayeredContext, budget: &mut TokenBudget, stats: &GraphStatistics) {
    let name = LayerName::L3;
    let mut content = String::new();
    let _ = writeln!(content, "## {}: {}", name, name.title());
    let _ = writeln!(content, "Entities: {}", stats.total_nodes);
    let _ = writeln!(content, "Relationships: {}", stats.total_relationships);
    if !stats.node_type_distribution.is_empty() {
        let breakdown: Vec<String> = stats
            .node_type_distribution
            .iter()
            .map(|(node_type, count)| format!("{}={}", node_type, count))
            .collect();
        let _ = writeln!(content, "Types: {}", breakdown.join(", "));
    }

    let estimate = estimate_tokens(0, 0, &content);
    if !budget.fits(estimate) {
        record_truncation(
            context,
            format!(
                "{}: omitted, needs {} tokens but {} remain",
                name,
                estimate,
                budget.remaining_tokens()
            ),
        );
        return;
    }

    budget.consume(estimate);
    context.total_tokens += estimate;
    context.layers.push(ContextLayer {
        name,
        entities: Vec::new(),
        relationships: Vec::new(),
        content,
        estimated_tokens: estimate,
    });
}

fn record_truncation(context: &mut LayeredContext, reason: String) {
    debug!("Truncated context: {}", reason);
    context.truncated = true;
    context.truncation_reasons.push(reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;
    use crate::model::{NodeType, RelationshipType};
    use crate::store::{KnowledgeGraphStore, QueryResult};
    use codeloom_config::GraphBackendType;
    use pretty_assertions::assert_eq;

    fn user_service_graph() -> KnowledgeGraphStore {
        let mut store = KnowledgeGraphStore::default();
        store.upsert_node(
            KnowledgeNode::new("UserService", NodeType::Class, "UserService")
                .with_relationship("getUserById", RelationshipType::Contains),
        );
        store.upsert_node(
            KnowledgeNode::new("getUserById", NodeType::Function, "getUserById")
                .with_content("return this.repo.find(id);"),
        );
        store
    }

    struct OfflineSource;

    impl GraphSource for OfflineSource {
        fn query(&self, _filter: &QueryFilter) -> Result<QueryResult, GraphError> {
            Err(GraphError::unavailable("backend offline"))
        }
        fn peek_node(&self, _id: &str) -> Result<Option<KnowledgeNode>, GraphError> {
            Err(GraphError::unavailable("backend offline"))
        }
        fn get_neighbors(&self, _id: &str, _depth: usize) -> Result<Vec<KnowledgeNode>, GraphError> {
            Err(GraphError::unavailable("backend offline"))
        }
        fn outgoing_edges(&self, _id: &str) -> Result<Vec<FlatRelationship>, GraphError> {
            Err(GraphError::unavailable("backend offline"))
        }
        fn get_statistics(&self) -> Result<GraphStatistics, GraphError> {
            Err(GraphError::unavailable("backend offline"))
        }
        fn backend_type(&self) -> GraphBackendType {
            GraphBackendType::Memory
        }
    }

    #[test]
    fn test_core_layer_includes_container() {
        let store = user_service_graph();
        let context = ContextComposer::new(&store).compose("optimize getUserById", 4000);

        assert_eq!(context.status, CompositionStatus::Complete);
        let l0 = context.layer(LayerName::L0).unwrap();
        assert!(l0.entities.contains(&"getUserById".to_string()));
        assert!(l0.entities.contains(&"UserService".to_string()));
        assert!(l0
            .relationships
            .contains(&"getUserById --contained_by--> UserService".to_string()));
        assert!(context.layer(LayerName::L1).is_none());
        assert!(context.layer(LayerName::L3).is_some());
        assert!(!context.truncated);
    }

    #[test]
    fn test_layers_in_order_and_within_budget() {
        let mut store = user_service_graph();
        store.upsert_node(
            KnowledgeNode::new("UserRepo", NodeType::Class, "UserRepo")
                .with_relationship("UserService", RelationshipType::References)
                .with_relationship("Database", RelationshipType::Calls),
        );
        store.upsert_node(KnowledgeNode::new("Database", NodeType::Module, "Database"));

        let context = ContextComposer::new(&store).compose("optimize getUserById", 4000);
        let names: Vec<LayerName> = context.layers.iter().map(|l| l.name).collect();
        assert_eq!(names, vec![LayerName::L0, LayerName::L1, LayerName::L2, LayerName::L3]);
        assert_eq!(context.layer(LayerName::L1).unwrap().entities, vec!["UserRepo"]);
        assert_eq!(context.layer(LayerName::L2).unwrap().entities, vec!["Database"]);

        let sum: usize = context.layers.iter().map(|l| l.estimated_tokens).sum();
        assert_eq!(sum, context.total_tokens);
        assert!(context.total_tokens <= 4000);
    }

    #[test]
    fn test_zero_budget() {
        let store = user_service_graph();
        let context = ContextComposer::new(&store).compose("optimize getUserById", 0);
        assert!(context.layers.is_empty());
        assert!(context.truncated);
        assert_eq!(context.total_tokens, 0);
    }

    #[test]
    fn test_tight_budget_truncates_tail() {
        let store = user_service_graph();
        let full = ContextComposer::new(&store).compose("optimize getUserById", 4000);
        let l0_full = full.layer(LayerName::L0).unwrap().estimated_tokens;

        let context = ContextComposer::new(&store).compose("optimize getUserById", l0_full - 1);
        assert!(context.truncated);
        assert!(context.total_tokens < l0_full);
        let l0 = context.layer(LayerName::L0).unwrap();
        assert!(l0.relationships.is_empty() || l0.entities.len() < 2);
        assert!(!context.truncation_reasons.is_empty());
    }

    #[test]
    fn test_low_signal_nodes_filtered_from_two_hop() {
        let mut store = KnowledgeGraphStore::default();
        store.upsert_node(
            KnowledgeNode::new("AuthService", NodeType::Class, "AuthService")
                .with_relationship("hop1", RelationshipType::Calls),
        );
        store.upsert_node(
            KnowledgeNode::new("hop1", NodeType::Function, "hop1")
                .with_relationship("hop2", RelationshipType::Calls),
        );
        store.upsert_node(
            KnowledgeNode::new("hop2", NodeType::Function, "hop2")
                .with_relationship("noise", RelationshipType::Calls)
                .with_relationship("signal", RelationshipType::Calls),
        );
        store.upsert_node(
            KnowledgeNode::new("noise", NodeType::Function, "noise").with_metadata("kind", "call"),
        );
        store.upsert_node(KnowledgeNode::new("signal", NodeType::Function, "signal"));

        let context = ContextComposer::new(&store).compose("AuthService", 4000);
        assert_eq!(context.layer(LayerName::L1).unwrap().entities, vec!["hop2"]);
        let ids: Vec<&str> = context.entity_ids().collect();
        assert!(ids.contains(&"signal"));
        assert!(!ids.contains(&"noise"));
    }

    /// RootService -> Hub -> 25 spokes, each spoke -> one leaf
    fn hub_graph() -> KnowledgeGraphStore {
        let mut store = KnowledgeGraphStore::default();
        store.upsert_node(
            KnowledgeNode::new("RootService", NodeType::Class, "RootService")
                .with_relationship("hub", RelationshipType::Contains),
        );
        let mut hub = KnowledgeNode::new("hub", NodeType::Module, "hub");
        for i in 0..25 {
            hub = hub.with_relationship(format!("spoke{}", i), RelationshipType::Contains);
            store.upsert_node(
                KnowledgeNode::new(format!("spoke{}", i), NodeType::Function, format!("spoke{}", i))
                    .with_relationship(format!("leaf{}", i), RelationshipType::Calls),
            );
            store.upsert_node(KnowledgeNode::new(
                format!("leaf{}", i),
                NodeType::Function,
                format!("leaf{}", i),
            ));
        }
        store.upsert_node(hub);
        store
    }

    #[test]
    fn test_hop_layers_capped() {
        let store = hub_graph();
        let context = ContextComposer::new(&store).compose("inspect RootService", 100_000);

        assert!(!context.truncated);
        assert_eq!(
            context.layer(LayerName::L0).unwrap().entities,
            vec!["RootService", "hub"]
        );
        let l1 = context.layer(LayerName::L1).unwrap();
        assert_eq!(l1.entities.len(), 20);
        assert!(l1.entities.iter().all(|id| id.starts_with("spoke")));
        assert_eq!(context.layer(LayerName::L2).unwrap().entities.len(), 15);
    }

    #[test]
    fn test_zero_hop_limits_emit_no_hop_layers() {
        let store = hub_graph();
        let config = ComposerConfig {
            one_hop_limit: 0,
            two_hop_limit: 0,
            ..ComposerConfig::default()
        };
        let context = ContextComposer::new(&store)
            .with_config(config)
            .compose("inspect RootService", 100_000);

        let names: Vec<LayerName> = context.layers.iter().map(|l| l.name).collect();
        assert_eq!(names, vec![LayerName::L0, LayerName::L3]);
    }

    #[test]
    fn test_no_match_yields_summary_only() {
        let store = user_service_graph();
        let context = ContextComposer::new(&store).compose("nothing relevant here", 4000);
        assert_eq!(context.layers.len(), 1);
        assert_eq!(context.layers[0].name, LayerName::L3);
        assert!(context.render().contains("Entities: 2"));
    }

    #[test]
    fn test_source_failure_degrades() {
        let context = ContextComposer::new(&OfflineSource).compose("optimize getUserById", 4000);
        assert!(context.is_degraded());
        assert!(context.layers.is_empty());
        match &context.status {
            CompositionStatus::Degraded { reason } => assert!(reason.contains("backend offline")),
            CompositionStatus::Complete => panic!("expected degraded status"),
        }

        let err = ContextComposer::new(&OfflineSource)
            .try_compose("getUserById", 4000)
            .unwrap_err();
        assert!(matches!(err, ComposeError::Graph(_)));
    }

    #[test]
    fn test_vector_hits_join_core_layer() {
        let store = user_service_graph();
        let mut index = VectorIndex::new(Default::default()).unwrap();
        index.index_document("getUserById", "repository lookup by identifier", Default::default());
        index.index_document("UserService", "service facade", Default::default());
        index.index_document("orphan", "repository lookup", Default::default());

        let context = ContextComposer::new(&store)
            .with_index(&index)
            .compose("repository lookup", 4000);
        let l0 = context.layer(LayerName::L0).unwrap();
        assert!(l0.entities.contains(&"getUserById".to_string()));
        // Vector hits without a graph node are ignored
        assert!(!l0.entities.contains(&"orphan".to_string()));
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(0, 0, ""), 50);
        assert_eq!(estimate_tokens(2, 1, "abcdefgh"), 40 + 15 + 50 + 2);
    }
}
