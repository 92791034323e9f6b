//! Retrieval engine facade.
//!
//! Wires the configured graph backend, optional vector index and composer
//! together. Graph writes and index writes stay independent: [`ingest`]
//! performs both, [`upsert_node`] and [`index_document`] one each.
//!
//! [`ingest`]: RetrievalEngine::ingest
//! [`upsert_node`]: RetrievalEngine::upsert_node
//! [`index_document`]: RetrievalEngine::index_document

use std::path::Path;

use codeloom_config::LoomConfig;
use serde::Serialize;
use tracing::{debug, info};

use crate::composer::{ComposerConfig, ContextComposer, LayeredContext};
use crate::error::{EngineError, GraphError, VectorIndexError};
use crate::model::{KnowledgeNode, Metadata};
use crate::provider::GraphBackend;
use crate::store::GraphStatistics;
use crate::vector::{IndexStats, SearchOptions, SearchResponse, VectorIndex, VectorIndexConfig};

/// Combined statistics for the graph and vector index.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub graph: GraphStatistics,
    /// `None` when the vector index is disabled
    pub index: Option<IndexStats>,
}

/// Knowledge retrieval engine built from a [`LoomConfig`].
#[derive(Debug)]
pub struct RetrievalEngine {
    config: LoomConfig,
    graph: GraphBackend,
    index: Option<VectorIndex>,
    composer_config: ComposerConfig,
}

impl RetrievalEngine {
    /// Build an engine.
    ///
    /// With persistence enabled the graph is reloaded from the data
    /// directory under `workspace_root` and every node is indexed, least
    /// recently used first, so score ties keep their pre-restart order.
    pub fn from_config(config: LoomConfig, workspace_root: &Path) -> Result<Self, EngineError> {
        config.validate()?;

        let mut index = if config.vector.enabled {
            Some(VectorIndex::new(VectorIndexConfig::from(&config.vector))?)
        } else {
            None
        };

        let graph = GraphBackend::from_config(&config, workspace_root);

        if let Some(index) = index.as_mut() {
            let indexed = index.index_documents(
                graph
                    .snapshot_nodes()
                    .into_iter()
                    .map(|node| (node.id.clone(), document_text(&node), document_metadata(&node))),
            );
            if indexed > 0 {
                info!("Indexed {} restored nodes", indexed);
            }
        }

        let mut composer_config = ComposerConfig::from(&config.context);
        composer_config.vector_threshold = config.vector.threshold;

        Ok(Self {
            config,
            graph,
            index,
            composer_config,
        })
    }

    /// In-memory engine with default settings.
    pub fn in_memory() -> Result<Self, EngineError> {
        Self::from_config(LoomConfig::default(), Path::new("."))
    }

    pub fn config(&self) -> &LoomConfig {
        &self.config
    }

    pub fn graph(&self) -> &GraphBackend {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut GraphBackend {
        &mut self.graph
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_ref()
    }

    /// Insert or replace a node in the graph only.
    ///
    /// Returns the id of a node evicted to make room.
    pub fn upsert_node(&mut self, node: KnowledgeNode) -> Option<String> {
        self.graph.upsert_node(node)
    }

    /// Get a node, marking it most recently used
    pub fn get_node(&mut self, id: &str) -> Option<KnowledgeNode> {
        self.graph.get_node(id)
    }

    /// Add or replace a document in the vector index only.
    ///
    /// Returns `false` when the index is disabled.
    pub fn index_document(
        &mut self,
        id: impl Into<String>,
        content: impl Into<String>,
        metadata: Metadata,
    ) -> bool {
        match self.index.as_mut() {
            Some(index) => {
                index.index_document(id, content, metadata);
                true
            }
            None => false,
        }
    }

    /// Upsert a node and index its name and content.
    ///
    /// A node evicted by the upsert is dropped from the index as well.
    pub fn ingest(&mut self, node: KnowledgeNode) -> Option<String> {
        let text = document_text(&node);
        let metadata = document_metadata(&node);
        let id = node.id.clone();

        let evicted = self.graph.upsert_node(node);
        if let Some(index) = self.index.as_mut() {
            if let Some(evicted) = evicted.as_deref() {
                index.remove_document(evicted);
            }
            index.index_document(id, text, metadata);
        }
        evicted
    }

    /// Bulk ingest with a single index rebuild and a single graph snapshot.
    /// Returns the ingested count.
    pub fn ingest_all(&mut self, nodes: impl IntoIterator<Item = KnowledgeNode>) -> usize {
        let nodes: Vec<KnowledgeNode> = nodes.into_iter().collect();
        let documents: Vec<_> = nodes
            .iter()
            .map(|node| (node.id.clone(), document_text(node), document_metadata(node)))
            .collect();
        let evicted_ids = self.graph.upsert_nodes(nodes);

        let count = documents.len();
        if let Some(index) = self.index.as_mut() {
            let graph = &self.graph;
            let live: Vec<_> = documents
                .into_iter()
                .filter(|(id, _, _)| graph.as_source().peek_node(id).ok().flatten().is_some())
                .collect();
            for evicted in &evicted_ids {
                if !live.iter().any(|(id, _, _)| id == evicted) {
                    index.remove_document(evicted);
                }
            }
            index.index_documents(live);
        }
        debug!("Ingested {} nodes ({} evicted)", count, evicted_ids.len());
        count
    }

    /// Remove a node from the graph and the index
    pub fn remove(&mut self, id: &str) -> Option<KnowledgeNode> {
        if let Some(index) = self.index.as_mut() {
            index.remove_document(id);
        }
        self.graph.remove_node(id)
    }

    /// Compose layered context; `None` uses `context.default_max_tokens`.
    pub fn compose(&self, input: &str, max_tokens: Option<usize>) -> LayeredContext {
        let max_tokens = max_tokens.unwrap_or(self.config.context.default_max_tokens);
        let mut composer = ContextComposer::new(self.graph.as_source())
            .with_config(self.composer_config.clone());
        if let Some(index) = self.index.as_ref() {
            composer = composer.with_index(index);
        }
        composer.compose(input, max_tokens)
    }

    /// Vector search with the configured defaults.
    ///
    /// Returns `Ok(None)` when the index is disabled.
    pub fn search(&self, query: &str) -> Result<Option<SearchResponse>, VectorIndexError> {
        self.search_with(query, &SearchOptions::from(&self.config.vector))
    }

    pub fn search_with(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Option<SearchResponse>, VectorIndexError> {
        self.index
            .as_ref()
            .map(|index| index.search(query, options))
            .transpose()
    }

    pub fn stats(&self) -> Result<EngineStats, GraphError> {
        Ok(EngineStats {
            graph: self.graph.as_source().get_statistics()?,
            index: self.index.as_ref().map(VectorIndex::get_index_stats),
        })
    }

    /// Write graph state synchronously, if persistent
    pub fn flush(&self) -> Result<(), GraphError> {
        self.graph.flush()
    }
}

/// Text indexed for a node: its name, then its content.
fn document_text(node: &KnowledgeNode) -> String {
    match node.content.as_deref() {
        Some(content) => format!("{}\n{}", node.name, content),
        None => node.name.clone(),
    }
}

fn document_metadata(node: &KnowledgeNode) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("type".to_string(), node.node_type.as_str().into());
    metadata
}
