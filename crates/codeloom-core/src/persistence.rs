//! Graph persistence
//!
//! A persistent store writes two JSON artifacts after every mutation:
//!
//! - `nodes.json`: array of nodes, least recently used first
//! - `relationships.json`: reverse adjacency map (target id → reverse edges)
//!
//! Snapshots are serialized on the mutating thread and handed to a single
//! background writer (a tokio blocking task when a runtime is present,
//! otherwise a plain thread). At most one snapshot waits while the writer is
//! busy; a newer one replaces it. Each write goes to a temporary file that is
//! renamed into place only if no newer snapshot has landed, so the last
//! mutation wins.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::GraphError;
use crate::model::{KnowledgeNode, ReverseEdge};

/// Graph state as read back from disk.
#[derive(Debug, Clone, Default)]
pub struct PersistedGraph {
    /// Nodes, least recently used first
    pub nodes: Vec<KnowledgeNode>,
    /// Reverse adjacency, taken verbatim
    pub reverse_edges: HashMap<String, Vec<ReverseEdge>>,
}

impl PersistedGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.reverse_edges.is_empty()
    }
}

/// Write ordering shared by every clone of a [`GraphPersistence`].
#[derive(Debug, Default)]
struct WriteState {
    /// Last generation handed out
    issued: AtomicU64,
    /// Last generation renamed into place
    committed: Mutex<u64>,
    queue: Mutex<WriteQueue>,
}

/// Background writer hand-off.
#[derive(Debug, Default)]
struct WriteQueue {
    /// Newest snapshot not yet picked up by the writer
    pending: Option<Snapshot>,
    /// Whether a writer task is running
    writer_active: bool,
}

/// Reads and writes the persisted artifacts of one store.
#[derive(Debug, Clone)]
pub struct GraphPersistence {
    nodes_path: PathBuf,
    relationships_path: PathBuf,
    state: Arc<WriteState>,
}

impl GraphPersistence {
    /// Persist to explicit artifact paths
    pub fn new(nodes_path: impl Into<PathBuf>, relationships_path: impl Into<PathBuf>) -> Self {
        Self {
            nodes_path: nodes_path.into(),
            relationships_path: relationships_path.into(),
            state: Arc::new(WriteState::default()),
        }
    }

    /// Persist to the default file names inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(
            dir.join(codeloom_config::DEFAULT_NODES_FILE),
            dir.join(codeloom_config::DEFAULT_RELATIONSHIPS_FILE),
        )
    }

    /// Persist where the configuration says, relative to `workspace_root`
    pub fn from_config(config: &codeloom_config::LoomConfig, workspace_root: &Path) -> Self {
        Self::new(
            config.nodes_path(workspace_root),
            config.relationships_path(workspace_root),
        )
    }

    pub fn nodes_path(&self) -> &Path {
        &self.nodes_path
    }

    pub fn relationships_path(&self) -> &Path {
        &self.relationships_path
    }

    /// Number of the newest snapshot that reached disk (0 if none)
    pub fn committed_generation(&self) -> u64 {
        *self.state.committed.lock()
    }

    /// Number of the newest snapshot handed to a writer (0 if none)
    pub fn issued_generation(&self) -> u64 {
        self.state.issued.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Load persisted state, falling back to an empty graph.
    ///
    /// Missing artifacts are silent; unreadable or corrupt ones are logged.
    /// Either artifact failing discards both.
    pub fn load(&self) -> PersistedGraph {
        match self.try_load() {
            Ok(Some(graph)) => graph,
            Ok(None) => {
                debug!(
                    "No persisted graph at {}, starting empty",
                    self.nodes_path.display()
                );
                PersistedGraph::default()
            }
            Err(e) => {
                warn!("Discarding persisted graph state: {}", e);
                PersistedGraph::default()
            }
        }
    }

    /// Load persisted state.
    ///
    /// Returns `Ok(None)` when neither artifact exists. A missing
    /// relationships artifact next to an existing nodes artifact reads as
    /// an empty adjacency map.
    pub fn try_load(&self) -> Result<Option<PersistedGraph>, GraphError> {
        let nodes: Option<Vec<KnowledgeNode>> = read_json(&self.nodes_path)?;
        let reverse_edges: Option<HashMap<String, Vec<ReverseEdge>>> =
            read_json(&self.relationships_path)?;

        if nodes.is_none() && reverse_edges.is_none() {
            return Ok(None);
        }

        Ok(Some(PersistedGraph {
            nodes: nodes.unwrap_or_default(),
            reverse_edges: reverse_edges.unwrap_or_default(),
        }))
    }

    // ------------------------------------------------------------------------
    // Saving
    // ------------------------------------------------------------------------

    /// Write a snapshot synchronously.
    pub fn save(
        &self,
        nodes: &[&KnowledgeNode],
        reverse_edges: &HashMap<String, Vec<ReverseEdge>>,
    ) -> Result<(), GraphError> {
        let snapshot = self.encode(nodes, reverse_edges)?;
        snapshot.write(&self.state)
    }

    /// Serialize a snapshot now and write it in the background.
    ///
    /// Snapshots queued while the writer is busy collapse into the newest.
    /// Failures are logged, never returned.
    pub fn save_in_background(
        &self,
        nodes: &[&KnowledgeNode],
        reverse_edges: &HashMap<String, Vec<ReverseEdge>>,
    ) {
        let snapshot = match self.encode(nodes, reverse_edges) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to serialize graph snapshot: {}", e);
                return;
            }
        };

        {
            let mut queue = self.state.queue.lock();
            let newest = queue
                .pending
                .as_ref()
                .map_or(true, |pending| pending.generation < snapshot.generation);
            if newest {
                if let Some(pending) = queue.pending.replace(snapshot) {
                    trace!("Superseded queued graph snapshot {}", pending.generation);
                }
            }
            if queue.writer_active {
                return;
            }
            queue.writer_active = true;
        }

        let state = Arc::clone(&self.state);
        let job = move || drain_queue(&state);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(job);
            }
            Err(_) => {
                std::thread::spawn(job);
            }
        }
    }

    fn encode(
        &self,
        nodes: &[&KnowledgeNode],
        reverse_edges: &HashMap<String, Vec<ReverseEdge>>,
    ) -> Result<Snapshot, GraphError> {
        let ordered: BTreeMap<&String, &Vec<ReverseEdge>> = reverse_edges.iter().collect();
        let nodes_json = serde_json::to_vec_pretty(nodes)?;
        let relationships_json = serde_json::to_vec_pretty(&ordered)?;

        let generation = self.state.issued.fetch_add(1, Ordering::SeqCst) + 1;
        trace!("Encoded graph snapshot generation {}", generation);

        Ok(Snapshot {
            generation,
            nodes_path: self.nodes_path.clone(),
            nodes_json,
            relationships_path: self.relationships_path.clone(),
            relationships_json,
        })
    }
}

/// Write queued snapshots until the queue is empty, then retire.
fn drain_queue(state: &WriteState) {
    loop {
        let snapshot = {
            let mut queue = state.queue.lock();
            match queue.pending.take() {
                Some(snapshot) => snapshot,
                None => {
                    queue.writer_active = false;
                    return;
                }
            }
        };
        if let Err(e) = snapshot.write(state) {
            warn!("Failed to persist graph snapshot: {}", e);
        }
    }
}

/// A serialized snapshot waiting to be written.
struct Snapshot {
    generation: u64,
    nodes_path: PathBuf,
    nodes_json: Vec<u8>,
    relationships_path: PathBuf,
    relationships_json: Vec<u8>,
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("generation", &self.generation)
            .field("nodes_bytes", &self.nodes_json.len())
            .field("relationships_bytes", &self.relationships_json.len())
            .finish()
    }
}

impl Snapshot {
    fn write(self, state: &WriteState) -> Result<(), GraphError> {
        let nodes_tmp = stage(&self.nodes_path, self.generation, &self.nodes_json)?;
        let relationships_tmp = match stage(
            &self.relationships_path,
            self.generation,
            &self.relationships_json,
        ) {
            Ok(tmp) => tmp,
            Err(e) => {
                let _ = fs::remove_file(&nodes_tmp);
                return Err(e);
            }
        };

        let mut committed = state.committed.lock();
        if *committed > self.generation {
            trace!(
                "Dropping stale graph snapshot {} (committed {})",
                self.generation,
                *committed
            );
            let _ = fs::remove_file(&nodes_tmp);
            let _ = fs::remove_file(&relationships_tmp);
            return Ok(());
        }

        fs::rename(&nodes_tmp, &self.nodes_path).map_err(|e| GraphError::io(&self.nodes_path, e))?;
        fs::rename(&relationships_tmp, &self.relationships_path)
            .map_err(|e| GraphError::io(&self.relationships_path, e))?;
        *committed = self.generation;

        debug!(
            "Persisted graph snapshot {} to {}",
            self.generation,
            self.nodes_path.display()
        );
        Ok(())
    }
}

/// Write bytes to a generation-specific temporary file next to `path`.
fn stage(path: &Path, generation: u64, bytes: &[u8]) -> Result<PathBuf, GraphError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| GraphError::io(parent, e))?;
        }
    }

    let mut file_name = path.file_name().unwrap_or_default().to_os_string();
    file_name.push(format!(".{}.tmp", generation));
    let tmp = path.with_file_name(file_name);

    fs::write(&tmp, bytes).map_err(|e| GraphError::io(&tmp, e))?;
    Ok(tmp)
}

/// Read a JSON artifact; `Ok(None)` if it does not exist.
fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, GraphError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(GraphError::io(path, e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| GraphError::malformed(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeType, RelationshipType};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample() -> (Vec<KnowledgeNode>, HashMap<String, Vec<ReverseEdge>>) {
        let nodes = vec![
            KnowledgeNode::new("a", NodeType::File, "a.ts")
                .with_relationship("b", RelationshipType::Imports),
            KnowledgeNode::new("b", NodeType::File, "b.ts"),
        ];
        let mut reverse = HashMap::new();
        reverse.insert(
            "b".to_string(),
            vec![ReverseEdge {
                source_id: "a".to_string(),
                relationship_type: RelationshipType::ImportedBy,
                weight: None,
            }],
        );
        (nodes, reverse)
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = GraphPersistence::in_dir(temp_dir.path().join("state"));
        let (nodes, reverse) = sample();
        let refs: Vec<&KnowledgeNode> = nodes.iter().collect();

        persistence.save(&refs, &reverse).unwrap();

        let loaded = persistence.try_load().unwrap().unwrap();
        assert_eq!(loaded.nodes, nodes);
        assert_eq!(loaded.reverse_edges, reverse);
        assert_eq!(persistence.committed_generation(), 1);
    }

    #[test]
    fn test_missing_files_load_empty() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = GraphPersistence::in_dir(temp_dir.path());

        assert!(persistence.try_load().unwrap().is_none());
        assert!(persistence.load().is_empty());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = GraphPersistence::in_dir(temp_dir.path());
        let (nodes, reverse) = sample();
        let refs: Vec<&KnowledgeNode> = nodes.iter().collect();
        persistence.save(&refs, &reverse).unwrap();

        fs::write(persistence.relationships_path(), "{not json").unwrap();

        assert!(matches!(
            persistence.try_load(),
            Err(GraphError::Malformed { .. })
        ));
        assert!(persistence.load().is_empty());
    }

    #[test]
    fn test_stale_snapshot_is_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = GraphPersistence::in_dir(temp_dir.path());
        let (nodes, reverse) = sample();
        let refs: Vec<&KnowledgeNode> = nodes.iter().collect();

        let older = persistence.encode(&refs[..1], &HashMap::new()).unwrap();
        let newer = persistence.encode(&refs, &reverse).unwrap();

        newer.write(&persistence.state).unwrap();
        older.write(&persistence.state).unwrap();

        let loaded = persistence.try_load().unwrap().unwrap();
        assert_eq!(loaded.nodes.len(), 2);
        assert_eq!(persistence.committed_generation(), 2);

        let leftovers: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_busy_writer_keeps_only_newest_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = GraphPersistence::in_dir(temp_dir.path());
        let (nodes, reverse) = sample();
        let refs: Vec<&KnowledgeNode> = nodes.iter().collect();

        // Hold the writer slot so nothing is spawned
        persistence.state.queue.lock().writer_active = true;
        persistence.save_in_background(&refs[..1], &HashMap::new());
        persistence.save_in_background(&refs, &reverse);

        assert_eq!(
            persistence
                .state
                .queue
                .lock()
                .pending
                .as_ref()
                .map(|s| s.generation),
            Some(2)
        );

        drain_queue(&persistence.state);

        let queue = persistence.state.queue.lock();
        assert!(queue.pending.is_none());
        assert!(!queue.writer_active);
        drop(queue);

        assert_eq!(persistence.committed_generation(), 2);
        let loaded = persistence.try_load().unwrap().unwrap();
        assert_eq!(loaded.nodes, nodes);
    }

    #[test]
    fn test_background_burst_lands_last_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = GraphPersistence::in_dir(temp_dir.path());
        let nodes: Vec<KnowledgeNode> = (0..200)
            .map(|i| KnowledgeNode::new(format!("n{}", i), NodeType::Concept, "n"))
            .collect();

        for end in 1..=nodes.len() {
            let refs: Vec<&KnowledgeNode> = nodes[..end].iter().collect();
            persistence.save_in_background(&refs, &HashMap::new());
        }

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while persistence.committed_generation() < persistence.issued_generation() {
            assert!(std::time::Instant::now() < deadline, "writes never settled");
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        assert_eq!(persistence.committed_generation(), 200);
        assert_eq!(persistence.try_load().unwrap().unwrap().nodes.len(), 200);
    }
}
