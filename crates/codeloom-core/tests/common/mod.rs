//! Common test utilities for integration tests.
//!
//! Fixture graphs and consistency checks shared across integration test
//! files.

#![allow(dead_code)]

use std::collections::HashSet;
use std::thread;
use std::time::{Duration, Instant};

use codeloom_core::{
    GraphPersistence, KnowledgeGraphStore, KnowledgeNode, NodeType, RelationshipType,
};

// ============================================================================
// Fixtures
// ============================================================================

/// `UserService --contains--> getUserById`
pub fn user_service_nodes() -> Vec<KnowledgeNode> {
    vec![
        KnowledgeNode::new("UserService", NodeType::Class, "UserService")
            .with_content("class UserService { getUserById(id) {} }")
            .with_metadata("file", "src/services/user.ts")
            .with_relationship("getUserById", RelationshipType::Contains),
        KnowledgeNode::new("getUserById", NodeType::Function, "getUserById")
            .with_content("return this.repo.find(id);")
            .with_metadata("file", "src/services/user.ts"),
    ]
}

/// A small project: files importing each other, classes, functions and a
/// few low-signal call-site nodes.
pub fn project_nodes() -> Vec<KnowledgeNode> {
    vec![
        KnowledgeNode::new("src/app.ts", NodeType::File, "app.ts")
            .with_relationship("src/auth.ts", RelationshipType::Imports)
            .with_relationship("src/db.ts", RelationshipType::Imports),
        KnowledgeNode::new("src/auth.ts", NodeType::File, "auth.ts")
            .with_relationship("AuthService", RelationshipType::Contains)
            .with_relationship("src/db.ts", RelationshipType::Imports),
        KnowledgeNode::new("src/db.ts", NodeType::File, "db.ts")
            .with_relationship("Database", RelationshipType::Contains),
        KnowledgeNode::new("AuthService", NodeType::Class, "AuthService")
            .with_content("Issues and validates session tokens")
            .with_relationship("validateToken", RelationshipType::Contains)
            .with_relationship("Database", RelationshipType::References),
        KnowledgeNode::new("validateToken", NodeType::Function, "validateToken")
            .with_content("Checks token signature and expiry")
            .with_relationship("decodeJwt", RelationshipType::Calls)
            .with_relationship("call:decodeJwt", RelationshipType::References),
        KnowledgeNode::new("decodeJwt", NodeType::Function, "decodeJwt")
            .with_content("Parses a JWT without verifying it"),
        KnowledgeNode::new("call:decodeJwt", NodeType::Function, "decodeJwt()")
            .with_metadata("kind", "call"),
        KnowledgeNode::new("Database", NodeType::Class, "Database")
            .with_content("Connection pool wrapper")
            .with_relationship("query", RelationshipType::Contains),
        KnowledgeNode::new("query", NodeType::Function, "query")
            .with_content("Runs a parameterized statement"),
        KnowledgeNode::new("TokenExpired", NodeType::Error, "TokenExpired")
            .with_relationship("validateToken", RelationshipType::References),
        KnowledgeNode::new("sessions", NodeType::Concept, "Sessions")
            .with_content("User sessions are stateless tokens"),
    ]
}

/// Store preloaded with the given nodes, in order
pub fn store_with(nodes: Vec<KnowledgeNode>) -> KnowledgeGraphStore {
    let mut store = KnowledgeGraphStore::default();
    for node in nodes {
        store.upsert_node(node);
    }
    store
}

// ============================================================================
// Checks
// ============================================================================

/// Assert no node declares a relationship to a missing id in `removed`.
pub fn assert_no_relationship_to(store: &KnowledgeGraphStore, removed: &str) {
    for node in store.nodes() {
        assert!(
            node.relationships.iter().all(|r| r.target_id != removed),
            "node {} still references removed node {}",
            node.id,
            removed
        );
    }
}

/// Ids of a node list, in order
pub fn ids(nodes: &[KnowledgeNode]) -> Vec<String> {
    nodes.iter().map(|n| n.id.clone()).collect()
}

/// Ids reachable through one outgoing edge of `id`
pub fn direct_targets(store: &KnowledgeGraphStore, id: &str) -> HashSet<String> {
    store
        .outgoing_edges(id)
        .into_iter()
        .map(|edge| edge.target_id)
        .collect()
}

/// Wait until every background snapshot has been written.
pub fn wait_for_writes(persistence: &GraphPersistence) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while persistence.committed_generation() < persistence.issued_generation() {
        assert!(
            Instant::now() < deadline,
            "background graph writes did not finish in time"
        );
        thread::sleep(Duration::from_millis(10));
    }
}
