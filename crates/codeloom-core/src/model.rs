//! Knowledge Graph Data Model
//!
//! Typed nodes and directed, typed relationships. Nodes reference each other
//! by id only; the store owns every node and hands out clones.
//!
//! Relationships may point at ids that are not (yet) in the store. Every
//! declared relationship has a derived inverse (`contains` → `contained_by`)
//! which the store records on the target so traversal works in both
//! directions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Open, string-keyed metadata attached to nodes and documents.
pub type Metadata = BTreeMap<String, serde_json::Value>;

// ============================================================================
// Node Types
// ============================================================================

/// Classification of a knowledge node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Source file
    File,
    /// Free function or method
    Function,
    /// Class, struct or other type definition
    Class,
    /// Module, package or namespace
    Module,
    /// Domain concept not tied to a single code entity
    Concept,
    /// Error type or recorded failure
    Error,
}

impl NodeType {
    /// All node types, in declaration order.
    pub const ALL: [NodeType; 6] = [
        NodeType::File,
        NodeType::Function,
        NodeType::Class,
        NodeType::Module,
        NodeType::Concept,
        NodeType::Error,
    ];

    /// Get the string representation used in JSON and rendered context
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::File => "file",
            NodeType::Function => "function",
            NodeType::Class => "class",
            NodeType::Module => "module",
            NodeType::Concept => "concept",
            NodeType::Error => "error",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown node type '{}'", s))
    }
}

// ============================================================================
// Relationship Types
// ============================================================================

/// Type of a directed relationship.
///
/// The first five variants are declared by callers; the `*_by` variants are
/// only ever produced by reverse derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Imports,
    Calls,
    Contains,
    References,
    Implements,
    ImportedBy,
    CalledBy,
    ContainedBy,
    ReferencedBy,
    ImplementedBy,
}

impl RelationshipType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Imports => "imports",
            RelationshipType::Calls => "calls",
            RelationshipType::Contains => "contains",
            RelationshipType::References => "references",
            RelationshipType::Implements => "implements",
            RelationshipType::ImportedBy => "imported_by",
            RelationshipType::CalledBy => "called_by",
            RelationshipType::ContainedBy => "contained_by",
            RelationshipType::ReferencedBy => "referenced_by",
            RelationshipType::ImplementedBy => "implemented_by",
        }
    }

    /// The type recorded on the target when this relationship is declared.
    ///
    /// Applying `inverse` twice yields the original type.
    pub fn inverse(&self) -> RelationshipType {
        match self {
            RelationshipType::Imports => RelationshipType::ImportedBy,
            RelationshipType::Calls => RelationshipType::CalledBy,
            RelationshipType::Contains => RelationshipType::ContainedBy,
            RelationshipType::References => RelationshipType::ReferencedBy,
            RelationshipType::Implements => RelationshipType::ImplementedBy,
            RelationshipType::ImportedBy => RelationshipType::Imports,
            RelationshipType::CalledBy => RelationshipType::Calls,
            RelationshipType::ContainedBy => RelationshipType::Contains,
            RelationshipType::ReferencedBy => RelationshipType::References,
            RelationshipType::ImplementedBy => RelationshipType::Implements,
        }
    }

    /// Whether this type only arises from reverse derivation
    pub fn is_derived(&self) -> bool {
        matches!(
            self,
            RelationshipType::ImportedBy
                | RelationshipType::CalledBy
                | RelationshipType::ContainedBy
                | RelationshipType::ReferencedBy
                | RelationshipType::ImplementedBy
        )
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Relationships
// ============================================================================

/// A relationship declared on a node, pointing at another node by id.
///
/// Only the five declarable types deserialize; `*_by` types are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    /// Target node id (may not exist in the store)
    pub target_id: String,

    /// Relationship type
    #[serde(rename = "type", deserialize_with = "declared_type")]
    pub relationship_type: RelationshipType,

    /// Optional edge weight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f32>,
}

impl Relationship {
    /// Create an unweighted relationship
    pub fn new(target_id: impl Into<String>, relationship_type: RelationshipType) -> Self {
        Self {
            target_id: target_id.into(),
            relationship_type,
            weight: None,
        }
    }

    /// Set the weight
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = Some(weight);
        self
    }
}

fn declared_type<'de, D>(deserializer: D) -> Result<RelationshipType, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let relationship_type = RelationshipType::deserialize(deserializer)?;
    if relationship_type.is_derived() {
        return Err(serde::de::Error::custom(format!(
            "relationship type '{}' is derived and cannot be declared",
            relationship_type
        )));
    }
    Ok(relationship_type)
}

/// A synthetic edge recorded on the target of a declared relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseEdge {
    /// Node that declared the original relationship
    pub source_id: String,

    /// Inverse relationship type
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f32>,
}

/// A relationship flattened into an explicit source/target tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatRelationship {
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f32>,
}

impl FlatRelationship {
    /// Render as `source --type--> target`
    pub fn describe(&self) -> String {
        format!(
            "{} --{}--> {}",
            self.source_id, self.relationship_type, self.target_id
        )
    }
}

// ============================================================================
// Knowledge Node
// ============================================================================

/// A typed, named entity in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeNode {
    /// Unique id within a store
    pub id: String,

    /// Node classification
    #[serde(rename = "type")]
    pub node_type: NodeType,

    /// Display name
    pub name: String,

    /// Free-text content (source snippet, description, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Arbitrary metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Declared outgoing relationships, in declaration order
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl KnowledgeNode {
    /// Create a node with no content, metadata or relationships
    pub fn new(id: impl Into<String>, node_type: NodeType, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type,
            name: name.into(),
            content: None,
            metadata: Metadata::new(),
            relationships: Vec::new(),
        }
    }

    /// Set the content
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Declare a relationship to another node
    pub fn with_relationship(
        mut self,
        target_id: impl Into<String>,
        relationship_type: RelationshipType,
    ) -> Self {
        self.relationships
            .push(Relationship::new(target_id, relationship_type));
        self
    }

    /// Declared relationships flattened with this node as source
    pub fn flat_relationships(&self) -> impl Iterator<Item = FlatRelationship> + '_ {
        self.relationships.iter().map(move |rel| FlatRelationship {
            source_id: self.id.clone(),
            target_id: rel.target_id.clone(),
            relationship_type: rel.relationship_type,
            weight: rel.weight,
        })
    }

    /// Case-insensitive substring match over name or content.
    ///
    /// `needle_lower` must already be lower-cased.
    pub fn matches_term(&self, needle_lower: &str) -> bool {
        self.name.to_lowercase().contains(needle_lower)
            || self
                .content
                .as_deref()
                .is_some_and(|c| c.to_lowercase().contains(needle_lower))
    }

    /// String value of a metadata key, if present and a string
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}
