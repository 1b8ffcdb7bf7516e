//! Typed, directed relationships between story nodes

use super::node::{NodeId, Properties, PropertyValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for an edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

impl EdgeId {
    /// Create a new random EdgeId
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EdgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fixed set of relationship types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    /// Narrative flow between scenes and choices
    LeadsTo,
    /// A character takes part in a scene or event
    AppearsIn,
    Triggers,
    Requires,
    LocatedAt,
    /// A character makes a choice
    Makes,
    Owns,
    Knows,
    /// Container membership (story → chapter → scene)
    Contains,
    OccursIn,
}

impl RelationType {
    pub const ALL: [RelationType; 10] = [
        RelationType::LeadsTo,
        RelationType::AppearsIn,
        RelationType::Triggers,
        RelationType::Requires,
        RelationType::LocatedAt,
        RelationType::Makes,
        RelationType::Owns,
        RelationType::Knows,
        RelationType::Contains,
        RelationType::OccursIn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::LeadsTo => "LEADS_TO",
            RelationType::AppearsIn => "APPEARS_IN",
            RelationType::Triggers => "TRIGGERS",
            RelationType::Requires => "REQUIRES",
            RelationType::LocatedAt => "LOCATED_AT",
            RelationType::Makes => "MAKES",
            RelationType::Owns => "OWNS",
            RelationType::Knows => "KNOWS",
            RelationType::Contains => "CONTAINS",
            RelationType::OccursIn => "OCCURS_IN",
        }
    }

    /// Parse `LEADS_TO`, `leads_to` or `leads-to`
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(&normalized))
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed, typed edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Unique identifier
    pub id: EdgeId,
    pub relation: RelationType,
    /// Source node
    pub from: NodeId,
    /// Target node
    pub to: NodeId,
    /// Relationship-specific properties (e.g. `role` and `state` on APPEARS_IN)
    pub properties: Properties,
    pub created_at: DateTime<Utc>,
}

impl Edge {
    /// Create a new edge
    pub fn new(from: NodeId, to: NodeId, relation: RelationType) -> Self {
        Self {
            id: EdgeId::new(),
            relation,
            from,
            to,
            properties: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Whether this edge touches the given node at either end
    pub fn touches(&self, node: &NodeId) -> bool {
        &self.from == node || &self.to == node
    }
}
