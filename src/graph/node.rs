//! Node representation in the story graph

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a node
///
/// Serializes as a plain string. Random ids are UUIDs; callers may also
/// supply semantic ids such as `"scene:opening"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a new random NodeId
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a NodeId from an existing string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The fixed set of node types a story graph may contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeType {
    /// Root container; its id is the story id
    Story,
    /// Container grouping scenes
    Chapter,
    Scene,
    Character,
    Choice,
    Event,
    Location,
    Item,
}

impl NodeType {
    pub const ALL: [NodeType; 8] = [
        NodeType::Story,
        NodeType::Chapter,
        NodeType::Scene,
        NodeType::Character,
        NodeType::Choice,
        NodeType::Event,
        NodeType::Location,
        NodeType::Item,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Story => "Story",
            NodeType::Chapter => "Chapter",
            NodeType::Scene => "Scene",
            NodeType::Character => "Character",
            NodeType::Choice => "Choice",
            NodeType::Event => "Event",
            NodeType::Location => "Location",
            NodeType::Item => "Item",
        }
    }

    /// Parse a type name, case-insensitively
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed property values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<PropertyValue>),
    Object(HashMap<String, PropertyValue>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view; integers widen to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Int(i) => Some(*i as f64),
            PropertyValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, PropertyValue>> {
        match self {
            PropertyValue::Object(map) => Some(map),
            _ => None,
        }
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Null => f.write_str("null"),
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Int(i) => write!(f, "{}", i),
            PropertyValue::Float(x) => write!(f, "{}", x),
            PropertyValue::String(s) => f.write_str(s),
            other => match serde_json::to_string(other) {
                Ok(json) => f.write_str(&json),
                Err(_) => f.write_str("<unprintable>"),
            },
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Int(i)
    }
}

impl From<f64> for PropertyValue {
    fn from(x: f64) -> Self {
        PropertyValue::Float(x)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

/// Properties collection
pub type Properties = HashMap<String, PropertyValue>;

/// Property holding the id of the story a node belongs to
pub const STORY_ID_PROPERTY: &str = "story_id";

/// A node in the story graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier
    pub id: NodeId,
    /// Fixed after creation
    pub node_type: NodeType,
    /// Type-specific properties
    pub properties: Properties,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Create a new node with a random id
    pub fn new(node_type: NodeType) -> Self {
        Self::with_id(NodeId::new(), node_type)
    }

    /// Create a new node with a caller-supplied id
    pub fn with_id(id: NodeId, node_type: NodeType) -> Self {
        let now = Utc::now();
        Self {
            id,
            node_type,
            properties: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a property to the node
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Mark the node as a member of a story
    pub fn in_story(self, story_id: &NodeId) -> Self {
        self.with_property(STORY_ID_PROPERTY, story_id.as_str())
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// The story this node belongs to. A Story node belongs to itself.
    pub fn story_id(&self) -> Option<NodeId> {
        if self.node_type == NodeType::Story {
            return Some(self.id.clone());
        }
        self.property(STORY_ID_PROPERTY)
            .and_then(PropertyValue::as_str)
            .map(NodeId::from)
    }

    /// Display name: the `name` or `title` property, falling back to the id
    pub fn label(&self) -> String {
        self.property("name")
            .or_else(|| self.property("title"))
            .and_then(PropertyValue::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_parses_case_insensitively() {
        assert_eq!(NodeType::parse("scene"), Some(NodeType::Scene));
        assert_eq!(NodeType::parse(" Character "), Some(NodeType::Character));
        assert_eq!(NodeType::parse("Dragon"), None);
    }

    #[test]
    fn story_node_belongs_to_itself() {
        let story = Node::with_id(NodeId::from("story:1"), NodeType::Story);
        assert_eq!(story.story_id(), Some(NodeId::from("story:1")));

        let scene = Node::new(NodeType::Scene).in_story(&story.id);
        assert_eq!(scene.story_id(), Some(NodeId::from("story:1")));

        let orphan = Node::new(NodeType::Item);
        assert_eq!(orphan.story_id(), None);
    }

    #[test]
    fn int_widens_to_float() {
        assert_eq!(PropertyValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(PropertyValue::from("x").as_f64(), None);
    }

    #[test]
    fn label_prefers_name() {
        let n = Node::with_id(NodeId::from("c1"), NodeType::Character).with_property("name", "Mara");
        assert_eq!(n.label(), "Mara");
        let m = Node::with_id(NodeId::from("c2"), NodeType::Character);
        assert_eq!(m.label(), "c2");
    }
}
