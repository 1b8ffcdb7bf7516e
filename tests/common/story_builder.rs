//! Builds small stories directly on a `StoryEngine`

use std::collections::HashMap;
use std::sync::Arc;
use storygraph::{
    Node, NodeId, NodeType, OpenStore, PropertyValue, RelationType, SqliteStore, StoryApi, StoryConfig,
    StoryEngine,
};

pub struct StoryBuilder {
    pub engine: Arc<StoryEngine>,
    pub story: NodeId,
}

impl StoryBuilder {
    pub fn new(story_id: &str) -> Self {
        Self::on(Arc::new(StoryEngine::new()), story_id)
    }

    /// Start a story on an existing engine
    pub fn on(engine: Arc<StoryEngine>, story_id: &str) -> Self {
        let story = engine
            .create_node(Node::with_id(NodeId::from(story_id), NodeType::Story).with_property("title", story_id))
            .expect("create story")
            .id;
        Self { engine, story }
    }

    pub fn scene(&self, id: &str, sequence: i64, narrative_time: Option<i64>) -> NodeId {
        let mut node = Node::with_id(NodeId::from(id), NodeType::Scene)
            .in_story(&self.story)
            .with_property("title", id)
            .with_property("sequence", sequence);
        if let Some(time) = narrative_time {
            node = node.with_property("narrative_time", time);
        }
        let scene = self.engine.create_node(node).expect("create scene").id;
        self.engine
            .create_edge(&self.story, &scene, RelationType::Contains, HashMap::new())
            .expect("story contains scene");
        scene
    }

    pub fn character(&self, id: &str, name: &str, traits: &[&str], arc: Option<&str>) -> NodeId {
        let traits = PropertyValue::Array(traits.iter().map(|t| PropertyValue::from(*t)).collect());
        let mut node = Node::with_id(NodeId::from(id), NodeType::Character)
            .in_story(&self.story)
            .with_property("name", name)
            .with_property("traits", traits);
        if let Some(arc) = arc {
            node = node.with_property("arc", arc);
        }
        self.engine.create_node(node).expect("create character").id
    }

    /// Character appears in a scene, optionally in a role and with a state snapshot
    pub fn appears(&self, character: &NodeId, scene: &NodeId, role: Option<&str>, state: &[(&str, PropertyValue)]) {
        let mut props = HashMap::new();
        if let Some(role) = role {
            props.insert("role".to_string(), PropertyValue::from(role));
        }
        if !state.is_empty() {
            let snapshot = state.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
            props.insert("state".to_string(), PropertyValue::Object(snapshot));
        }
        self.engine
            .create_edge(character, scene, RelationType::AppearsIn, props)
            .expect("character appears in scene");
    }

    pub fn choice(&self, character: &NodeId, id: &str, text: &str) -> NodeId {
        let choice = self
            .engine
            .create_node(
                Node::with_id(NodeId::from(id), NodeType::Choice)
                    .in_story(&self.story)
                    .with_property("text", text),
            )
            .expect("create choice")
            .id;
        self.engine
            .create_edge(character, &choice, RelationType::Makes, HashMap::new())
            .expect("character makes choice");
        choice
    }

    /// API over this story's engine with in-memory rules and default config
    pub fn api(&self) -> StoryApi {
        self.api_with(&StoryConfig::default())
    }

    pub fn api_with(&self, config: &StoryConfig) -> StoryApi {
        let rules = Arc::new(SqliteStore::open_in_memory().expect("in-memory store"));
        StoryApi::with_defaults(self.engine.clone(), rules, config)
    }
}
