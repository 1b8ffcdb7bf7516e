//! Query execution against the in-process StoryEngine

use super::types::{GraphQuery, Query, QueryError, QueryPattern, QuerySession, Record};
use crate::graph::{Direction, Edge, Node, NodeFilter, NodeId, NodeType, PropertyValue, RelationType, StoryEngine};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Query collaborator backed by a `StoryEngine`
///
/// Counts open sessions so callers can verify that every session they
/// acquire is released.
#[derive(Clone)]
pub struct EngineQuery {
    engine: Arc<StoryEngine>,
    open_sessions: Arc<AtomicUsize>,
}

impl EngineQuery {
    pub fn new(engine: Arc<StoryEngine>) -> Self {
        Self {
            engine,
            open_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sessions acquired and not yet dropped
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GraphQuery for EngineQuery {
    async fn open_session(&self) -> Result<Box<dyn QuerySession>, QueryError> {
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(EngineSession {
            engine: self.engine.clone(),
            open_sessions: self.open_sessions.clone(),
        }))
    }
}

struct EngineSession {
    engine: Arc<StoryEngine>,
    open_sessions: Arc<AtomicUsize>,
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl QuerySession for EngineSession {
    async fn run(&self, query: &Query) -> Result<Vec<Record>, QueryError> {
        let story_id = NodeId::from(query.str_param("story_id")?);
        let records = match query.pattern {
            QueryPattern::StoryExists => self.story_exists(&story_id),
            QueryPattern::CharacterRoles => self.character_roles(&story_id),
            QueryPattern::SceneTimeline => self.scene_timeline(&story_id),
            QueryPattern::CharacterStates => self.character_states(&story_id),
            QueryPattern::CharacterChoices => self.character_choices(&story_id),
        };
        Ok(records)
    }
}

fn numeric(node: &Node, key: &str) -> Option<f64> {
    node.property(key).and_then(PropertyValue::as_f64)
}

impl EngineSession {
    fn characters(&self, story_id: &NodeId) -> Vec<Node> {
        self.engine.list_nodes(
            &NodeFilter::new()
                .in_story(story_id.clone())
                .with_type(NodeType::Character),
        )
    }

    /// Scenes a character appears in, with the appearance edge, in edge order
    fn appearances(&self, character: &Node) -> Vec<(Edge, Node)> {
        self.engine
            .edges_of(&character.id, Direction::Outgoing)
            .into_iter()
            .filter(|e| e.relation == RelationType::AppearsIn)
            .filter_map(|e| {
                let scene = self.engine.get_node(&e.to)?;
                (scene.node_type == NodeType::Scene).then_some((e, scene))
            })
            .collect()
    }

    fn story_exists(&self, story_id: &NodeId) -> Vec<Record> {
        match self.engine.get_node(story_id) {
            Some(node) if node.node_type == NodeType::Story => vec![Record::new()
                .with("story_id", node.id.as_str())
                .with("title", node.label())],
            _ => Vec::new(),
        }
    }

    fn character_roles(&self, story_id: &NodeId) -> Vec<Record> {
        let mut records = Vec::new();
        for character in self.characters(story_id) {
            let has_arc = character
                .property("arc")
                .and_then(PropertyValue::as_str)
                .is_some_and(|arc| !arc.trim().is_empty());
            for (edge, scene) in self.appearances(&character) {
                let Some(role) = edge.property("role").and_then(PropertyValue::as_str) else {
                    continue;
                };
                records.push(
                    Record::new()
                        .with("character_id", character.id.as_str())
                        .with("character_name", character.label())
                        .with("has_arc", has_arc)
                        .with("scene_id", scene.id.as_str())
                        .with("role", role),
                );
            }
        }
        records
    }

    fn scene_timeline(&self, story_id: &NodeId) -> Vec<Record> {
        let mut scenes: Vec<(f64, Node, f64)> = self
            .engine
            .list_nodes(
                &NodeFilter::new()
                    .in_story(story_id.clone())
                    .with_type(NodeType::Scene),
            )
            .into_iter()
            .filter_map(|scene| {
                let sequence = numeric(&scene, "sequence")?;
                let time = numeric(&scene, "narrative_time")?;
                Some((sequence, scene, time))
            })
            .collect();
        scenes.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));

        scenes
            .into_iter()
            .map(|(sequence, scene, time)| {
                Record::new()
                    .with("scene_id", scene.id.as_str())
                    .with("title", scene.label())
                    .with("sequence", sequence)
                    .with("narrative_time", time)
            })
            .collect()
    }

    fn character_states(&self, story_id: &NodeId) -> Vec<Record> {
        let mut records = Vec::new();
        for character in self.characters(story_id) {
            let mut snapshots: Vec<(f64, Node, PropertyValue)> = self
                .appearances(&character)
                .into_iter()
                .filter_map(|(edge, scene)| {
                    let sequence = numeric(&scene, "sequence")?;
                    let state = edge.property("state")?;
                    state.as_object()?;
                    Some((sequence, scene, state.clone()))
                })
                .collect();
            snapshots.sort_by(|a, b| a.0.total_cmp(&b.0));

            for (sequence, scene, state) in snapshots {
                records.push(
                    Record::new()
                        .with("character_id", character.id.as_str())
                        .with("character_name", character.label())
                        .with("scene_id", scene.id.as_str())
                        .with("sequence", sequence)
                        .with("state", state),
                );
            }
        }
        records
    }

    fn character_choices(&self, story_id: &NodeId) -> Vec<Record> {
        let mut records = Vec::new();
        for character in self.characters(story_id) {
            let Some(traits) = character.property("traits").and_then(PropertyValue::as_array) else {
                continue;
            };
            if traits.is_empty() {
                continue;
            }
            let choices = self
                .engine
                .edges_of(&character.id, Direction::Outgoing)
                .into_iter()
                .filter(|e| e.relation == RelationType::Makes)
                .filter_map(|e| self.engine.get_node(&e.to))
                .filter(|n| n.node_type == NodeType::Choice);

            for choice in choices {
                let Some(text) = choice.property("text").and_then(PropertyValue::as_str) else {
                    continue;
                };
                records.push(
                    Record::new()
                        .with("character_id", character.id.as_str())
                        .with("character_name", character.label())
                        .with("traits", PropertyValue::Array(traits.to_vec()))
                        .with("choice_id", choice.id.as_str())
                        .with("text", text),
                );
            }
        }
        records
    }
}
