//! Transport-independent API layer
//!
//! `StoryApi` is the single entry point for consumer-facing operations.
//! Each method corresponds to one route and answers with an `Envelope`
//! serialized exactly as the HTTP response body would be. Mutations run
//! gate → commit → invalidate; reads go through the cache.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{
    derive_key, paths, CacheConfig, CacheCoordinator, CacheMetrics, Cached, CachedRead, Invalidation,
    MemoryCacheStore, Mutation, ResourceClass,
};
use crate::compat::{check_names, Compatibility};
use crate::config::StoryConfig;
use crate::consistency::{
    ConsistencyReport, ConsistencyRule, ConsistencyValidator, NewRule, RuleId, RuleRegistry, ValidationResult,
};
use crate::graph::{
    Direction, Edge, EdgeId, GraphStats, Node, NodeFilter, NodeId, NodeType, Properties, RelationType, StoryEngine,
    StoryError, StoryResult,
};
use crate::query::EngineQuery;
use crate::storage::RuleStore;

/// Error body of a failed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    /// HTTP status; carried by the transport, not the body
    #[serde(skip)]
    pub status: u16,
}

impl From<&StoryError> for ApiError {
    fn from(e: &StoryError) -> Self {
        Self {
            code: e.code().to_string(),
            message: e.to_string(),
            status: e.status(),
        }
    }
}

/// Uniform response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    pub timestamp: DateTime<Utc>,
    /// Present on cacheable reads: whether the data came from the cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
            cached: None,
        }
    }

    pub fn fail(error: &StoryError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError::from(error)),
            timestamp: Utc::now(),
            cached: None,
        }
    }

    pub fn from_result(result: StoryResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::fail(&e),
        }
    }

    fn from_cached(result: StoryResult<Cached<T>>) -> Self {
        match result {
            Ok(Cached { value, from_cache }) => Self {
                cached: Some(from_cache),
                ..Self::ok(value)
            },
            Err(e) => Self::fail(&e),
        }
    }

    /// HTTP-equivalent status
    pub fn status(&self) -> u16 {
        match &self.error {
            None => 200,
            Some(e) => e.status,
        }
    }
}

/// Body of a node-create request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNodeRequest {
    /// Caller-chosen id; random when absent
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub properties: Properties,
}

/// Body of a relationship-create request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRelationshipRequest {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub relation: String,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedNode {
    pub id: NodeId,
    pub removed_relationships: usize,
}

/// Single entry point for consumer-facing operations
#[derive(Clone)]
pub struct StoryApi {
    engine: Arc<StoryEngine>,
    validator: Arc<ConsistencyValidator>,
    rules: RuleRegistry,
    cache: CacheCoordinator,
}

impl StoryApi {
    pub fn new(
        engine: Arc<StoryEngine>,
        validator: Arc<ConsistencyValidator>,
        rules: RuleRegistry,
        cache: CacheCoordinator,
    ) -> Self {
        Self {
            engine,
            validator,
            rules,
            cache,
        }
    }

    /// Wire the reference collaborators around an engine: engine-backed
    /// queries and an in-process cache store
    pub fn with_defaults(engine: Arc<StoryEngine>, rule_store: Arc<dyn RuleStore>, config: &StoryConfig) -> Self {
        let query = Arc::new(EngineQuery::new(engine.clone()));
        let validator = ConsistencyValidator::new(query).with_config(config.validator.clone());
        let cache = cache_for(&config.cache);
        Self::new(engine, Arc::new(validator), RuleRegistry::new(rule_store), cache)
    }

    pub fn engine(&self) -> &Arc<StoryEngine> {
        &self.engine
    }

    pub fn cache(&self) -> &CacheCoordinator {
        &self.cache
    }

    // --- Validation ---

    /// POST /validate/{storyId}. Violations found is still a success.
    pub async fn validate(&self, story_id: &str) -> Envelope<ValidationResult> {
        Envelope::from_result(self.validator.validate_story(&NodeId::from(story_id)).await)
    }

    /// GET /report/{storyId}
    pub async fn report(&self, story_id: &str) -> Envelope<ConsistencyReport> {
        Envelope::from_result(self.validator.generate_report(&NodeId::from(story_id)).await)
    }

    // --- Mutations ---

    /// POST /nodes
    pub async fn create_node(&self, request: CreateNodeRequest) -> Envelope<Node> {
        let result = Invalidation::new(&self.cache)
            .run(
                || async {
                    let node_type = NodeType::parse(&request.node_type).ok_or_else(|| {
                        StoryError::Validation(format!("unknown node type: {}", request.node_type))
                    })?;
                    let mut node = match &request.id {
                        Some(id) if id.trim().is_empty() => {
                            return Err(StoryError::Validation("node id must not be blank".into()))
                        }
                        Some(id) => Node::with_id(NodeId::from(id.as_str()), node_type),
                        None => Node::new(node_type),
                    };
                    node.properties = request.properties.clone();
                    self.engine.create_node(node)
                },
                |node: &Node| Mutation::Node(node.id.clone()),
            )
            .await;
        Envelope::from_result(result)
    }

    /// PATCH /nodes/{id}
    pub async fn update_node(&self, id: &str, patch: Properties) -> Envelope<Node> {
        let id = NodeId::from(id);
        let result = Invalidation::new(&self.cache)
            .run(
                || async { self.engine.update_node(&id, patch) },
                |node: &Node| Mutation::Node(node.id.clone()),
            )
            .await;
        Envelope::from_result(result)
    }

    /// DELETE /nodes/{id}; incident relationships go with it
    pub async fn delete_node(&self, id: &str) -> Envelope<DeletedNode> {
        let id = NodeId::from(id);
        let result = Invalidation::new(&self.cache)
            .run(
                || async {
                    let removed = self.engine.delete_node(&id)?;
                    let mut neighbors: Vec<NodeId> = Vec::new();
                    for edge in &removed {
                        for end in [&edge.from, &edge.to] {
                            if *end != id && !neighbors.contains(end) {
                                neighbors.push(end.clone());
                            }
                        }
                    }
                    Ok::<_, StoryError>((removed.len(), neighbors))
                },
                |(_, neighbors): &(usize, Vec<NodeId>)| Mutation::NodeDeleted {
                    id: id.clone(),
                    neighbors: neighbors.clone(),
                },
            )
            .await;
        Envelope::from_result(result.map(|(removed, _)| DeletedNode {
            id: id.clone(),
            removed_relationships: removed,
        }))
    }

    /// POST /relationships. The compatibility gate runs before the write.
    pub async fn create_relationship(&self, request: CreateRelationshipRequest) -> Envelope<Edge> {
        let result = Invalidation::new(&self.cache)
            .run(
                || async {
                    let relation = RelationType::parse(&request.relation).ok_or_else(|| {
                        StoryError::Validation(format!("unknown relationship type: {}", request.relation))
                    })?;
                    self.engine.create_edge(
                        &NodeId::from(request.from.as_str()),
                        &NodeId::from(request.to.as_str()),
                        relation,
                        request.properties.clone(),
                    )
                },
                |edge: &Edge| Mutation::Relationship {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                },
            )
            .await;
        Envelope::from_result(result)
    }

    /// DELETE /relationships/{id}
    pub async fn delete_relationship(&self, id: &str) -> Envelope<Edge> {
        let id = EdgeId::from_string(id);
        let result = Invalidation::new(&self.cache)
            .run(
                || async { self.engine.delete_edge(&id) },
                |edge: &Edge| Mutation::Relationship {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                },
            )
            .await;
        Envelope::from_result(result)
    }

    // --- Cached reads ---

    /// GET /nodes/{id}
    pub async fn get_node(&self, id: &str) -> Envelope<Node> {
        let id = NodeId::from(id);
        let key = derive_key(&paths::node(&id), None);
        let result = CachedRead::new(&self.cache, key, ResourceClass::Node)
            .run(|| async { self.engine.require_node(&id) })
            .await;
        Envelope::from_cached(result)
    }

    /// GET /nodes?type=..&story_id=..&limit=..&offset=..
    pub async fn list_nodes(&self, filter: NodeFilter) -> Envelope<Vec<Node>> {
        let params = match serde_json::to_value(&filter) {
            Ok(params) => params,
            Err(e) => return Envelope::fail(&StoryError::Validation(e.to_string())),
        };
        let key = derive_key(paths::NODES, Some(&params));
        let result = CachedRead::new(&self.cache, key, ResourceClass::NodeList)
            .run(|| async { Ok(self.engine.list_nodes(&filter)) })
            .await;
        Envelope::from_cached(result)
    }

    /// GET /nodes/{id}/relationships?direction=..
    pub async fn node_relationships(&self, id: &str, direction: Direction) -> Envelope<Vec<Edge>> {
        let id = NodeId::from(id);
        let key = derive_key(
            &paths::node_relationships(&id),
            Some(&serde_json::json!({ "direction": direction })),
        );
        let result = CachedRead::new(&self.cache, key, ResourceClass::Relationships)
            .run(|| async {
                self.engine.require_node(&id)?;
                Ok(self.engine.edges_of(&id, direction))
            })
            .await;
        Envelope::from_cached(result)
    }

    /// GET /graph/neighbors/{id}
    pub async fn neighbors(&self, id: &str) -> Envelope<Vec<Node>> {
        let id = NodeId::from(id);
        let key = derive_key(&paths::neighbors(&id), None);
        let result = CachedRead::new(&self.cache, key, ResourceClass::GraphTraversal)
            .run(|| async { self.engine.neighbors(&id) })
            .await;
        Envelope::from_cached(result)
    }

    /// GET /stats
    pub async fn stats(&self) -> Envelope<GraphStats> {
        let key = derive_key(paths::STATS, None);
        let result = CachedRead::new(&self.cache, key, ResourceClass::Stats)
            .run(|| async { Ok(self.engine.stats()) })
            .await;
        Envelope::from_cached(result)
    }

    // --- Rules ---

    /// POST /rules
    pub fn create_rule(&self, rule: NewRule) -> Envelope<ConsistencyRule> {
        Envelope::from_result(self.rules.create_rule(rule))
    }

    /// GET /rules?enabled=true
    pub fn list_rules(&self, enabled_only: bool) -> Envelope<Vec<ConsistencyRule>> {
        let result = if enabled_only {
            self.rules.list_enabled_rules()
        } else {
            self.rules.list_rules()
        };
        Envelope::from_result(result)
    }

    /// PATCH /rules/{id}
    pub fn set_rule_enabled(&self, id: &str, enabled: bool) -> Envelope<ConsistencyRule> {
        Envelope::from_result(self.rules.set_enabled(&RuleId::from_string(id), enabled))
    }

    // --- Compatibility ---

    /// GET /compatibility?from=..&relation=..&to=..
    pub fn check_compatibility(&self, from: &str, relation: &str, to: &str) -> Envelope<Compatibility> {
        let verdict = check_names(from, to, relation);
        debug!(from, relation, to, valid = verdict.valid, "compatibility check");
        Envelope::ok(verdict)
    }
}

fn cache_for(config: &CacheConfig) -> CacheCoordinator {
    CacheCoordinator::new(
        Arc::new(MemoryCacheStore::new()),
        config.clone(),
        Arc::new(CacheMetrics::new()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{OpenStore, SqliteStore};
    use std::collections::HashMap;

    fn setup() -> StoryApi {
        let engine = Arc::new(StoryEngine::new());
        let rules = Arc::new(SqliteStore::open_in_memory().unwrap());
        StoryApi::with_defaults(engine, rules, &StoryConfig::default())
    }

    fn node_request(id: &str, node_type: &str) -> CreateNodeRequest {
        CreateNodeRequest {
            id: Some(id.to_string()),
            node_type: node_type.to_string(),
            properties: HashMap::new(),
        }
    }

    fn relationship(from: &str, relation: &str, to: &str) -> CreateRelationshipRequest {
        CreateRelationshipRequest {
            from: from.to_string(),
            to: to.to_string(),
            relation: relation.to_string(),
            properties: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn envelope_shape() {
        let api = setup();
        let created = api.create_node(node_request("s1", "scene")).await;
        let json = serde_json::to_value(&created).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["id"], "s1");
        assert!(json.get("error").is_none());
        assert!(json.get("cached").is_none());
        assert!(json["timestamp"].is_string());

        let missing = api.get_node("nope").await;
        let json = serde_json::to_value(&missing).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "NOT_FOUND");
        assert!(json["error"].get("status").is_none());
        assert_eq!(missing.status(), 404);
    }

    #[tokio::test]
    async fn unknown_node_type_is_a_validation_error() {
        let api = setup();
        let response = api.create_node(node_request("x", "Dragon")).await;
        assert_eq!(response.error.unwrap().code, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn gate_blocks_incompatible_relationship() {
        let api = setup();
        api.create_node(node_request("loc", "Location")).await;
        api.create_node(node_request("item", "Item")).await;

        let response = api.create_relationship(relationship("loc", "OWNS", "item")).await;
        assert!(!response.success);
        let error = response.error.unwrap();
        assert_eq!(error.code, "INCOMPATIBLE_RELATIONSHIP");
        assert_eq!(error.status, 400);
        assert!(error.message.contains("Location"));
        assert!(error.message.contains("OWNS"));
        assert!(error.message.contains("Item"));
        assert_eq!(api.engine().edge_count(), 0);
    }

    #[tokio::test]
    async fn reads_are_cached_until_a_mutation() {
        let api = setup();
        api.create_node(node_request("s1", "Scene")).await;
        api.cache().flush().await;

        assert_eq!(api.get_node("s1").await.cached, Some(false));
        api.cache().flush().await;
        assert_eq!(api.get_node("s1").await.cached, Some(true));

        let mut patch = HashMap::new();
        patch.insert("title".to_string(), "Harbor".into());
        api.update_node("s1", patch).await;
        api.cache().flush().await;

        let fresh = api.get_node("s1").await;
        assert_eq!(fresh.cached, Some(false));
        assert_eq!(
            fresh.data.unwrap().property("title").and_then(|v| v.as_str()),
            Some("Harbor")
        );
    }

    #[tokio::test]
    async fn relationship_mutation_refreshes_endpoint_reads() {
        let api = setup();
        api.create_node(node_request("mara", "Character")).await;
        api.create_node(node_request("s1", "Scene")).await;
        api.cache().flush().await;

        assert!(api.node_relationships("mara", Direction::Outgoing).await.data.unwrap().is_empty());
        assert_eq!(api.stats().await.data.unwrap().edge_count, 0);
        api.cache().flush().await;

        let created = api.create_relationship(relationship("mara", "appears-in", "s1")).await;
        assert!(created.success);
        api.cache().flush().await;

        let edges = api.node_relationships("mara", Direction::Outgoing).await;
        assert_eq!(edges.cached, Some(false));
        assert_eq!(edges.data.unwrap().len(), 1);
        assert_eq!(api.stats().await.data.unwrap().edge_count, 1);
    }

    #[tokio::test]
    async fn delete_node_reports_cascade() {
        let api = setup();
        api.create_node(node_request("mara", "Character")).await;
        api.create_node(node_request("s1", "Scene")).await;
        api.create_relationship(relationship("mara", "APPEARS_IN", "s1")).await;
        api.cache().flush().await;
        assert_eq!(api.neighbors("s1").await.data.unwrap().len(), 1);
        api.cache().flush().await;

        let deleted = api.delete_node("mara").await.data.unwrap();
        assert_eq!(deleted.removed_relationships, 1);
        api.cache().flush().await;
        let neighbors = api.neighbors("s1").await;
        assert_eq!(neighbors.cached, Some(false));
        assert!(neighbors.data.unwrap().is_empty());
    }

    #[tokio::test]
    async fn validate_unknown_story_is_not_found() {
        let api = setup();
        let response = api.validate("ghost").await;
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn rules_round_trip_through_api() {
        let api = setup();
        let rule = api
            .create_rule(NewRule::new(
                "ages-forward",
                crate::consistency::ViolationCategory::StateContradiction,
                "age(next) >= age(prev)",
            ))
            .data
            .unwrap();
        assert_eq!(api.list_rules(true).data.unwrap().len(), 1);
        api.set_rule_enabled(rule.id.as_str(), false);
        assert!(api.list_rules(true).data.unwrap().is_empty());
        assert_eq!(api.list_rules(false).data.unwrap().len(), 1);
        assert_eq!(api.set_rule_enabled("missing", true).status(), 404);
    }

    #[tokio::test]
    async fn compatibility_endpoint() {
        let api = setup();
        let ok = api.check_compatibility("Character", "KNOWS", "Character").data.unwrap();
        assert!(ok.valid);
        let bad = api.check_compatibility("Scene", "KNOWS", "Character").data.unwrap();
        assert!(!bad.valid);
        assert!(bad.reason.is_some());
    }
}
