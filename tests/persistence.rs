//! Graph and rule persistence across reopen

mod common;

use common::StoryBuilder;
use std::sync::Arc;
use storygraph::{
    NewRule, OpenStore, RuleRegistry, SqliteStore, StoryApi, StoryConfig, StoryEngine, ViolationCategory,
};

#[tokio::test]
async fn story_survives_reopen_and_still_validates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("story.db");

    {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let engine = Arc::new(StoryEngine::with_store(store.clone()));
        let story = StoryBuilder::on(engine, "tides");
        story.scene("A", 1, Some(100));
        story.scene("B", 2, Some(50));

        let registry = RuleRegistry::new(store);
        registry
            .create_rule(NewRule::new(
                "monotone-time",
                ViolationCategory::TimelineConflict,
                "scene.narrative_time increases with sequence",
            ))
            .unwrap();
    }

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let engine = Arc::new(StoryEngine::with_store(store.clone()));
    let loaded = engine.load_all().unwrap();
    // story, two scenes
    assert_eq!(loaded, 3);
    assert_eq!(engine.edge_count(), 2);

    let api = StoryApi::with_defaults(engine, store, &StoryConfig::default());
    let result = api.validate("tides").await.data.unwrap();
    assert_eq!(result.violations.len(), 1);

    let rules = api.list_rules(true).data.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].name, "monotone-time");
}

#[tokio::test]
async fn deletes_are_written_through() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("story.db");

    {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let engine = Arc::new(StoryEngine::with_store(store.clone()));
        let story = StoryBuilder::on(engine.clone(), "tides");
        story.scene("A", 1, None);
        let api = StoryApi::with_defaults(engine, store, &StoryConfig::default());
        let deleted = api.delete_node("A").await.data.unwrap();
        assert_eq!(deleted.removed_relationships, 1);
        api.cache().flush().await;
    }

    let engine = StoryEngine::with_store(Arc::new(SqliteStore::open(&path).unwrap()));
    assert_eq!(engine.load_all().unwrap(), 1);
    assert_eq!(engine.edge_count(), 0);
}
