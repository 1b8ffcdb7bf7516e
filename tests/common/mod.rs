//! Shared helpers for storygraph integration tests

pub mod story_builder;

pub use story_builder::StoryBuilder;
