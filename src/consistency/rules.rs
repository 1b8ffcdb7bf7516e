//! Rule registry: persisted, user-authored consistency rules
//!
//! Rules are stored and listed but never executed. `rule_logic` is kept as
//! an opaque string; the validator reports registered rules as a declared
//! but unimplemented check.

use super::types::ViolationCategory;
use crate::graph::{StoryError, StoryResult};
use crate::storage::RuleStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a consistency rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
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

impl Default for RuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored consistency rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyRule {
    pub id: RuleId,
    pub name: String,
    pub description: String,
    pub category: ViolationCategory,
    /// Opaque expression text, never evaluated
    pub rule_logic: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied fields for a new rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRule {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: ViolationCategory,
    pub rule_logic: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl NewRule {
    pub fn new(name: impl Into<String>, category: ViolationCategory, rule_logic: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            category,
            rule_logic: rule_logic.into(),
            enabled: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// CRUD front for the rule store
#[derive(Clone)]
pub struct RuleRegistry {
    store: Arc<dyn RuleStore>,
}

impl RuleRegistry {
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self { store }
    }

    /// Validate, stamp and persist a new rule.
    pub fn create_rule(&self, rule: NewRule) -> StoryResult<ConsistencyRule> {
        if rule.name.trim().is_empty() {
            return Err(StoryError::Validation("rule name must not be empty".into()));
        }
        if rule.rule_logic.trim().is_empty() {
            return Err(StoryError::Validation("rule logic must not be empty".into()));
        }

        let stored = ConsistencyRule {
            id: RuleId::new(),
            name: rule.name.trim().to_string(),
            description: rule.description,
            category: rule.category,
            rule_logic: rule.rule_logic,
            enabled: rule.enabled,
            created_at: Utc::now(),
        };
        self.store.save_rule(&stored)?;
        tracing::info!(rule_id = %stored.id, name = %stored.name, "registered consistency rule");
        Ok(stored)
    }

    pub fn get_rule(&self, id: &RuleId) -> StoryResult<ConsistencyRule> {
        self.store
            .load_rule(id)?
            .ok_or_else(|| StoryError::NotFound(format!("rule {}", id)))
    }

    pub fn set_enabled(&self, id: &RuleId, enabled: bool) -> StoryResult<ConsistencyRule> {
        let mut rule = self.get_rule(id)?;
        rule.enabled = enabled;
        self.store.save_rule(&rule)?;
        Ok(rule)
    }

    /// Every rule, newest first
    pub fn list_rules(&self) -> StoryResult<Vec<ConsistencyRule>> {
        Ok(self.store.list_rules()?)
    }

    /// Enabled rules, newest first
    pub fn list_enabled_rules(&self) -> StoryResult<Vec<ConsistencyRule>> {
        Ok(self
            .store
            .list_rules()?
            .into_iter()
            .filter(|r| r.enabled)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{OpenStore, SqliteStore};

    fn registry() -> RuleRegistry {
        RuleRegistry::new(Arc::new(SqliteStore::open_in_memory().unwrap()))
    }

    #[test]
    fn create_assigns_id_and_timestamp() {
        let reg = registry();
        let before = Utc::now();
        let rule = reg
            .create_rule(
                NewRule::new("no-time-travel", ViolationCategory::TimelineConflict, "scene.time > prev.time")
                    .with_description("scenes move forward"),
            )
            .unwrap();
        assert!(!rule.id.as_str().is_empty());
        assert!(rule.created_at >= before);
        assert!(rule.enabled);
        assert_eq!(reg.get_rule(&rule.id).unwrap(), rule);
    }

    #[test]
    fn blank_fields_are_rejected() {
        let reg = registry();
        let err = reg
            .create_rule(NewRule::new("  ", ViolationCategory::TraitViolation, "x"))
            .unwrap_err();
        assert!(matches!(err, StoryError::Validation(_)));

        let err = reg
            .create_rule(NewRule::new("named", ViolationCategory::TraitViolation, ""))
            .unwrap_err();
        assert!(matches!(err, StoryError::Validation(_)));
    }

    #[test]
    fn enabled_rules_newest_first() {
        let reg = registry();
        let first = reg
            .create_rule(NewRule::new("first", ViolationCategory::StateContradiction, "a"))
            .unwrap();
        let _hidden = reg
            .create_rule(NewRule::new("hidden", ViolationCategory::StateContradiction, "b").disabled())
            .unwrap();
        let third = reg
            .create_rule(NewRule::new("third", ViolationCategory::CharacterBehavior, "c"))
            .unwrap();

        let names: Vec<_> = reg
            .list_enabled_rules()
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(names, vec![third.id, first.id]);
        assert_eq!(reg.list_rules().unwrap().len(), 3);
    }

    #[test]
    fn toggling_enabled_persists() {
        let reg = registry();
        let rule = reg
            .create_rule(NewRule::new("r", ViolationCategory::TraitViolation, "x"))
            .unwrap();
        reg.set_enabled(&rule.id, false).unwrap();
        assert!(reg.list_enabled_rules().unwrap().is_empty());
        assert!(!reg.get_rule(&rule.id).unwrap().enabled);
    }

    #[test]
    fn missing_rule_is_not_found() {
        let err = registry().get_rule(&RuleId::from_string("nope")).unwrap_err();
        assert!(matches!(err, StoryError::NotFound(_)));
    }
}
