//! State contradictions between consecutive character snapshots

use crate::consistency::types::{ConsistencyViolation, Severity, ViolationCategory};
use crate::graph::{NodeId, PropertyValue};
use crate::query::{QueryError, Record};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Thresholds for the state transition predicates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateRules {
    /// Numeric attributes that may not fall sharply in one step
    pub bounded_attributes: Vec<String>,
    /// Largest allowed single-step drop for a bounded attribute
    pub skill_drop_threshold: f64,
}

impl Default for StateRules {
    fn default() -> Self {
        Self {
            bounded_attributes: vec!["skill_level".to_string()],
            skill_drop_threshold: 2.0,
        }
    }
}

/// One character's state as of one scene
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub character_id: NodeId,
    pub character_name: String,
    pub scene_id: NodeId,
    pub sequence: f64,
    pub state: HashMap<String, PropertyValue>,
}

impl StateSnapshot {
    pub fn from_record(record: &Record) -> Result<Self, QueryError> {
        Ok(Self {
            character_id: NodeId::from(record.str("character_id")?),
            character_name: record.str("character_name")?.to_string(),
            scene_id: NodeId::from(record.str("scene_id")?),
            sequence: record.f64("sequence")?,
            state: record.object("state")?.clone(),
        })
    }
}

/// Why a field transition is impossible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Impossibility {
    AgeDecreased,
    Resurrected,
    SharpDrop,
}

fn classify(field: &str, before: &PropertyValue, after: &PropertyValue, rules: &StateRules) -> Option<Impossibility> {
    match field {
        "age" => {
            let (b, a) = (before.as_f64()?, after.as_f64()?);
            (a < b).then_some(Impossibility::AgeDecreased)
        }
        "alive" => {
            let (b, a) = (before.as_bool()?, after.as_bool()?);
            (!b && a).then_some(Impossibility::Resurrected)
        }
        _ if rules.bounded_attributes.iter().any(|f| f == field) => {
            let (b, a) = (before.as_f64()?, after.as_f64()?);
            (b - a > rules.skill_drop_threshold).then_some(Impossibility::SharpDrop)
        }
        _ => None,
    }
}

/// Compare each character's consecutive snapshots field by field.
///
/// Snapshots are grouped by character (first-appearance order) and ordered
/// by sequence within a character. Fields absent from either snapshot are
/// not compared.
pub fn check_state_history(snapshots: &[StateSnapshot], rules: &StateRules) -> Vec<ConsistencyViolation> {
    let mut characters: Vec<&NodeId> = Vec::new();
    for s in snapshots {
        if !characters.contains(&&s.character_id) {
            characters.push(&s.character_id);
        }
    }

    let mut violations = Vec::new();
    for character in characters {
        let mut history: Vec<&StateSnapshot> = snapshots
            .iter()
            .filter(|s| &s.character_id == character)
            .collect();
        history.sort_by(|a, b| a.sequence.total_cmp(&b.sequence));

        for pair in history.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            let mut fields: Vec<&String> = prev.state.keys().filter(|k| next.state.contains_key(*k)).collect();
            fields.sort();

            for field in fields {
                let (before, after) = (&prev.state[field], &next.state[field]);
                let Some(kind) = classify(field, before, after, rules) else {
                    continue;
                };
                violations.push(describe(kind, field, before, after, prev, next, rules));
            }
        }
    }
    violations
}

fn describe(
    kind: Impossibility,
    field: &str,
    before: &PropertyValue,
    after: &PropertyValue,
    prev: &StateSnapshot,
    next: &StateSnapshot,
    rules: &StateRules,
) -> ConsistencyViolation {
    let name = &prev.character_name;
    let (what, fix) = match kind {
        Impossibility::AgeDecreased => (
            "age decreases".to_string(),
            format!("Correct {}'s age so it never goes down between scenes", name),
        ),
        Impossibility::Resurrected => (
            "returns to life".to_string(),
            format!("Add an event that explains {}'s return, or keep them dead", name),
        ),
        Impossibility::SharpDrop => (
            format!("drops by more than {}", rules.skill_drop_threshold),
            format!("Show what causes {}'s {} to fall, or soften the drop", name, field),
        ),
    };

    ConsistencyViolation::new(
        ViolationCategory::StateContradiction,
        Severity::Medium,
        format!(
            "Character '{}' {}: {} goes from {} to {} between scene {} and scene {}",
            name, what, field, before, after, prev.scene_id, next.scene_id
        ),
    )
    .with_nodes([prev.character_id.clone(), prev.scene_id.clone(), next.scene_id.clone()])
    .with_fix(fix)
}
