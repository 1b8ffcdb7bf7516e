//! Character behavior: mutually exclusive narrative roles

use crate::consistency::types::{ConsistencyViolation, Severity, ViolationCategory};
use crate::graph::NodeId;
use crate::query::{QueryError, Record};

/// Role pairs a character cannot hold at once without an explained arc
pub const EXCLUSIVE_ROLES: &[(&str, &str)] = &[
    ("hero", "villain"),
    ("ally", "enemy"),
    ("victim", "perpetrator"),
];

/// One appearance of a character in a scene, with the role played there
#[derive(Debug, Clone, PartialEq)]
pub struct RoleAppearance {
    pub character_id: NodeId,
    pub character_name: String,
    pub has_arc: bool,
    pub scene_id: NodeId,
    pub role: String,
}

impl RoleAppearance {
    pub fn from_record(record: &Record) -> Result<Self, QueryError> {
        Ok(Self {
            character_id: NodeId::from(record.str("character_id")?),
            character_name: record.str("character_name")?.to_string(),
            has_arc: record.flag("has_arc")?,
            scene_id: NodeId::from(record.str("scene_id")?),
            role: record.str("role")?.trim().to_lowercase(),
        })
    }
}

/// Flag every exclusive role pair a character holds, unless the character
/// declares an arc. Characters are reported in first-appearance order.
pub fn check_character_behavior(appearances: &[RoleAppearance]) -> Vec<ConsistencyViolation> {
    let mut order: Vec<&NodeId> = Vec::new();
    for a in appearances {
        if !order.contains(&&a.character_id) {
            order.push(&a.character_id);
        }
    }

    let mut violations = Vec::new();
    for character in order {
        let own: Vec<&RoleAppearance> = appearances
            .iter()
            .filter(|a| &a.character_id == character)
            .collect();
        if own.iter().any(|a| a.has_arc) {
            continue;
        }

        for (first, second) in EXCLUSIVE_ROLES {
            let scenes_for = |role: &str| -> Vec<NodeId> {
                own.iter()
                    .filter(|a| a.role == role)
                    .map(|a| a.scene_id.clone())
                    .collect()
            };
            let first_scenes = scenes_for(first);
            let second_scenes = scenes_for(second);
            if first_scenes.is_empty() || second_scenes.is_empty() {
                continue;
            }

            let name = &own[0].character_name;
            let mut affected = vec![character.clone()];
            for scene in first_scenes.into_iter().chain(second_scenes) {
                if !affected.contains(&scene) {
                    affected.push(scene);
                }
            }
            violations.push(
                ConsistencyViolation::new(
                    ViolationCategory::CharacterBehavior,
                    Severity::Medium,
                    format!(
                        "Character '{}' is both {} and {} with no character arc explaining the change",
                        name, first, second
                    ),
                )
                .with_nodes(affected)
                .with_fix(format!(
                    "Give '{}' an arc that motivates the move from {} to {}, or revise one of the roles",
                    name, first, second
                )),
            );
        }
    }
    violations
}
