//! Trait-choice: choices that contradict a character's declared traits

use crate::consistency::types::{ConsistencyViolation, Severity, ViolationCategory};
use crate::graph::NodeId;
use crate::query::{QueryError, Record};

/// A trait and the choice phrases that go against it
pub struct TraitRule {
    pub trait_name: &'static str,
    pub forbidden: &'static [&'static str],
    pub fix: &'static str,
}

pub static TRAIT_RULES: &[TraitRule] = &[
    TraitRule {
        trait_name: "brave",
        forbidden: &["run away", "hide", "surrender"],
        fix: "Show the fear that overrides their courage, or let them stand their ground",
    },
    TraitRule {
        trait_name: "honest",
        forbidden: &["lie", "deceive", "trick"],
        fix: "Give them a reason strong enough to bend the truth, or have them tell it",
    },
    TraitRule {
        trait_name: "loyal",
        forbidden: &["betray", "abandon", "desert"],
        fix: "Establish the conflict of loyalties first, or keep them at their ally's side",
    },
];

/// A choice made by a character, with the character's traits
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceRow {
    pub character_id: NodeId,
    pub character_name: String,
    pub traits: Vec<String>,
    pub choice_id: NodeId,
    pub text: String,
}

impl ChoiceRow {
    pub fn from_record(record: &Record) -> Result<Self, QueryError> {
        Ok(Self {
            character_id: NodeId::from(record.str("character_id")?),
            character_name: record.str("character_name")?.to_string(),
            traits: record.strings("traits")?,
            choice_id: NodeId::from(record.str("choice_id")?),
            text: record.str("text")?.to_string(),
        })
    }
}

/// Flag choices whose text contains a phrase forbidden by one of the
/// character's traits. Matching is a case-insensitive substring test.
pub fn check_trait_choices(choices: &[ChoiceRow]) -> Vec<ConsistencyViolation> {
    let mut violations = Vec::new();
    for choice in choices {
        let text = choice.text.to_lowercase();
        let mut seen: Vec<&str> = Vec::new();

        for declared in &choice.traits {
            let declared = declared.trim().to_lowercase();
            let Some(rule) = TRAIT_RULES.iter().find(|r| r.trait_name == declared) else {
                continue;
            };
            if seen.contains(&rule.trait_name) {
                continue;
            }
            let Some(phrase) = rule.forbidden.iter().find(|p| text.contains(*p)) else {
                continue;
            };
            seen.push(rule.trait_name);

            violations.push(
                ConsistencyViolation::new(
                    ViolationCategory::TraitViolation,
                    Severity::Medium,
                    format!(
                        "Character '{}' is {} but chooses to \"{}\" ({})",
                        choice.character_name, rule.trait_name, choice.text, phrase
                    ),
                )
                .with_nodes([choice.character_id.clone(), choice.choice_id.clone()])
                .with_fix(rule.fix),
            );
        }
    }
    violations
}
