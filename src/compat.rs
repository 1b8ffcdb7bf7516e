//! Edge-compatibility gate
//!
//! Every relationship type may only connect certain node-type pairs. The
//! gate checks a proposed `(from, relation, to)` triple against a static
//! table before an edge is written. It is pure: no I/O, no state.

use crate::graph::{NodeType, RelationType};
use serde::{Deserialize, Serialize};

/// One row of the compatibility table: any `from` type may connect to any
/// `to` type through `relation`.
#[derive(Debug, Clone, Copy)]
pub struct CompatibilityRule {
    pub relation: RelationType,
    pub from: &'static [NodeType],
    pub to: &'static [NodeType],
}

use NodeType::*;

/// The allow-table. A relation may appear in several rows.
pub static COMPATIBILITY_TABLE: &[CompatibilityRule] = &[
    CompatibilityRule { relation: RelationType::LeadsTo, from: &[Scene], to: &[Scene, Choice] },
    CompatibilityRule { relation: RelationType::LeadsTo, from: &[Choice], to: &[Scene] },
    CompatibilityRule { relation: RelationType::AppearsIn, from: &[Character], to: &[Scene, Event] },
    CompatibilityRule { relation: RelationType::Triggers, from: &[Choice, Event], to: &[Event] },
    CompatibilityRule { relation: RelationType::Triggers, from: &[Choice], to: &[Scene] },
    CompatibilityRule { relation: RelationType::Requires, from: &[Choice, Scene], to: &[Item, Event] },
    CompatibilityRule { relation: RelationType::LocatedAt, from: &[Scene, Character, Item], to: &[Location] },
    CompatibilityRule { relation: RelationType::Makes, from: &[Character], to: &[Choice] },
    CompatibilityRule { relation: RelationType::Owns, from: &[Character], to: &[Item] },
    CompatibilityRule { relation: RelationType::Knows, from: &[Character], to: &[Character] },
    CompatibilityRule { relation: RelationType::Contains, from: &[Story], to: &[Chapter, Scene] },
    CompatibilityRule { relation: RelationType::Contains, from: &[Chapter], to: &[Scene] },
    CompatibilityRule { relation: RelationType::OccursIn, from: &[Event], to: &[Scene] },
];

/// Outcome of a compatibility check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compatibility {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Compatibility {
    fn allowed() -> Self {
        Self { valid: true, reason: None }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Check whether `relation` may connect a `from` node to a `to` node.
pub fn check_compatibility(from: NodeType, to: NodeType, relation: RelationType) -> Compatibility {
    check_against(COMPATIBILITY_TABLE, from, to, relation)
}

fn check_against(
    table: &[CompatibilityRule],
    from: NodeType,
    to: NodeType,
    relation: RelationType,
) -> Compatibility {
    let mut rows = table.iter().filter(|rule| rule.relation == relation).peekable();
    if rows.peek().is_none() {
        return Compatibility::rejected(format!("unknown relationship type: {}", relation));
    }

    if rows.any(|rule| rule.from.contains(&from) && rule.to.contains(&to)) {
        Compatibility::allowed()
    } else {
        Compatibility::rejected(format!(
            "{} cannot connect {} to {}",
            relation, from, to
        ))
    }
}

/// String-level entry point for raw payloads.
///
/// Unparseable relation names are reported as unknown relationship types;
/// unparseable node type names are reported by name.
pub fn check_names(from: &str, to: &str, relation: &str) -> Compatibility {
    let Some(relation) = RelationType::parse(relation) else {
        return Compatibility::rejected(format!("unknown relationship type: {}", relation));
    };
    let Some(from) = NodeType::parse(from) else {
        return Compatibility::rejected(format!("unknown node type: {}", from));
    };
    let Some(to) = NodeType::parse(to) else {
        return Compatibility::rejected(format!("unknown node type: {}", to));
    };
    check_compatibility(from, to, relation)
}

/// All `(from, to)` pairs a relation allows, in table order
pub fn allowed_pairs(relation: RelationType) -> Vec<(NodeType, NodeType)> {
    COMPATIBILITY_TABLE
        .iter()
        .filter(|rule| rule.relation == relation)
        .flat_map(|rule| {
            rule.from
                .iter()
                .flat_map(move |f| rule.to.iter().map(move |t| (*f, *t)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// The allow-table written out as explicit triples
    fn expected_triples() -> HashSet<(NodeType, RelationType, NodeType)> {
        use RelationType as R;
        [
            (Scene, R::LeadsTo, Scene),
            (Scene, R::LeadsTo, Choice),
            (Choice, R::LeadsTo, Scene),
            (Character, R::AppearsIn, Scene),
            (Character, R::AppearsIn, Event),
            (Choice, R::Triggers, Event),
            (Event, R::Triggers, Event),
            (Choice, R::Triggers, Scene),
            (Choice, R::Requires, Item),
            (Choice, R::Requires, Event),
            (Scene, R::Requires, Item),
            (Scene, R::Requires, Event),
            (Scene, R::LocatedAt, Location),
            (Character, R::LocatedAt, Location),
            (Item, R::LocatedAt, Location),
            (Character, R::Makes, Choice),
            (Character, R::Owns, Item),
            (Character, R::Knows, Character),
            (Story, R::Contains, Chapter),
            (Story, R::Contains, Scene),
            (Chapter, R::Contains, Scene),
            (Event, R::OccursIn, Scene),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn exhaustive_table_agreement() {
        let expected = expected_triples();
        for relation in RelationType::ALL {
            for from in NodeType::ALL {
                for to in NodeType::ALL {
                    let result = check_compatibility(from, to, relation);
                    assert_eq!(
                        result.valid,
                        expected.contains(&(from, relation, to)),
                        "{} {} {}",
                        from,
                        relation,
                        to
                    );
                    assert_eq!(result.valid, result.reason.is_none());
                }
            }
        }
    }

    #[test]
    fn every_relation_has_a_row() {
        for relation in RelationType::ALL {
            assert!(!allowed_pairs(relation).is_empty(), "{} has no rows", relation);
        }
    }

    #[test]
    fn rejection_names_the_combination() {
        let result = check_compatibility(Location, Scene, RelationType::AppearsIn);
        assert!(!result.valid);
        assert_eq!(
            result.reason.as_deref(),
            Some("APPEARS_IN cannot connect Location to Scene")
        );
    }

    #[test]
    fn relation_without_rows_is_unknown() {
        let table = [CompatibilityRule { relation: RelationType::Knows, from: &[Character], to: &[Character] }];
        let result = check_against(&table, Scene, Scene, RelationType::LeadsTo);
        assert!(!result.valid);
        assert!(result.reason.unwrap().starts_with("unknown relationship type"));
    }

    #[test]
    fn raw_names_are_parsed() {
        assert!(check_names("scene", "location", "located_at").valid);

        let unknown = check_names("Scene", "Scene", "TELEPORTS_TO");
        assert_eq!(unknown.reason.as_deref(), Some("unknown relationship type: TELEPORTS_TO"));

        let bad_node = check_names("Dragon", "Scene", "LEADS_TO");
        assert_eq!(bad_node.reason.as_deref(), Some("unknown node type: Dragon"));
    }

    #[test]
    fn check_is_idempotent() {
        let a = check_compatibility(Choice, Scene, RelationType::LeadsTo);
        let b = check_compatibility(Choice, Scene, RelationType::LeadsTo);
        assert_eq!(a, b);
        assert!(a.valid);
    }
}
