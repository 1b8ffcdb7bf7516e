//! Violation, result and scoring types

use crate::graph::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// What kind of contradiction a violation describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCategory {
    CharacterBehavior,
    TimelineConflict,
    StateContradiction,
    TraitViolation,
}

impl ViolationCategory {
    pub const ALL: [ViolationCategory; 4] = [
        ViolationCategory::CharacterBehavior,
        ViolationCategory::TimelineConflict,
        ViolationCategory::StateContradiction,
        ViolationCategory::TraitViolation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationCategory::CharacterBehavior => "character_behavior",
            ViolationCategory::TimelineConflict => "timeline_conflict",
            ViolationCategory::StateContradiction => "state_contradiction",
            ViolationCategory::TraitViolation => "trait_violation",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name.trim())
    }

    /// The fixed report recommendation for this category
    pub fn recommendation(&self) -> &'static str {
        match self {
            ViolationCategory::CharacterBehavior => {
                "Review character arcs so that role changes are motivated on the page"
            }
            ViolationCategory::TimelineConflict => {
                "Reorder scenes or adjust narrative times so story order matches chronology"
            }
            ViolationCategory::StateContradiction => {
                "Audit character state between scenes and add events that explain each change"
            }
            ViolationCategory::TraitViolation => {
                "Align character choices with their declared traits or show why they act against them"
            }
        }
    }
}

impl std::fmt::Display for ViolationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered severity: low < medium < high < critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// High and critical issues are violations; the rest are warnings.
    pub fn is_violation(&self) -> bool {
        *self >= Severity::High
    }

    /// Extra confidence penalty applied per violation of this severity
    pub fn weighted_penalty(&self) -> f64 {
        match self {
            Severity::Critical => 0.2,
            Severity::High => 0.1,
            Severity::Medium => 0.05,
            Severity::Low => 0.0,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// A detected contradiction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyViolation {
    pub id: Uuid,
    pub category: ViolationCategory,
    pub severity: Severity,
    pub description: String,
    pub affected_node_ids: Vec<NodeId>,
    pub suggested_fix: String,
    pub created_at: DateTime<Utc>,
}

impl ConsistencyViolation {
    pub fn new(category: ViolationCategory, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            category,
            severity,
            description: description.into(),
            affected_node_ids: Vec::new(),
            suggested_fix: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_nodes(mut self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        self.affected_node_ids.extend(nodes);
        self
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = fix.into();
        self
    }
}

/// The check categories the validator knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    CharacterBehavior,
    Timeline,
    StateContradiction,
    TraitChoice,
    /// Declared extension point, not implemented
    RelationshipConsistency,
    /// Evaluation of registry rules, not implemented
    RegisteredRules,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::CharacterBehavior => "character_behavior",
            CheckKind::Timeline => "timeline",
            CheckKind::StateContradiction => "state_contradiction",
            CheckKind::TraitChoice => "trait_choice",
            CheckKind::RelationshipConsistency => "relationship_consistency",
            CheckKind::RegisteredRules => "registered_rules",
        }
    }
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one check category
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Completed(Vec<ConsistencyViolation>),
    Failed(String),
    TimedOut(Duration),
    NotImplemented,
}

/// Serializable summary of a check outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckStatus {
    Completed { found: usize },
    Failed { error: String },
    TimedOut { after_ms: u64 },
    NotImplemented,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckReport {
    pub check: CheckKind,
    #[serde(flatten)]
    pub status: CheckStatus,
}

impl CheckReport {
    /// Whether the category ran but produced no usable result
    pub fn is_failure(&self) -> bool {
        matches!(self.status, CheckStatus::Failed { .. } | CheckStatus::TimedOut { .. })
    }
}

/// Outcome of validating one story
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub story_id: NodeId,
    /// No violations among the categories that completed
    pub is_consistent: bool,
    /// Severity high or critical
    pub violations: Vec<ConsistencyViolation>,
    /// Severity low or medium
    pub warnings: Vec<ConsistencyViolation>,
    pub confidence_score: f64,
    pub validation_timestamp: DateTime<Utc>,
    /// Some category failed or timed out
    pub partial: bool,
    pub checks: Vec<CheckReport>,
}

impl ValidationResult {
    /// Merge per-category outcomes, in the order given, into a result.
    pub fn from_outcomes(story_id: NodeId, outcomes: Vec<(CheckKind, CheckOutcome)>) -> Self {
        let mut violations = Vec::new();
        let mut warnings = Vec::new();
        let mut checks = Vec::with_capacity(outcomes.len());

        for (check, outcome) in outcomes {
            let status = match outcome {
                CheckOutcome::Completed(found) => {
                    let count = found.len();
                    for issue in found {
                        if issue.severity.is_violation() {
                            violations.push(issue);
                        } else {
                            warnings.push(issue);
                        }
                    }
                    CheckStatus::Completed { found: count }
                }
                CheckOutcome::Failed(error) => CheckStatus::Failed { error },
                CheckOutcome::TimedOut(after) => CheckStatus::TimedOut {
                    after_ms: after.as_millis() as u64,
                },
                CheckOutcome::NotImplemented => CheckStatus::NotImplemented,
            };
            checks.push(CheckReport { check, status });
        }

        let partial = checks.iter().any(CheckReport::is_failure);
        Self {
            story_id,
            is_consistent: violations.is_empty(),
            confidence_score: confidence_score(&violations, &warnings),
            violations,
            warnings,
            validation_timestamp: Utc::now(),
            partial,
            checks,
        }
    }

    /// Violations then warnings, each in discovery order
    pub fn issues(&self) -> impl Iterator<Item = &ConsistencyViolation> {
        self.violations.iter().chain(self.warnings.iter())
    }
}

/// Score a story's consistency in `[0, 1]`.
///
/// Each violation costs a flat 0.1 plus its severity weight; each warning
/// costs a flat 0.05.
pub fn confidence_score(violations: &[ConsistencyViolation], warnings: &[ConsistencyViolation]) -> f64 {
    let flat = 0.1 * violations.len() as f64 + 0.05 * warnings.len() as f64;
    let weighted: f64 = violations.iter().map(|v| v.severity.weighted_penalty()).sum();
    (1.0 - flat - weighted).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(severity: Severity) -> ConsistencyViolation {
        ConsistencyViolation::new(ViolationCategory::TimelineConflict, severity, "x")
    }

    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert!(Severity::High.is_violation());
        assert!(!Severity::Medium.is_violation());
    }

    #[test]
    fn score_double_counts_violation_severity() {
        let score = confidence_score(&[issue(Severity::High)], &[issue(Severity::Medium)]);
        // 1.0 - 0.1 - 0.05 - 0.1
        assert!((score - 0.75).abs() < 1e-9);

        let score = confidence_score(&[issue(Severity::Critical)], &[]);
        assert!((score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn score_is_monotone_and_clamped() {
        let mut violations = Vec::new();
        let mut warnings = Vec::new();
        let mut last = confidence_score(&violations, &warnings);
        assert_eq!(last, 1.0);

        for i in 0..12 {
            if i % 3 == 0 {
                warnings.push(issue(Severity::Low));
            } else {
                violations.push(issue(Severity::Critical));
            }
            let next = confidence_score(&violations, &warnings);
            assert!(next <= last);
            assert!((0.0..=1.0).contains(&next));
            last = next;
        }

        let ten_critical: Vec<_> = (0..10).map(|_| issue(Severity::Critical)).collect();
        assert_eq!(confidence_score(&ten_critical, &[]), 0.0);
    }

    #[test]
    fn outcomes_split_by_severity_and_flag_partial() {
        let result = ValidationResult::from_outcomes(
            NodeId::from("story"),
            vec![
                (CheckKind::Timeline, CheckOutcome::Completed(vec![issue(Severity::High)])),
                (CheckKind::TraitChoice, CheckOutcome::Completed(vec![issue(Severity::Medium)])),
                (CheckKind::StateContradiction, CheckOutcome::Failed("boom".into())),
                (CheckKind::RegisteredRules, CheckOutcome::NotImplemented),
            ],
        );
        assert!(!result.is_consistent);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.partial);
        assert_eq!(result.checks[3].status, CheckStatus::NotImplemented);
    }

    #[test]
    fn not_implemented_does_not_make_result_partial() {
        let result = ValidationResult::from_outcomes(
            NodeId::from("story"),
            vec![
                (CheckKind::Timeline, CheckOutcome::Completed(vec![])),
                (CheckKind::RelationshipConsistency, CheckOutcome::NotImplemented),
            ],
        );
        assert!(result.is_consistent);
        assert!(!result.partial);
        assert_eq!(result.confidence_score, 1.0);
    }

    #[test]
    fn result_serializes_camel_case() {
        let result = ValidationResult::from_outcomes(
            NodeId::from("story"),
            vec![(CheckKind::Timeline, CheckOutcome::TimedOut(Duration::from_millis(250)))],
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["isConsistent"], true);
        assert_eq!(json["confidenceScore"], 1.0);
        assert_eq!(json["checks"][0]["check"], "timeline");
        assert_eq!(json["checks"][0]["status"], "timed_out");
        assert_eq!(json["checks"][0]["after_ms"], 250);
    }
}
