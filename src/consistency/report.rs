//! Author-facing consistency report

use super::types::{ConsistencyViolation, ValidationResult, ViolationCategory};
use crate::graph::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of issues surfaced in `top_issues`
pub const TOP_ISSUES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub story_id: NodeId,
    /// Issue count per category, violations and warnings together
    pub category_counts: BTreeMap<ViolationCategory, usize>,
    /// Most severe issues first; equal severities keep discovery order
    pub top_issues: Vec<ConsistencyViolation>,
    /// One recommendation per category present, in first-appearance order
    pub recommendations: Vec<String>,
    pub result: ValidationResult,
    pub generated_at: DateTime<Utc>,
}

impl ConsistencyReport {
    pub fn from_result(result: ValidationResult) -> Self {
        let mut category_counts = BTreeMap::new();
        let mut recommendations: Vec<String> = Vec::new();
        for issue in result.issues() {
            *category_counts.entry(issue.category).or_insert(0) += 1;
            let advice = issue.category.recommendation();
            if !recommendations.iter().any(|r| r == advice) {
                recommendations.push(advice.to_string());
            }
        }

        let mut top_issues: Vec<ConsistencyViolation> = result.issues().cloned().collect();
        // sort_by is stable
        top_issues.sort_by(|a, b| b.severity.cmp(&a.severity));
        top_issues.truncate(TOP_ISSUES);

        Self {
            story_id: result.story_id.clone(),
            category_counts,
            top_issues,
            recommendations,
            result,
            generated_at: Utc::now(),
        }
    }

    pub fn total_issues(&self) -> usize {
        self.category_counts.values().sum()
    }
}
