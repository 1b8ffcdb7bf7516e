//! Consistency validator
//!
//! Runs the check categories concurrently against the graph-query
//! collaborator. Each category is bounded by its own timeout and a failing
//! category never aborts the others; it is recorded in the result and marks
//! the result partial.

use super::checks::{
    check_character_behavior, check_state_history, check_timeline, check_trait_choices, ChoiceRow,
    RoleAppearance, StateRules, StateSnapshot, TimedScene,
};
use super::report::ConsistencyReport;
use super::types::{CheckKind, CheckOutcome, ConsistencyViolation, ValidationResult};
use crate::graph::{NodeId, StoryError, StoryResult};
use crate::query::{GraphQuery, Query, QueryError, QueryPattern, Record};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Validator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Upper bound for one check category
    pub category_timeout_ms: u64,
    #[serde(flatten)]
    pub state: StateRules,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            category_timeout_ms: 5_000,
            state: StateRules::default(),
        }
    }
}

impl ValidatorConfig {
    pub fn category_timeout(&self) -> Duration {
        Duration::from_millis(self.category_timeout_ms)
    }
}

type CheckResult = Result<Vec<ConsistencyViolation>, QueryError>;

/// Validates stories against the narrative consistency checks
pub struct ConsistencyValidator {
    query: Arc<dyn GraphQuery>,
    config: ValidatorConfig,
}

impl ConsistencyValidator {
    pub fn new(query: Arc<dyn GraphQuery>) -> Self {
        Self {
            query,
            config: ValidatorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ValidatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate a story.
    ///
    /// Fails with `NotFound` when no story has this id. Check failures do
    /// not fail the call; they show up in `checks` and set `partial`.
    pub async fn validate_story(&self, story_id: &NodeId) -> StoryResult<ValidationResult> {
        self.require_story(story_id).await?;

        let (behavior, timeline, state, traits) = tokio::join!(
            self.bounded(CheckKind::CharacterBehavior, self.check_character_behavior(story_id)),
            self.bounded(CheckKind::Timeline, self.check_timeline(story_id)),
            self.bounded(CheckKind::StateContradiction, self.check_state_contradictions(story_id)),
            self.bounded(CheckKind::TraitChoice, self.check_trait_choices(story_id)),
        );

        let outcomes = vec![
            behavior,
            timeline,
            state,
            traits,
            (CheckKind::RelationshipConsistency, CheckOutcome::NotImplemented),
            (CheckKind::RegisteredRules, CheckOutcome::NotImplemented),
        ];
        let result = ValidationResult::from_outcomes(story_id.clone(), outcomes);

        info!(
            story = %story_id,
            violations = result.violations.len(),
            warnings = result.warnings.len(),
            confidence = result.confidence_score,
            partial = result.partial,
            "validated story"
        );
        Ok(result)
    }

    /// Validate, then summarize the result for authors
    pub async fn generate_report(&self, story_id: &NodeId) -> StoryResult<ConsistencyReport> {
        let result = self.validate_story(story_id).await?;
        Ok(ConsistencyReport::from_result(result))
    }

    pub async fn check_character_behavior(&self, story_id: &NodeId) -> CheckResult {
        let rows = self.fetch(QueryPattern::CharacterRoles, story_id).await?;
        let appearances = decode(&rows, RoleAppearance::from_record)?;
        Ok(check_character_behavior(&appearances))
    }

    pub async fn check_timeline(&self, story_id: &NodeId) -> CheckResult {
        let rows = self.fetch(QueryPattern::SceneTimeline, story_id).await?;
        let scenes = decode(&rows, TimedScene::from_record)?;
        Ok(check_timeline(&scenes))
    }

    pub async fn check_state_contradictions(&self, story_id: &NodeId) -> CheckResult {
        let rows = self.fetch(QueryPattern::CharacterStates, story_id).await?;
        let snapshots = decode(&rows, StateSnapshot::from_record)?;
        Ok(check_state_history(&snapshots, &self.config.state))
    }

    pub async fn check_trait_choices(&self, story_id: &NodeId) -> CheckResult {
        let rows = self.fetch(QueryPattern::CharacterChoices, story_id).await?;
        let choices = decode(&rows, ChoiceRow::from_record)?;
        Ok(check_trait_choices(&choices))
    }

    async fn require_story(&self, story_id: &NodeId) -> StoryResult<()> {
        let limit = self.config.category_timeout();
        let found = tokio::time::timeout(limit, self.fetch(QueryPattern::StoryExists, story_id))
            .await
            .map_err(|_| {
                StoryError::Collaborator(format!("story lookup timed out after {:?}", limit))
            })??;
        if found.is_empty() {
            return Err(StoryError::NotFound(format!("story {}", story_id)));
        }
        Ok(())
    }

    /// One query in its own session; the session is released on return
    async fn fetch(&self, pattern: QueryPattern, story_id: &NodeId) -> Result<Vec<Record>, QueryError> {
        let session = self.query.open_session().await?;
        let query = Query::new(pattern).bind("story_id", story_id.as_str());
        let records = session.run(&query).await?;
        debug!(?pattern, story = %story_id, records = records.len(), "query complete");
        Ok(records)
    }

    async fn bounded<F>(&self, check: CheckKind, work: F) -> (CheckKind, CheckOutcome)
    where
        F: Future<Output = CheckResult>,
    {
        let limit = self.config.category_timeout();
        let outcome = match tokio::time::timeout(limit, work).await {
            Ok(Ok(found)) => CheckOutcome::Completed(found),
            Ok(Err(e)) => {
                warn!(%check, error = %e, "consistency check failed");
                CheckOutcome::Failed(e.to_string())
            }
            Err(_) => {
                warn!(%check, timeout_ms = limit.as_millis() as u64, "consistency check timed out");
                CheckOutcome::TimedOut(limit)
            }
        };
        (check, outcome)
    }
}

fn decode<T>(
    records: &[Record],
    row: impl Fn(&Record) -> Result<T, QueryError>,
) -> Result<Vec<T>, QueryError> {
    records.iter().map(row).collect()
}
