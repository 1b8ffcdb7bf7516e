//! Narrative consistency validation
//!
//! Finds contradictions the graph schema cannot catch on its own: role
//! conflicts, timeline disorder, impossible state changes and choices that
//! go against a character's traits.

pub mod checks;
mod report;
mod rules;
mod types;
mod validator;

pub use report::{ConsistencyReport, TOP_ISSUES};
pub use rules::{ConsistencyRule, NewRule, RuleId, RuleRegistry};
pub use types::{
    confidence_score, CheckKind, CheckOutcome, CheckReport, CheckStatus, ConsistencyViolation,
    Severity, ValidationResult, ViolationCategory,
};
pub use validator::{ConsistencyValidator, ValidatorConfig};
