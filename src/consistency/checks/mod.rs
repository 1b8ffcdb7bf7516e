//! The four consistency check categories
//!
//! Each check is a pure function over rows decoded from query records, so
//! it can be tested without a graph.

mod behavior;
mod state;
mod timeline;
mod traits;

pub use behavior::{check_character_behavior, RoleAppearance, EXCLUSIVE_ROLES};
pub use state::{check_state_history, StateRules, StateSnapshot};
pub use timeline::{check_timeline, TimedScene};
pub use traits::{check_trait_choices, ChoiceRow, TraitRule, TRAIT_RULES};
