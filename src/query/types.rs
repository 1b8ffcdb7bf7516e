//! Query collaborator interface: parameterized queries and typed records

use crate::graph::PropertyValue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised by a query collaborator
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    #[error("missing query parameter: {0}")]
    MissingParameter(String),

    #[error("field {field} is not a {expected}")]
    Type { field: String, expected: &'static str },

    #[error("missing record field: {0}")]
    MissingField(String),

    #[error("query backend unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Execution(String),
}

/// The named query shapes the validator issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPattern {
    /// `story_id` → zero or one record `{story_id, title}`
    StoryExists,
    /// `story_id` → one record per (character, scene) appearance carrying a role
    CharacterRoles,
    /// `story_id` → scenes with both `sequence` and `narrative_time`, by sequence
    SceneTimeline,
    /// `story_id` → state snapshots per character, by scene sequence
    CharacterStates,
    /// `story_id` → one record per choice made by a character with traits
    CharacterChoices,
}

/// A query pattern plus bound parameters
///
/// Parameters are always named values; nothing from the caller is spliced
/// into query text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub pattern: QueryPattern,
    pub params: BTreeMap<String, PropertyValue>,
}

impl Query {
    pub fn new(pattern: QueryPattern) -> Self {
        Self {
            pattern,
            params: BTreeMap::new(),
        }
    }

    /// Bind a named parameter
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// A bound string parameter
    pub fn str_param(&self, name: &str) -> Result<&str, QueryError> {
        match self.params.get(name) {
            Some(value) => value.as_str().ok_or_else(|| QueryError::Type {
                field: name.to_string(),
                expected: "string",
            }),
            None => Err(QueryError::MissingParameter(name.to_string())),
        }
    }
}

/// One result row: named, typed values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, PropertyValue>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&PropertyValue> {
        self.0.get(field)
    }

    fn require(&self, field: &str) -> Result<&PropertyValue, QueryError> {
        self.get(field)
            .ok_or_else(|| QueryError::MissingField(field.to_string()))
    }

    pub fn str(&self, field: &str) -> Result<&str, QueryError> {
        self.require(field)?.as_str().ok_or_else(|| QueryError::Type {
            field: field.to_string(),
            expected: "string",
        })
    }

    pub fn f64(&self, field: &str) -> Result<f64, QueryError> {
        self.require(field)?.as_f64().ok_or_else(|| QueryError::Type {
            field: field.to_string(),
            expected: "number",
        })
    }

    /// Missing fields read as `false`
    pub fn flag(&self, field: &str) -> Result<bool, QueryError> {
        match self.get(field) {
            None | Some(PropertyValue::Null) => Ok(false),
            Some(value) => value.as_bool().ok_or_else(|| QueryError::Type {
                field: field.to_string(),
                expected: "bool",
            }),
        }
    }

    /// String array field; non-string entries are a type error
    pub fn strings(&self, field: &str) -> Result<Vec<String>, QueryError> {
        let items = self.require(field)?.as_array().ok_or_else(|| QueryError::Type {
            field: field.to_string(),
            expected: "array",
        })?;
        items
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| QueryError::Type {
                    field: field.to_string(),
                    expected: "array of strings",
                })
            })
            .collect()
    }

    pub fn object(
        &self,
        field: &str,
    ) -> Result<&std::collections::HashMap<String, PropertyValue>, QueryError> {
        self.require(field)?.as_object().ok_or_else(|| QueryError::Type {
            field: field.to_string(),
            expected: "object",
        })
    }
}

/// A query collaborator: the graph database the validator reads from
#[async_trait]
pub trait GraphQuery: Send + Sync {
    /// Acquire a session for one logical operation.
    ///
    /// The session is released when dropped, on every exit path.
    async fn open_session(&self) -> Result<Box<dyn QuerySession>, QueryError>;
}

/// An open session against a query collaborator
#[async_trait]
pub trait QuerySession: Send + Sync {
    /// Run a parameterized query and return its records in order
    async fn run(&self, query: &Query) -> Result<Vec<Record>, QueryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_parameters_are_typed() {
        let q = Query::new(QueryPattern::SceneTimeline).bind("story_id", "s1");
        assert_eq!(q.str_param("story_id"), Ok("s1"));
        assert_eq!(
            q.str_param("other"),
            Err(QueryError::MissingParameter("other".into()))
        );

        let q = Query::new(QueryPattern::SceneTimeline).bind("story_id", 5i64);
        assert!(matches!(q.str_param("story_id"), Err(QueryError::Type { .. })));
    }

    #[test]
    fn record_accessors() {
        let r = Record::new()
            .with("name", "Mara")
            .with("seq", 2i64)
            .with("arc", true)
            .with("traits", PropertyValue::Array(vec!["brave".into()]));
        assert_eq!(r.str("name"), Ok("Mara"));
        assert_eq!(r.f64("seq"), Ok(2.0));
        assert_eq!(r.flag("arc"), Ok(true));
        assert_eq!(r.flag("absent"), Ok(false));
        assert_eq!(r.strings("traits"), Ok(vec!["brave".to_string()]));
        assert_eq!(r.str("nope"), Err(QueryError::MissingField("nope".into())));
        assert!(matches!(r.f64("name"), Err(QueryError::Type { .. })));
    }
}
