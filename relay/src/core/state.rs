//! Accumulating key-value document threaded between pipeline stages.
//!
//! Keys keep their insertion order so a document read from one stage and
//! written by the next stays diffable. Any stage may add new keys; typed
//! getters fail with the offending key name.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StateError;

/// Key under which a dry-run sentinel is nested when written into state.
pub const DRY_RUN_KEY: &str = "dry_run";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineState {
    fields: Map<String, Value>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a serialized document. Blank input yields an empty state.
    pub fn parse(raw: &str) -> Result<Self, StateError> {
        if raw.trim().is_empty() {
            return Ok(Self::new());
        }
        let value: Value =
            serde_json::from_str(raw).map_err(|err| StateError::Parse(err.to_string()))?;
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(StateError::Parse(format!(
                "expected an object, found {}",
                json_kind(&other)
            ))),
        }
    }

    /// Render as pretty JSON with a trailing newline.
    pub fn render(&self) -> Result<String, StateError> {
        let mut buf = serde_json::to_string_pretty(&self.fields)
            .map_err(|err| StateError::Render(err.to_string()))?;
        buf.push('\n');
        Ok(buf)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn require(&self, key: &str) -> Result<&Value, StateError> {
        self.get(key).ok_or_else(|| StateError::Missing {
            key: key.to_string(),
        })
    }

    /// String value for `key`; `Ok(None)` when absent.
    pub fn get_str(&self, key: &str) -> Result<Option<&str>, StateError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(_) => Err(wrong_type(key, "a string")),
        }
    }

    pub fn require_str(&self, key: &str) -> Result<&str, StateError> {
        self.get_str(key)?.ok_or_else(|| StateError::Missing {
            key: key.to_string(),
        })
    }

    /// Integer value for `key`. Numeric strings are accepted since upstream
    /// stages may have written counters as text.
    pub fn get_i64(&self, key: &str) -> Result<Option<i64>, StateError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(number)) => number
                .as_i64()
                .map(Some)
                .ok_or_else(|| wrong_type(key, "an integer")),
            Some(Value::String(text)) => text
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| wrong_type(key, "an integer")),
            Some(_) => Err(wrong_type(key, "an integer")),
        }
    }

    /// Insert or overwrite `key`, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }
}

/// True if `value` is a dry-run sentinel written by a simulated stage.
pub fn is_sentinel(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|object| object.len() == 1 && object.contains_key(DRY_RUN_KEY))
}

fn wrong_type(key: &str, expected: &'static str) -> StateError {
    StateError::WrongType {
        key: key.to_string(),
        expected,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn render_then_parse_round_trips() {
        let mut state = PipelineState::new();
        state.set("a", 1);
        state.set("b", "x");

        let rendered = state.render().expect("render");
        let parsed = PipelineState::parse(&rendered).expect("parse");
        assert_eq!(parsed, state);
        assert_eq!(parsed.get_i64("a").expect("a"), Some(1));
        assert_eq!(parsed.get_str("b").expect("b"), Some("x"));
    }

    #[test]
    fn render_is_stable_and_ordered() {
        let mut state = PipelineState::new();
        state.set("zeta", 1);
        state.set("alpha", json!({"nested": [1, 2]}));

        let rendered = state.render().expect("render");
        let expected = "{\n  \"zeta\": 1,\n  \"alpha\": {\n    \"nested\": [\n      1,\n      2\n    ]\n  }\n}\n";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn blank_input_is_empty_state() {
        assert!(PipelineState::parse("").expect("parse").is_empty());
        assert!(PipelineState::parse(" \n").expect("parse").is_empty());
    }

    #[test]
    fn non_object_document_is_rejected() {
        let err = PipelineState::parse("[1, 2]").expect_err("should fail");
        assert_eq!(
            err,
            StateError::Parse("expected an object, found an array".to_string())
        );
    }

    #[test]
    fn typed_getters_name_the_key() {
        let mut state = PipelineState::new();
        state.set("count", "not a number");

        assert_eq!(
            state.require_str("vpcid").expect_err("missing"),
            StateError::Missing {
                key: "vpcid".to_string()
            }
        );
        assert_eq!(
            state.get_i64("count").expect_err("wrong type"),
            StateError::WrongType {
                key: "count".to_string(),
                expected: "an integer"
            }
        );
    }

    #[test]
    fn numeric_strings_read_as_integers() {
        let mut state = PipelineState::new();
        state.set("message", "41");
        assert_eq!(state.get_i64("message").expect("read"), Some(41));
    }

    #[test]
    fn sentinel_shape_is_recognised() {
        assert!(is_sentinel(
            &json!({"dry_run": {"caller": "instantiate", "operation": "run-instances"}})
        ));
        assert!(!is_sentinel(&json!("i-123")));
        assert!(!is_sentinel(&json!({"dry_run": true, "other": 1})));
    }

    #[test]
    fn render_failures_are_reported_as_render_errors() {
        let err = StateError::Render("key must be a string".to_string());
        assert_eq!(
            err.to_string(),
            "render pipeline state: key must be a string"
        );
    }
}
