//! Error taxonomy shared by every pipeline phase.
//!
//! # Responsibilities
//! - Carry a client-facing failure: status, stable code, free-form message
//! - Record where the failure was raised (`file:line`)
//! - Keep the chain of causes as a tree of child errors
//! - Render the diagnostic and structured-log forms of that tree
//!
//! # Design Decisions
//! - `description` is an identifier-like code (`DUPLICATE_REQUEST`,
//!   `REQUIRED-FIELD`); human text lives in the message tables
//! - Constructors are `#[track_caller]`, so `source` is the first caller
//!   outside this module
//! - Builders only append children; the tree cannot form cycles

pub mod codes;
pub mod sanitize;

use std::fmt;
use std::panic::Location;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use codes::*;

/// Result alias used throughout the pipeline.
pub type Result<T> = std::result::Result<T, Error>;

/// A failure surfaced by a pipeline phase, with its nested causes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Error {
    /// Internal status; also used as the HTTP status of the error response.
    pub status: u16,
    /// Stable code, optionally followed by `#ARG1#ARG2#` template arguments.
    pub description: String,
    /// Free-form payload (string, list of field errors, remote envelope...).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub message: Value,
    /// `file:line` of the creation site.
    #[serde(default)]
    pub source: String,
    /// The data that triggered the failure, when known.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub input: Value,
    /// Causes attached with [`Error::child`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Error>,
}

impl Error {
    /// Create an error with the given status, code and message.
    #[track_caller]
    pub fn new(status: u16, description: impl Into<String>, message: impl Serialize) -> Self {
        let location = Location::caller();
        Self {
            status,
            description: description.into(),
            message: serde_json::to_value(message).unwrap_or(Value::Null),
            source: format!("{}:{}", location.file(), location.line()),
            input: Value::Null,
            children: Vec::new(),
        }
    }

    /// 400 with the given code.
    #[track_caller]
    pub fn bad_request(description: impl Into<String>, message: impl Serialize) -> Self {
        Self::new(400, description, message)
    }

    /// 500 with the given code.
    #[track_caller]
    pub fn internal(description: impl Into<String>, message: impl Serialize) -> Self {
        Self::new(500, description, message)
    }

    /// Attach a cause.
    pub fn child(mut self, child: Error) -> Self {
        self.children.push(child);
        self
    }

    /// Attach a foreign error as a cause, keeping this error's status.
    #[track_caller]
    pub fn child_err(self, err: &dyn std::error::Error) -> Self {
        let status = self.status;
        self.child(Error::new(status, ERROR_CAUSE, err.to_string()))
    }

    /// Record the data that triggered this error.
    pub fn input(mut self, input: impl Serialize) -> Self {
        self.input = serde_json::to_value(input).unwrap_or(Value::Null);
        self
    }

    /// The code part of the description (text before the first `#`).
    pub fn code(&self) -> &str {
        self.description
            .split('#')
            .next()
            .unwrap_or(self.description.as_str())
    }

    /// Single-line diagnostic form: `desc#source#input#message#status`.
    pub fn ws_response(&self) -> String {
        format!(
            "{}#{}#{}#{}#{}",
            self.description,
            self.source,
            compact(&self.input),
            compact(&self.message),
            self.status
        )
    }

    /// Grouped value for structured logging; children expand recursively.
    pub fn log_value(&self) -> Value {
        let mut group = Map::new();
        group.insert("status".into(), Value::from(self.status));
        group.insert("description".into(), Value::from(self.description.clone()));
        group.insert("source".into(), Value::from(self.source.clone()));
        if !self.message.is_null() {
            group.insert("message".into(), self.message.clone());
        }
        if !self.input.is_null() {
            group.insert("input".into(), self.input.clone());
        }
        if !self.children.is_empty() {
            group.insert(
                "children".into(),
                Value::Array(self.children.iter().map(Error::log_value).collect()),
            );
        }
        Value::Object(group)
    }

    /// Errors without children, depth first. A childless error is its own leaf.
    pub fn leaves(&self) -> Vec<&Error> {
        if self.children.is_empty() {
            return vec![self];
        }
        self.children.iter().flat_map(Error::leaves).collect()
    }
}

fn compact(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description, self.status)?;
        if let Value::String(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_points_at_caller() {
        let err = Error::bad_request("SOME_CODE", "boom");
        assert!(err.source.ends_with(&format!("{}", line!() - 1)));
        assert!(err.source.contains("errors/mod.rs"));
    }

    #[test]
    fn test_ws_response_format() {
        let err = Error::new(404, "NO_DATA_FOUND", "nothing").input(json!({"id": 1}));
        let rendered = err.ws_response();
        let parts: Vec<&str> = rendered.split('#').collect();
        assert_eq!(parts[0], "NO_DATA_FOUND");
        assert_eq!(parts[2], r#"{"id":1}"#);
        assert_eq!(parts[3], "nothing");
        assert_eq!(parts[4], "404");
    }

    #[test]
    fn test_children_and_leaves() {
        let err = Error::internal("OUTER", "outer")
            .child(Error::internal("MIDDLE", "m").child(Error::internal("INNER", "i")))
            .child(Error::bad_request("SIBLING", "s"));

        let leaves: Vec<&str> = err.leaves().iter().map(|e| e.code()).collect();
        assert_eq!(leaves, vec!["INNER", "SIBLING"]);

        let logged = err.log_value();
        assert_eq!(logged["children"][0]["children"][0]["description"], "INNER");
    }

    #[test]
    fn test_code_strips_template_arguments() {
        let err = Error::bad_request("LIMIT_EXCEEDED#100#200#", Value::Null);
        assert_eq!(err.code(), "LIMIT_EXCEEDED");
    }

    #[test]
    fn test_child_err_keeps_status() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = Error::internal(DB_READ_ERROR, "read failed").child_err(&io);
        assert_eq!(err.children[0].status, 500);
        assert_eq!(err.children[0].message, json!("disk gone"));
    }
}
