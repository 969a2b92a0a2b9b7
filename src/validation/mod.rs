//! Struct validation with translated messages.
//!
//! # Data Flow
//! ```text
//! parsed request (any Serialize + Validate)
//!     → serialized to a JSON tree (serde names act as field names)
//!     → rules.rs evaluates each FieldRule's tag list
//!     → registry.rs classifies failed tags (system | custom → error code)
//!     → translate.rs renders the message
//!     → Vec<FieldError> { code, description } for the response envelope
//! ```
//!
//! # Design Decisions
//! - Rules use the familiar `required,min=10,max=64` tag syntax
//! - Field names come from the serialized form, so `#[serde(rename)]` is
//!   what clients see; `FieldRule::hidden` keeps a field out of messages
//! - One registry per `Validator`; `global()` is the process default

pub mod registry;
pub mod rules;
pub mod translate;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use registry::{global, RegistryEntry, TagType, ValidationFn, Validator};
pub use rules::FieldContext;

/// Types validated by the pipeline declare their rules here.
///
/// The default is "no rules", so plain DTOs only need an empty impl.
pub trait Validate {
    fn rules() -> Vec<FieldRule> {
        Vec::new()
    }
}

impl Validate for Value {}
impl Validate for () {}

/// Tag list applied to one (possibly nested) field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    /// Dotted path into the serialized value; `*` walks every array item.
    pub path: String,
    /// Comma-separated tags, e.g. `required,min=10`.
    pub tags: String,
    /// Keep the field name out of rendered messages.
    pub hidden: bool,
}

impl FieldRule {
    pub fn new(path: impl Into<String>, tags: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            tags: tags.into(),
            hidden: false,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// One failed rule as surfaced to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub code: String,
    pub description: String,
}
