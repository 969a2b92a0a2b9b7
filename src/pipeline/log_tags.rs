//! Per-request structured log tags, flushed as one event.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

pub const HANDLER_GROUP: &str = "handler";
pub const ERROR_LIST: &str = "error-list";
pub const CALL_API: &str = "call-api";

/// Tag groups (`group → key → value`) and arrays (`name → [value]`).
#[derive(Debug, Clone, Default)]
pub struct LogTags {
    groups: BTreeMap<String, Map<String, Value>>,
    arrays: BTreeMap<String, Vec<Value>>,
}

impl LogTags {
    /// Tags with the declared groups and arrays present, even if left empty.
    pub fn declared(groups: &[String], arrays: &[String]) -> Self {
        let mut tags = Self::default();
        for group in groups {
            tags.groups.entry(group.clone()).or_default();
        }
        for array in arrays {
            tags.arrays.entry(array.clone()).or_default();
        }
        tags
    }

    pub fn add(&mut self, group: &str, key: &str, value: impl Into<Value>) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    pub fn push(&mut self, array: &str, value: impl Into<Value>) {
        self.arrays
            .entry(array.to_string())
            .or_default()
            .push(value.into());
    }

    pub fn group(&self, group: &str) -> Option<&Map<String, Value>> {
        self.groups.get(group)
    }

    pub fn array(&self, array: &str) -> Option<&[Value]> {
        self.arrays.get(array).map(Vec::as_slice)
    }

    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        for (name, group) in &self.groups {
            out.insert(name.clone(), Value::Object(group.clone()));
        }
        for (name, items) in &self.arrays {
            out.insert(name.clone(), Value::Array(items.clone()));
        }
        Value::Object(out)
    }

    /// Emit everything collected so far.
    pub fn flush(&self, title: &str, failed: bool) {
        let tags = self.to_value();
        if failed {
            tracing::warn!(handler = %title, tags = %tags, "Request failed");
        } else {
            tracing::info!(handler = %title, tags = %tags, "Request finished");
        }
    }
}
