//! Message templates for failed validation tags.
//!
//! Templates use `{field}` and `{param}` placeholders. A tag can have
//! kind-specific variants (`min.string`, `min.number`, `min.items`) that win
//! over the plain tag entry.

use std::collections::HashMap;

/// Locale-bound template table.
#[derive(Debug, Clone)]
pub struct Translator {
    locale: String,
    templates: HashMap<String, String>,
}

impl Translator {
    /// English templates for the built-in tags.
    pub fn english() -> Self {
        let entries = [
            ("required", "{field} is a required field"),
            ("required_if", "{field} is a required field"),
            ("required_with", "{field} is a required field"),
            ("min.string", "{field} must be at least {param} characters in length"),
            ("min.number", "{field} must be {param} or greater"),
            ("min.items", "{field} must contain at least {param} items"),
            ("max.string", "{field} must be a maximum of {param} characters in length"),
            ("max.number", "{field} must be {param} or less"),
            ("max.items", "{field} must contain at maximum {param} items"),
            ("len.string", "{field} must be {param} characters in length"),
            ("len.number", "{field} must be equal to {param}"),
            ("len.items", "{field} must contain {param} items"),
            ("gt", "{field} must be greater than {param}"),
            ("gte", "{field} must be {param} or greater"),
            ("lt", "{field} must be less than {param}"),
            ("lte", "{field} must be {param} or less"),
            ("eq", "{field} is not equal to {param}"),
            ("ne", "{field} should not be equal to {param}"),
            ("oneof", "{field} must be one of [{param}]"),
            ("numeric", "{field} must be a valid numeric value"),
            ("alpha", "{field} can only contain alphabetic characters"),
            ("alphanum", "{field} can only contain alphanumeric characters"),
            ("email", "{field} must be a valid email address"),
            ("uuid", "{field} must be a valid UUID"),
            ("url", "{field} must be a valid URL"),
        ];

        Self {
            locale: "en".to_string(),
            templates: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Add or replace the template for a tag.
    pub fn add(&mut self, tag: impl Into<String>, template: impl Into<String>) {
        self.templates.insert(tag.into(), template.into());
    }

    /// Render the message for a failed tag.
    pub fn translate(&self, tag: &str, kind: &str, field: &str, param: &str) -> String {
        let template = self
            .templates
            .get(&format!("{}.{}", tag, kind))
            .or_else(|| self.templates.get(tag))
            .cloned()
            .unwrap_or_else(|| format!("{{field}} failed on the '{}' tag", tag));

        template
            .replace("{field}", field)
            .replace("{param}", param)
            .trim()
            .to_string()
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::english()
    }
}
