//! The JSON response envelope and the message tables behind it.
//!
//! ```text
//! { "status": 0, "description": "<OK text>", "result": {...} }
//! { "status": 400, "description": "Validation Failed",
//!   "errors": [ { "code": "REQUIRED-FIELD", "description": "id is a required field" } ] }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::schema::{RuntimeConfig, DEFAULT_OK_MESSAGE};
use crate::errors::sanitize::{sanitize_description, sanitize_text};
use crate::errors::Error;

/// Local holding the handler's [`Receipt`].
pub const RECEIPT_LOCAL: &str = "receipt";

/// Wire envelope of every pipeline response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsResponse {
    /// 0 on success, the error status otherwise.
    pub status: i32,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorItem>>,
    #[serde(default, rename = "printReceipt", skip_serializing_if = "Option::is_none")]
    pub print_receipt: Option<Receipt>,
}

/// One client-visible error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorItem {
    pub code: String,
    pub description: Value,
}

/// A printable receipt handlers attach under the `receipt` local.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: String,
    pub title: String,
    pub rows: Vec<ReceiptRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRow {
    pub key: String,
    pub value: String,
}

/// `messages` and `error_descriptions` from the runtime config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageTables {
    pub messages: BTreeMap<String, String>,
    pub error_descriptions: BTreeMap<String, String>,
}

impl MessageTables {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            messages: config.messages.clone(),
            error_descriptions: config.error_descriptions.clone(),
        }
    }

    /// Success description.
    pub fn ok_message(&self) -> String {
        self.messages
            .get("OK")
            .cloned()
            .unwrap_or_else(|| DEFAULT_OK_MESSAGE.to_string())
    }

    /// Render `CODE#ARG1#ARG2#` against the table; `None` when the code is unknown.
    pub fn describe(&self, description: &str) -> Option<String> {
        let mut parts = description.split('#');
        let code = parts.next()?;
        let template = self.error_descriptions.get(code)?;
        let args: Vec<&str> = parts.filter(|p| !p.is_empty()).collect();
        Some(render_template(template, &args))
    }
}

/// Replace `$P1$`, `$P2$`, ... with the positional arguments.
pub fn render_template(template: &str, args: &[&str]) -> String {
    args.iter()
        .enumerate()
        .fold(template.to_string(), |text, (i, arg)| {
            text.replace(&format!("$P{}$", i + 1), arg)
        })
}

/// Client error list for `err`.
///
/// Field-level lists (validation failures) pass through. Otherwise every
/// leaf of the error tree becomes one item, described by the table or, when
/// the code is unknown, by its sanitized message.
pub fn get_errors_array_with_map(err: &Error, tables: &MessageTables, max_len: usize) -> Vec<ErrorItem> {
    if let Some(list) = field_list(&err.message) {
        return list;
    }
    err.leaves()
        .into_iter()
        .map(|leaf| {
            let description = match tables.describe(&leaf.description) {
                Some(text) => Value::from(sanitize_text(&text, max_len)),
                None => match &leaf.message {
                    Value::String(s) => Value::from(sanitize_text(s, max_len)),
                    Value::Null => Value::from(leaf.code().to_string()),
                    other => other.clone(),
                },
            };
            ErrorItem {
                code: leaf.code().to_string(),
                description,
            }
        })
        .collect()
}

fn field_list(message: &Value) -> Option<Vec<ErrorItem>> {
    let items = message.as_array()?;
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|item| {
            Some(ErrorItem {
                code: item.get("code")?.as_str()?.to_string(),
                description: item.get("description")?.clone(),
            })
        })
        .collect()
}

impl WsResponse {
    pub fn success(result: Option<Value>, description: String, receipt: Option<Receipt>) -> Self {
        Self {
            status: 0,
            description,
            result,
            errors: None,
            print_receipt: receipt,
        }
    }

    pub fn failure(err: &Error, tables: &MessageTables, max_len: usize) -> Self {
        Self {
            status: i32::from(err.status),
            description: sanitize_description(&Value::from(err.description.clone()), max_len),
            result: None,
            errors: Some(get_errors_array_with_map(err, tables, max_len)),
            print_receipt: None,
        }
    }
}

/// HTTP status for an error, falling back to 500 for out-of-range values.
pub fn http_status(status: u16) -> axum::http::StatusCode {
    axum::http::StatusCode::from_u16(status)
        .ok()
        .filter(|s| !s.is_informational())
        .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR)
}
