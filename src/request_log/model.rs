//! The persisted request record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::header::RequestHeader;

/// Shared pointer the handler and the pipeline both append through.
pub type SharedRequestLog = Arc<Mutex<RequestLog>>;

/// One line of a request's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub dt: DateTime<Utc>,
    pub program: String,
    pub module: String,
    pub method: String,
    pub text: String,
}

/// A step of the request (one action), holding its log entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub dt: DateTime<Utc>,
    pub action: String,
    pub branch: String,
    pub user: String,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

/// Row of the `request` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLog {
    pub id: String,
    pub dt: DateTime<Utc>,
    pub incoming: Value,
    pub action_id: String,
    pub national_id: String,
    pub branch_id: String,
    #[serde(default)]
    pub bank_id: String,
    pub user_id: String,
    pub outgoing: Value,
    pub result: String,
    #[serde(default)]
    pub events: Vec<Event>,
}

impl RequestLog {
    /// New record for a parsed request; `action` is the endpoint title.
    pub fn new(header: &RequestHeader, action: &str, incoming: Value) -> Self {
        Self {
            id: header.id.clone(),
            dt: Utc::now(),
            incoming,
            action_id: action.to_string(),
            national_id: header.person.clone(),
            branch_id: header.branch.clone(),
            bank_id: header.bank.clone(),
            user_id: header.user.clone(),
            outgoing: Value::Null,
            result: String::new(),
            events: Vec::new(),
        }
    }

    pub fn shared(self) -> SharedRequestLog {
        Arc::new(Mutex::new(self))
    }

    /// Append an entry to the last event, opening one if none exists.
    pub fn add_log(&mut self, entry: LogEntry) {
        if self.events.is_empty() {
            self.events.push(Event {
                dt: entry.dt,
                action: entry.method.clone(),
                branch: self.branch_id.clone(),
                user: self.user_id.clone(),
                logs: Vec::new(),
            });
        }
        if let Some(last) = self.events.last_mut() {
            last.logs.push(entry);
        }
    }

    /// Record the response; `result` is `OK` or the error code.
    pub fn finish(&mut self, outgoing: Value, result: &str) {
        self.outgoing = outgoing;
        self.result = result.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str) -> LogEntry {
        LogEntry {
            dt: Utc::now(),
            program: "core".into(),
            module: "accounts".into(),
            method: "create".into(),
            text: text.into(),
        }
    }

    #[test]
    fn test_add_log_opens_event() {
        let header = RequestHeader {
            id: "0123456789".into(),
            user: "u1".into(),
            branch: "12345".into(),
            ..RequestHeader::default()
        };
        let mut log = RequestLog::new(&header, "Create Account", serde_json::json!({"a": 1}));
        log.add_log(entry("first"));
        log.add_log(entry("second"));

        assert_eq!(log.events.len(), 1);
        assert_eq!(log.events[0].action, "create");
        assert_eq!(log.events[0].branch, "12345");
        assert_eq!(log.events[0].logs.len(), 2);
    }

    #[test]
    fn test_serialized_columns() {
        let log = RequestLog::new(&RequestHeader::default(), "x", Value::Null);
        let value = serde_json::to_value(&log).unwrap();
        for column in [
            "id", "dt", "incoming", "action_id", "national_id", "branch_id", "user_id", "outgoing",
            "result", "events",
        ] {
            assert!(value.get(column).is_some(), "missing column {}", column);
        }
    }
}
