//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the runtime.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::db::DbMode;
use crate::errors::sanitize::DEFAULT_MAX_DESCRIPTION_LEN;

/// Root configuration for the request runtime.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Demo server settings (bind address, limits).
    pub server: ServerConfig,

    /// Log level and output format.
    pub logging: LoggingConfig,

    /// Database connection.
    pub database: DatabaseConfig,

    /// Request log persistence.
    pub request_log: RequestLogConfig,

    /// Message table (`OK` → success text, ...).
    pub messages: BTreeMap<String, String>,

    /// Error code → description template (`TEXT $P1$ TEXT $P2$`).
    pub error_descriptions: BTreeMap<String, String>,

    /// Route every handler through its simulation phase.
    pub simulation: bool,

    /// Resume a caught panic after the fault response is prepared and the
    /// finalizer is spawned, leaving the host's `CatchPanicLayer` to answer.
    ///
    /// Defaults to `false`: the `SYSTEM_FAULT` envelope (or the handler's
    /// recovery response) is returned and the panic stops at the pipeline.
    pub reraise_panics: bool,

    /// Maximum length of client-visible descriptions.
    pub description_max_len: usize,

    /// Remote APIs addressable by name.
    pub apis: BTreeMap<String, ApiConfig>,

    /// Dynamic header configuration (YAML).
    pub header_config_path: Option<String>,

    /// Tracing configuration (YAML).
    pub tracing_config_path: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let mut messages = BTreeMap::new();
        messages.insert("OK".to_string(), DEFAULT_OK_MESSAGE.to_string());
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            database: DatabaseConfig::default(),
            request_log: RequestLogConfig::default(),
            messages,
            error_descriptions: BTreeMap::new(),
            simulation: false,
            reraise_panics: false,
            description_max_len: DEFAULT_MAX_DESCRIPTION_LEN,
            apis: BTreeMap::new(),
            header_config_path: None,
            tracing_config_path: None,
        }
    }
}

/// Success text used when the message table has no `OK` entry.
pub const DEFAULT_OK_MESSAGE: &str = "Operation completed successfully";

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Dialect used for session variables and pagination.
    pub mode: DbMode,

    /// Connection URL.
    pub url: String,

    /// Pool size.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            mode: DbMode::None,
            url: String::new(),
            max_connections: 8,
        }
    }
}

/// Which request log store backs the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestLogStoreKind {
    /// Discard everything.
    None,
    /// Emit the request log as structured log events only.
    #[default]
    Log,
    /// Persist into the `request` table.
    Database,
}

/// Request log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestLogConfig {
    pub store: RequestLogStoreKind,

    /// Lookup by id; any row means duplicate.
    pub check_duplicate_sql: String,

    /// `$1` = full record as JSON, optional `$2` = incoming payload.
    pub insert_sql: String,

    /// `$1` = full record as JSON, `$2` = id, optional `$3` = outgoing payload.
    pub update_sql: String,
}

impl Default for RequestLogConfig {
    fn default() -> Self {
        Self {
            store: RequestLogStoreKind::Log,
            check_duplicate_sql: "SELECT id FROM request WHERE id = $1".to_string(),
            insert_sql: "INSERT INTO request SELECT * FROM json_populate_record(NULL::request, $1::json)"
                .to_string(),
            update_sql: "UPDATE request SET (dt, incoming, action_id, national_id, branch_id, user_id, outgoing, result, events) = \
                (SELECT dt, incoming, action_id, national_id, branch_id, user_id, outgoing, result, events \
                FROM json_populate_record(NULL::request, $1::json)) WHERE id = $2"
                .to_string(),
        }
    }
}

/// Authentication scheme of a remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiAuth {
    /// Forward the caller's Authorization header, if any.
    #[default]
    None,
    /// Basic auth from `username` / `password`.
    Basic,
    /// Bearer token obtained from `token_url` and cached.
    Bearer,
}

/// Remote API definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every call path is appended to.
    pub base_url: String,

    pub auth: ApiAuth,

    pub username: String,

    pub password: String,

    /// Token endpoint for `bearer` auth.
    pub token_url: String,

    /// Per-call timeout in seconds.
    pub timeout_secs: u64,

    /// Reject invalid TLS certificates.
    pub validate_tls: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth: ApiAuth::None,
            username: String::new(),
            password: String::new(),
            token_url: String::new(),
            timeout_secs: 30,
            validate_tls: true,
        }
    }
}
