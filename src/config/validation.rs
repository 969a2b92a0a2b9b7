//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that referenced resources are usable (database URL, API base URLs)
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RuntimeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{ApiAuth, RequestLogStoreKind, RuntimeConfig};
use crate::db::DbMode;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check a configuration, collecting every problem.
pub fn validate_config(config: &RuntimeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be > 0"));
    }
    if config.description_max_len == 0 {
        errors.push(ValidationError::new("description_max_len", "must be > 0"));
    }

    if config.database.mode != DbMode::None && config.database.url.is_empty() {
        errors.push(ValidationError::new(
            "database.url",
            "required when database.mode is set",
        ));
    }
    if config.request_log.store == RequestLogStoreKind::Database {
        if config.database.mode == DbMode::None {
            errors.push(ValidationError::new(
                "request_log.store",
                "database store needs a database mode",
            ));
        }
        for (field, sql) in [
            ("request_log.check_duplicate_sql", &config.request_log.check_duplicate_sql),
            ("request_log.insert_sql", &config.request_log.insert_sql),
            ("request_log.update_sql", &config.request_log.update_sql),
        ] {
            if sql.trim().is_empty() {
                errors.push(ValidationError::new(field, "must not be empty"));
            }
        }
    }

    for (name, api) in &config.apis {
        let prefix = format!("apis.{}", name);
        if url::Url::parse(&api.base_url).is_err() {
            errors.push(ValidationError::new(
                format!("{}.base_url", prefix),
                format!("'{}' is not a valid URL", api.base_url),
            ));
        }
        if api.timeout_secs == 0 {
            errors.push(ValidationError::new(format!("{}.timeout_secs", prefix), "must be > 0"));
        }
        match api.auth {
            ApiAuth::Basic if api.username.is_empty() => {
                errors.push(ValidationError::new(
                    format!("{}.username", prefix),
                    "required for basic auth",
                ));
            }
            ApiAuth::Bearer if url::Url::parse(&api.token_url).is_err() => {
                errors.push(ValidationError::new(
                    format!("{}.token_url", prefix),
                    "required for bearer auth",
                ));
            }
            _ => {}
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
