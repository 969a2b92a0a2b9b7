//! Tracing manager and its configuration.
//!
//! # Responsibilities
//! - Load tracing settings from YAML, then `TRACING_*` environment overrides
//! - Decide per request whether a root span records (sampling)
//! - Hold the process-wide manager the trace wrappers consult
//!
//! # Design Decisions
//! - Spans are `tracing` spans; the subscriber installed by `logging.rs`
//!   is the `stdout` exporter, collector exporters are wired by the host
//! - Disabled or unsampled requests get `Span::none()`, which keeps every
//!   wrapper on its fast path

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tracing::Span;

use crate::config::ConfigError;

pub const TRACING_ENV_PREFIX: &str = "TRACING_";

/// Where finished spans go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Exporter {
    #[default]
    Stdout,
    Jaeger,
    Zipkin,
    None,
}

impl std::str::FromStr for Exporter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stdout" => Ok(Exporter::Stdout),
            "jaeger" => Ok(Exporter::Jaeger),
            "zipkin" => Ok(Exporter::Zipkin),
            "none" => Ok(Exporter::None),
            other => Err(format!("unknown exporter '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    pub exporter: Exporter,
    pub jaeger_endpoint: String,
    pub zipkin_endpoint: String,
    /// Fraction of requests traced, 0.0 to 1.0.
    pub sampling_ratio: f64,
    pub enabled: bool,
    /// Extra attributes recorded on every root span.
    pub attributes: BTreeMap<String, String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "request-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            exporter: Exporter::Stdout,
            jaeger_endpoint: String::new(),
            zipkin_endpoint: String::new(),
            sampling_ratio: 1.0,
            enabled: false,
            attributes: BTreeMap::new(),
        }
    }
}

impl TracingConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// YAML file (optional) followed by environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_yaml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env(std::env::vars());
        Ok(config)
    }

    /// Apply `TRACING_*` overrides; unparseable values are ignored with a warning.
    pub fn apply_env<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(TRACING_ENV_PREFIX) else {
                continue;
            };
            match name {
                "SERVICE_NAME" => self.service_name = value,
                "SERVICE_VERSION" => self.service_version = value,
                "ENVIRONMENT" => self.environment = value,
                "JAEGER_ENDPOINT" => self.jaeger_endpoint = value,
                "ZIPKIN_ENDPOINT" => self.zipkin_endpoint = value,
                "EXPORTER" => match value.parse() {
                    Ok(exporter) => self.exporter = exporter,
                    Err(e) => tracing::warn!(error = %e, "Ignoring TRACING_EXPORTER"),
                },
                "SAMPLING_RATIO" => match value.parse::<f64>() {
                    Ok(ratio) => self.sampling_ratio = ratio.clamp(0.0, 1.0),
                    Err(_) => tracing::warn!(value = %value, "Ignoring TRACING_SAMPLING_RATIO"),
                },
                "ENABLED" => self.enabled = matches!(value.as_str(), "true" | "1" | "yes"),
                other => {
                    if let Some(attr) = other.strip_prefix("ATTR_") {
                        self.attributes.insert(attr.to_ascii_lowercase(), value);
                    }
                }
            }
        }
    }
}

/// Decides which requests are traced and opens their root spans.
#[derive(Debug)]
pub struct TracingManager {
    config: TracingConfig,
}

impl TracingManager {
    pub fn new(config: TracingConfig) -> Self {
        match config.exporter {
            Exporter::Jaeger | Exporter::Zipkin if config.enabled => tracing::warn!(
                exporter = ?config.exporter,
                "Collector exporter must be installed by the host subscriber"
            ),
            _ => {}
        }
        Self { config }
    }

    pub fn config(&self) -> &TracingConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.config.exporter != Exporter::None
    }

    fn sampled(&self) -> bool {
        let ratio = self.config.sampling_ratio;
        ratio >= 1.0 || (ratio > 0.0 && fastrand::f64() < ratio)
    }

    /// Root span of one request, or `Span::none()` when not traced.
    pub fn root_span(&self, name: &str, request_id: &str) -> Span {
        if !self.is_enabled() || !self.sampled() {
            return Span::none();
        }
        let span = tracing::info_span!(
            "request",
            otel.name = %name,
            request_id = %request_id,
            service.name = %self.config.service_name,
            service.version = %self.config.service_version,
            deployment.environment = %self.config.environment,
            attributes = tracing::field::Empty,
        );
        if !self.config.attributes.is_empty() {
            span.record("attributes", tracing::field::debug(&self.config.attributes));
        }
        span
    }
}

static GLOBAL: OnceLock<Arc<TracingManager>> = OnceLock::new();

/// Register the process-wide manager. Only the first call takes effect.
pub fn set_global_manager(manager: Arc<TracingManager>) -> bool {
    GLOBAL.set(manager).is_ok()
}

/// The registered manager, if any.
pub fn global_manager() -> Option<Arc<TracingManager>> {
    GLOBAL.get().cloned()
}
