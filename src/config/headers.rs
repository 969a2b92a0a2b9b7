//! Dynamic request-header configuration (YAML).
//!
//! ```yaml
//! required:
//!   id: { headerName: Request-Id, required: true, minLength: 10, maxLength: 64 }
//! optional:
//!   branch: { headerName: Branch-Id, defaultValue: "00000" }
//! custom:
//!   channel: { headerName: X-Channel, validationRule: "oneof=web mobile" }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::loader::ConfigError;

/// Environment variable pointing at the header configuration.
pub const HEADER_CONFIG_ENV: &str = "HEADER_CONFIG_PATH";

/// Paths tried, in order, when the environment variable is unset.
pub const HEADER_CONFIG_FALLBACKS: [&str; 3] = [
    "config/dynamic_headers.yaml",
    "dynamic_headers.yaml",
    "./config/dynamic_headers.yaml",
];

/// Rules for one header field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct HeaderField {
    /// HTTP header carrying the value; defaults to the entry name.
    pub header_name: String,
    pub required: bool,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub default_value: Option<String>,
    /// Extra validator tags, e.g. `numeric,len=5`.
    pub validation_rule: Option<String>,
    pub description: String,
}

/// Section an entry was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderSection {
    Required,
    Optional,
    Custom,
}

/// The three-section header table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HeaderConfig {
    pub required: BTreeMap<String, HeaderField>,
    pub optional: BTreeMap<String, HeaderField>,
    pub custom: BTreeMap<String, HeaderField>,
}

impl HeaderConfig {
    /// Every entry with its section; required entries first.
    pub fn entries(&self) -> impl Iterator<Item = (HeaderSection, &str, &HeaderField)> + '_ {
        tagged(HeaderSection::Required, &self.required)
            .chain(tagged(HeaderSection::Optional, &self.optional))
            .chain(tagged(HeaderSection::Custom, &self.custom))
    }

    /// Whether the entry must resolve to a non-empty value.
    pub fn is_mandatory(section: HeaderSection, field: &HeaderField) -> bool {
        section == HeaderSection::Required || field.required
    }
}

fn tagged(
    section: HeaderSection,
    map: &BTreeMap<String, HeaderField>,
) -> impl Iterator<Item = (HeaderSection, &str, &HeaderField)> + '_ {
    map.iter().map(move |(name, field)| (section, name.as_str(), field))
}

/// Parse a header configuration from YAML text.
pub fn parse_header_config(yaml: &str) -> Result<HeaderConfig, ConfigError> {
    Ok(serde_yaml::from_str(yaml)?)
}

/// Load a header configuration file.
pub fn load_header_config(path: &Path) -> Result<HeaderConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_header_config(&content)
}

/// `HEADER_CONFIG_PATH`, else the first existing fallback path.
pub fn resolve_header_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(HEADER_CONFIG_ENV) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    HEADER_CONFIG_FALLBACKS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}
