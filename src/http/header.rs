//! Request header parsing (static rules or the dynamic YAML table).

use std::collections::BTreeMap;

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::headers::{HeaderConfig, HeaderField};
use crate::errors::{self, Error, Result};
use crate::validation::{FieldError, FieldRule, Validator};

pub const REQUEST_ID: &str = "Request-Id";
pub const PROGRAM_ID: &str = "Program-Id";
pub const MODULE_ID: &str = "Module-Id";
pub const METHOD_ID: &str = "Method-Id";
pub const USER_ID: &str = "User-Id";
pub const BRANCH_ID: &str = "Branch-Id";
pub const BANK_ID: &str = "Bank-Id";
pub const PERSON_ID: &str = "Person-Id";

const ID_MIN_LEN: usize = 10;
const ID_MAX_LEN: usize = 64;

/// Identity and tenant fields of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    pub id: String,
    pub program: String,
    pub module: String,
    pub method: String,
    pub user: String,
    pub branch: String,
    pub bank: String,
    pub person: String,
    /// Dynamic entries that are not core fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl RequestHeader {
    /// Read the core headers without any rule.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };
        Self {
            id: get(REQUEST_ID),
            program: get(PROGRAM_ID),
            module: get(MODULE_ID),
            method: get(METHOD_ID),
            user: get(USER_ID),
            branch: get(BRANCH_ID),
            bank: get(BANK_ID),
            person: get(PERSON_ID),
            extra: BTreeMap::new(),
        }
    }

    /// Parse and validate.
    ///
    /// With `validate` off a missing id becomes a fresh uuid and no rule runs.
    /// With a header table the dynamic rules apply; otherwise the id must be
    /// 10 to 64 characters.
    pub fn parse(
        headers: &HeaderMap,
        config: Option<&HeaderConfig>,
        validate: bool,
        validator: &Validator,
    ) -> Result<Self> {
        if !validate {
            let mut header = match config {
                Some(config) => Self::apply_table(headers, config).0,
                None => Self::from_headers(headers),
            };
            if header.id.is_empty() {
                header.id = uuid::Uuid::new_v4().to_string();
            }
            return Ok(header);
        }

        let (header, mut failures) = match config {
            Some(config) => Self::apply_table(headers, config),
            None => (Self::from_headers(headers), Vec::new()),
        };

        if header.id.is_empty() {
            return Err(Error::bad_request(
                errors::HEADER_ABSENT,
                vec![FieldError {
                    code: errors::REQUIRED_FIELD.to_string(),
                    description: format!("{} is a required field", REQUEST_ID),
                }],
            ));
        }

        match config {
            Some(config) => failures.extend(Self::custom_rules(&header, config, validator)),
            None => {
                let len = header.id.chars().count();
                if !(ID_MIN_LEN..=ID_MAX_LEN).contains(&len) {
                    failures.push(FieldError {
                        code: errors::INVALID_INPUT_DATA.to_string(),
                        description: format!(
                            "{} must be between {} and {} characters",
                            REQUEST_ID, ID_MIN_LEN, ID_MAX_LEN
                        ),
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(header)
        } else {
            Err(Error::bad_request(errors::HEADER_VALIDATION_FAILED, failures))
        }
    }

    /// Resolve every table entry; returns the header and length/required failures.
    fn apply_table(headers: &HeaderMap, config: &HeaderConfig) -> (Self, Vec<FieldError>) {
        let mut header = Self::from_headers(headers);
        let mut failures = Vec::new();

        for (section, name, field) in config.entries() {
            let header_name = header_name(name, field);
            let value = headers
                .get(header_name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .or_else(|| field.default_value.clone())
                .unwrap_or_default();

            if value.is_empty() {
                if HeaderConfig::is_mandatory(section, field) && name != "id" {
                    failures.push(FieldError {
                        code: errors::REQUIRED_FIELD.to_string(),
                        description: format!("{} is a required field", header_name),
                    });
                }
            } else {
                let len = value.chars().count();
                if field.min_length.is_some_and(|min| len < min)
                    || field.max_length.is_some_and(|max| len > max)
                {
                    failures.push(FieldError {
                        code: errors::INVALID_INPUT_DATA.to_string(),
                        description: format!(
                            "{} must be between {} and {} characters",
                            header_name,
                            field.min_length.unwrap_or(0),
                            field.max_length.map(|m| m.to_string()).unwrap_or_else(|| "any".into())
                        ),
                    });
                }
            }
            header.set(name, value);
        }
        (header, failures)
    }

    fn custom_rules(header: &Self, config: &HeaderConfig, validator: &Validator) -> Vec<FieldError> {
        let mut root = Map::new();
        let mut rules = Vec::new();
        for (_, name, field) in config.entries() {
            let Some(rule) = field.validation_rule.as_deref().filter(|r| !r.is_empty()) else {
                continue;
            };
            let header_name = header_name(name, field);
            root.insert(header_name.to_string(), Value::from(header.get(name).unwrap_or_default()));
            rules.push(FieldRule::new(header_name, format!("omitempty,{}", rule)));
        }
        if rules.is_empty() {
            return Vec::new();
        }
        validator
            .validate_value(&Value::Object(root), &rules)
            .err()
            .unwrap_or_default()
    }

    /// Value of a core field or a dynamic entry.
    pub fn get(&self, name: &str) -> Option<&str> {
        let value = match name {
            "id" => &self.id,
            "program" => &self.program,
            "module" => &self.module,
            "method" => &self.method,
            "user" => &self.user,
            "branch" => &self.branch,
            "bank" => &self.bank,
            "person" => &self.person,
            other => return self.extra.get(other).map(String::as_str),
        };
        Some(value.as_str())
    }

    fn set(&mut self, name: &str, value: String) {
        match name {
            "id" => self.id = value,
            "program" => self.program = value,
            "module" => self.module = value,
            "method" => self.method = value,
            "user" => self.user = value,
            "branch" => self.branch = value,
            "bank" => self.bank = value,
            "person" => self.person = value,
            other => {
                self.extra.insert(other.to_string(), value);
            }
        }
    }

    pub fn set_user(&mut self, user: impl Into<String>) {
        self.user = user.into();
    }

    pub fn set_program(&mut self, program: impl Into<String>) {
        self.program = program.into();
    }

    pub fn set_module(&mut self, module: impl Into<String>) {
        self.module = module.into();
    }

    pub fn set_method(&mut self, method: impl Into<String>) {
        self.method = method.into();
    }
}

fn header_name<'a>(name: &'a str, field: &'a HeaderField) -> &'a str {
    if field.header_name.is_empty() {
        name
    } else {
        field.header_name.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::headers::parse_header_config;
    use axum::http::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(
                HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_static(v),
            );
        }
        map
    }

    #[test]
    fn test_static_rule() {
        let validator = Validator::new();
        let ok = RequestHeader::parse(
            &headers(&[("Request-Id", "0123456789"), ("User-Id", "testuser"), ("Branch-Id", "12345")]),
            None,
            true,
            &validator,
        )
        .unwrap();
        assert_eq!(ok.user, "testuser");
        assert_eq!(ok.branch, "12345");

        let err = RequestHeader::parse(&headers(&[("User-Id", "u")]), None, true, &validator).unwrap_err();
        assert_eq!(err.description, errors::HEADER_ABSENT);
        assert_eq!(err.status, 400);

        let err = RequestHeader::parse(&headers(&[("Request-Id", "short")]), None, true, &validator)
            .unwrap_err();
        assert_eq!(err.description, errors::HEADER_VALIDATION_FAILED);
    }

    #[test]
    fn test_without_validation_generates_id() {
        let header = RequestHeader::parse(&HeaderMap::new(), None, false, &Validator::new()).unwrap();
        assert!(uuid::Uuid::parse_str(&header.id).is_ok());
    }

    #[test]
    fn test_dynamic_table() {
        let config = parse_header_config(
            r#"
required:
  id: { headerName: Request-Id, minLength: 10, maxLength: 64 }
  user: { headerName: User-Id }
optional:
  branch: { headerName: Branch-Id, defaultValue: "00000" }
custom:
  channel: { headerName: X-Channel, validationRule: "oneof=web mobile" }
"#,
        )
        .unwrap();
        let validator = Validator::new();

        let header = RequestHeader::parse(
            &headers(&[("Request-Id", "0123456789"), ("User-Id", "u1"), ("X-Channel", "web")]),
            Some(&config),
            true,
            &validator,
        )
        .unwrap();
        assert_eq!(header.branch, "00000");
        assert_eq!(header.extra["channel"], "web");

        let err = RequestHeader::parse(
            &headers(&[("Request-Id", "0123456789"), ("X-Channel", "fax")]),
            Some(&config),
            true,
            &validator,
        )
        .unwrap_err();
        assert_eq!(err.description, errors::HEADER_VALIDATION_FAILED);
        let codes: Vec<String> = err.message
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["code"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(codes, vec![errors::REQUIRED_FIELD, errors::INVALID_INPUT_DATA]);
    }
}
