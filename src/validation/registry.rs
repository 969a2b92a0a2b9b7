//! Validator registry: tag functions, their classification and translations.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use crate::errors::codes::{INVALID_INPUT_DATA, REQUIRED_FIELD};
use crate::validation::rules::{self, FieldContext};
use crate::validation::translate::Translator;
use crate::validation::{FieldError, FieldRule, Validate};

/// A validation function for one tag.
pub type ValidationFn = Arc<dyn Fn(&FieldContext<'_>) -> bool + Send + Sync>;

/// Where a tag came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TagType {
    System,
    Custom,
}

/// Classification of a tag in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEntry {
    #[serde(rename = "type")]
    pub tag_type: TagType,
    pub error_code: String,
}

struct Inner {
    functions: HashMap<String, ValidationFn>,
    registry: HashMap<String, RegistryEntry>,
    translator: Translator,
}

/// Thread-safe validator. Registrations after startup are allowed.
pub struct Validator {
    inner: RwLock<Inner>,
}

static GLOBAL: OnceLock<Arc<Validator>> = OnceLock::new();

/// Process-wide default validator, created on first use.
pub fn global() -> Arc<Validator> {
    GLOBAL.get_or_init(|| Arc::new(Validator::new())).clone()
}

impl Validator {
    /// A validator with every built-in tag registered as a system tag.
    pub fn new() -> Self {
        let system: [(&str, fn(&FieldContext<'_>) -> bool); 19] = [
            ("required", rules::required),
            ("required_if", rules::required_if),
            ("required_with", rules::required_with),
            ("min", rules::min),
            ("max", rules::max),
            ("len", rules::len),
            ("gt", rules::gt),
            ("gte", rules::gte),
            ("lt", rules::lt),
            ("lte", rules::lte),
            ("eq", rules::eq),
            ("ne", rules::ne),
            ("oneof", rules::oneof),
            ("numeric", rules::numeric),
            ("alpha", rules::alpha),
            ("alphanum", rules::alphanum),
            ("email", rules::email),
            ("uuid", rules::uuid),
            ("url", rules::url),
        ];

        let mut functions: HashMap<String, ValidationFn> = HashMap::new();
        let mut registry = HashMap::new();
        for (tag, f) in system {
            functions.insert(tag.to_string(), Arc::new(f));
            let error_code = if tag.starts_with("required") {
                REQUIRED_FIELD
            } else {
                INVALID_INPUT_DATA
            };
            registry.insert(
                tag.to_string(),
                RegistryEntry {
                    tag_type: TagType::System,
                    error_code: error_code.to_string(),
                },
            );
        }

        Self {
            inner: RwLock::new(Inner {
                functions,
                registry,
                translator: Translator::english(),
            }),
        }
    }

    /// Start registering a custom tag.
    pub fn register_validation<F>(&self, tag: impl Into<String>, f: F) -> Registration<'_>
    where
        F: Fn(&FieldContext<'_>) -> bool + Send + Sync + 'static,
    {
        Registration {
            validator: self,
            tag: tag.into(),
            function: Arc::new(f),
            translation: None,
            error_code: None,
        }
    }

    /// Registry classification of a tag, if known.
    pub fn registry_entry(&self, tag: &str) -> Option<RegistryEntry> {
        self.inner.read().registry.get(tag).cloned()
    }

    /// Error code surfaced for a failed tag. Unknown tags count as custom.
    pub fn error_code_for(&self, tag: &str) -> String {
        self.registry_entry(tag)
            .map(|e| e.error_code)
            .unwrap_or_else(|| INVALID_INPUT_DATA.to_string())
    }

    /// Validate a value against its declared rules.
    pub fn validate<T: Serialize + Validate>(&self, value: &T) -> Result<(), Vec<FieldError>> {
        let rules = T::rules();
        if rules.is_empty() {
            return Ok(());
        }
        let tree = serde_json::to_value(value).unwrap_or(Value::Null);
        self.validate_value(&tree, &rules)
    }

    /// Validate a JSON tree against explicit rules. Returns every failure.
    pub fn validate_value(&self, root: &Value, field_rules: &[FieldRule]) -> Result<(), Vec<FieldError>> {
        let inner = self.inner.read();
        let mut errors = Vec::new();

        for rule in field_rules {
            let tags = rules::parse_tags(&rule.tags);
            for located in rules::resolve(root, &rule.path) {
                for tag in &tags {
                    if tag.name == "omitempty" {
                        if rules::is_empty(located.value) {
                            break;
                        }
                        continue;
                    }

                    let Some(function) = inner.functions.get(tag.name) else {
                        tracing::warn!(tag = %tag.name, field = %located.path, "Unknown validation tag ignored");
                        continue;
                    };

                    let ctx = FieldContext {
                        value: located.value,
                        param: tag.param,
                        parent: located.parent,
                    };
                    if function(&ctx) {
                        continue;
                    }

                    let field = if rule.hidden { "" } else { located.path.as_str() };
                    let code = inner
                        .registry
                        .get(tag.name)
                        .map(|e| e.error_code.clone())
                        .unwrap_or_else(|| INVALID_INPUT_DATA.to_string());
                    errors.push(FieldError {
                        code,
                        description: inner.translator.translate(
                            tag.name,
                            rules::kind_of(located.value),
                            field,
                            tag.param,
                        ),
                    });
                    // First failing tag per field, like the usual validators.
                    break;
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Replace the translation of any tag.
    pub fn set_translation(&self, tag: impl Into<String>, template: impl Into<String>) {
        self.inner.write().translator.add(tag, template);
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Validator")
            .field("tags", &inner.functions.len())
            .field("locale", &inner.translator.locale())
            .finish()
    }
}

/// Two-phase registration of a custom tag.
pub struct Registration<'a> {
    validator: &'a Validator,
    tag: String,
    function: ValidationFn,
    translation: Option<String>,
    error_code: Option<String>,
}

impl Registration<'_> {
    /// Message template (`{field}`, `{param}`).
    pub fn with_translation(mut self, template: impl Into<String>) -> Self {
        self.translation = Some(template.into());
        self
    }

    /// Code surfaced when the tag fails; defaults to `INVALID-INPUT-DATA`.
    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    /// Commit the registration.
    pub fn build(self) {
        let mut inner = self.validator.inner.write();
        inner.functions.insert(self.tag.clone(), self.function);
        inner.registry.insert(
            self.tag.clone(),
            RegistryEntry {
                tag_type: TagType::Custom,
                error_code: self
                    .error_code
                    .unwrap_or_else(|| INVALID_INPUT_DATA.to_string()),
            },
        );
        if let Some(template) = self.translation {
            inner.translator.add(self.tag.clone(), template);
        }
        tracing::debug!(tag = %self.tag, "Custom validation registered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;

    #[derive(Serialize)]
    struct Transfer {
        id: String,
        #[serde(rename = "cardPin")]
        pin: String,
        amount: i64,
    }

    impl Validate for Transfer {
        fn rules() -> Vec<FieldRule> {
            vec![
                FieldRule::new("id", "required,min=10,max=64"),
                FieldRule::new("cardPin", "required,len=4").hidden(),
                FieldRule::new("amount", "gt=0"),
            ]
        }
    }

    #[test]
    fn test_valid_struct_passes() {
        let v = Validator::new();
        let t = Transfer {
            id: "0123456789".into(),
            pin: "1234".into(),
            amount: 10,
        };
        assert!(v.validate(&t).is_ok());
    }

    #[test]
    fn test_system_tag_classification() {
        let v = Validator::new();
        let t = Transfer {
            id: String::new(),
            pin: "12".into(),
            amount: 0,
        };
        let errors = v.validate(&t).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].code, REQUIRED_FIELD);
        assert_eq!(errors[0].description, "id is a required field");
        assert_eq!(errors[1].code, INVALID_INPUT_DATA);
        assert!(!errors[1].description.contains("cardPin"));
        assert_eq!(errors[2].description, "amount must be greater than 0");
    }

    #[test]
    fn test_custom_registration() {
        let v = Validator::new();
        v.register_validation("iban", |ctx| {
            ctx.value.as_str().is_some_and(|s| s.starts_with("IR"))
        })
        .with_translation("{field} must be a valid IBAN")
        .with_error_code("INVALID-IBAN")
        .build();

        let entry = v.registry_entry("iban").unwrap();
        assert_eq!(entry.tag_type, TagType::Custom);

        let errors = v
            .validate_value(&json!({"account": "DE89"}), &[FieldRule::new("account", "required,iban")])
            .unwrap_err();
        assert_eq!(errors[0].code, "INVALID-IBAN");
        assert_eq!(errors[0].description, "account must be a valid IBAN");
    }

    #[test]
    fn test_unknown_tag_defaults_to_custom_code() {
        let v = Validator::new();
        assert!(v.registry_entry("nope").is_none());
        assert_eq!(v.error_code_for("nope"), INVALID_INPUT_DATA);
    }

    #[test]
    fn test_omitempty_skips_absent_fields() {
        let v = Validator::new();
        let rules = [FieldRule::new("nick", "omitempty,min=3")];
        assert!(v.validate_value(&json!({}), &rules).is_ok());
        assert!(v.validate_value(&json!({"nick": "ab"}), &rules).is_err());
    }

    #[test]
    fn test_global_is_shared() {
        let a = global();
        let b = global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
