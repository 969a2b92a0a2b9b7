//! Built-in validation tags and field resolution.

use serde_json::Value;

static NULL: Value = Value::Null;

/// What a validation function sees for one field.
#[derive(Debug, Clone, Copy)]
pub struct FieldContext<'a> {
    /// The field value (`Null` when absent).
    pub value: &'a Value,
    /// Text after `=` in the tag, or empty.
    pub param: &'a str,
    /// The object holding the field; used by cross-field tags.
    pub parent: &'a Value,
}

/// A `name=param` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ParsedTag<'a> {
    pub name: &'a str,
    pub param: &'a str,
}

pub(crate) fn parse_tags(tags: &str) -> Vec<ParsedTag<'_>> {
    tags.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| match t.split_once('=') {
            Some((name, param)) => ParsedTag {
                name: name.trim(),
                param: param.trim(),
            },
            None => ParsedTag { name: t, param: "" },
        })
        .collect()
}

/// A resolved field occurrence.
#[derive(Debug)]
pub(crate) struct Located<'a> {
    pub path: String,
    pub value: &'a Value,
    pub parent: &'a Value,
}

/// Resolve a dotted path; `*` fans out over array items.
pub(crate) fn resolve<'a>(root: &'a Value, path: &str) -> Vec<Located<'a>> {
    let mut current = vec![Located {
        path: String::new(),
        value: root,
        parent: root,
    }];

    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let mut next = Vec::new();
        for located in current {
            if segment == "*" {
                if let Value::Array(items) = located.value {
                    for (i, item) in items.iter().enumerate() {
                        next.push(Located {
                            path: format!("{}[{}]", located.path, i),
                            value: item,
                            parent: located.value,
                        });
                    }
                }
                continue;
            }
            let value = located.value.get(segment).unwrap_or(&NULL);
            let path = if located.path.is_empty() {
                segment.to_string()
            } else {
                format!("{}.{}", located.path, segment)
            };
            next.push(Located {
                path,
                value,
                parent: located.value,
            });
        }
        current = next;
    }
    current
}

/// Kind used to pick a kind-specific message (`min.string`, `min.number`...).
pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Array(_) | Value::Object(_) => "items",
        Value::Bool(_) => "bool",
        Value::Null => "null",
    }
}

pub(crate) fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Length for strings and collections, value for numbers.
fn measure(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => Some(s.chars().count() as f64),
        Value::Array(a) => Some(a.len() as f64),
        Value::Object(o) => Some(o.len() as f64),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn compare(ctx: &FieldContext<'_>, ok: impl Fn(f64, f64) -> bool) -> bool {
    if ctx.value.is_null() {
        return true;
    }
    match (measure(ctx.value), ctx.param.parse::<f64>()) {
        (Some(actual), Ok(limit)) => ok(actual, limit),
        _ => false,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text_check(ctx: &FieldContext<'_>, ok: impl Fn(&str) -> bool) -> bool {
    match ctx.value {
        Value::Null => true,
        Value::String(s) => s.is_empty() || ok(s),
        _ => false,
    }
}

pub(crate) fn required(ctx: &FieldContext<'_>) -> bool {
    !is_empty(ctx.value)
}

/// `required_if=field value`
pub(crate) fn required_if(ctx: &FieldContext<'_>) -> bool {
    let mut parts = ctx.param.split_whitespace();
    let (Some(field), Some(expected)) = (parts.next(), parts.next()) else {
        return true;
    };
    let triggered = ctx
        .parent
        .get(field)
        .and_then(as_text)
        .is_some_and(|actual| actual == expected);
    !triggered || required(ctx)
}

/// `required_with=field`
pub(crate) fn required_with(ctx: &FieldContext<'_>) -> bool {
    let triggered = ctx.parent.get(ctx.param).is_some_and(|v| !is_empty(v));
    !triggered || required(ctx)
}

pub(crate) fn min(ctx: &FieldContext<'_>) -> bool {
    compare(ctx, |a, l| a >= l)
}

pub(crate) fn max(ctx: &FieldContext<'_>) -> bool {
    compare(ctx, |a, l| a <= l)
}

pub(crate) fn len(ctx: &FieldContext<'_>) -> bool {
    compare(ctx, |a, l| (a - l).abs() < f64::EPSILON)
}

pub(crate) fn gt(ctx: &FieldContext<'_>) -> bool {
    compare(ctx, |a, l| a > l)
}

pub(crate) fn gte(ctx: &FieldContext<'_>) -> bool {
    min(ctx)
}

pub(crate) fn lt(ctx: &FieldContext<'_>) -> bool {
    compare(ctx, |a, l| a < l)
}

pub(crate) fn lte(ctx: &FieldContext<'_>) -> bool {
    max(ctx)
}

pub(crate) fn eq(ctx: &FieldContext<'_>) -> bool {
    ctx.value.is_null() || as_text(ctx.value).is_some_and(|v| v == ctx.param)
}

pub(crate) fn ne(ctx: &FieldContext<'_>) -> bool {
    ctx.value.is_null() || as_text(ctx.value).is_some_and(|v| v != ctx.param)
}

pub(crate) fn oneof(ctx: &FieldContext<'_>) -> bool {
    if ctx.value.is_null() {
        return true;
    }
    as_text(ctx.value).is_some_and(|v| ctx.param.split_whitespace().any(|allowed| allowed == v))
}

pub(crate) fn numeric(ctx: &FieldContext<'_>) -> bool {
    match ctx.value {
        Value::Number(_) | Value::Null => true,
        Value::String(s) => s.is_empty() || s.parse::<f64>().is_ok(),
        _ => false,
    }
}

pub(crate) fn alpha(ctx: &FieldContext<'_>) -> bool {
    text_check(ctx, |s| s.chars().all(|c| c.is_ascii_alphabetic()))
}

pub(crate) fn alphanum(ctx: &FieldContext<'_>) -> bool {
    text_check(ctx, |s| s.chars().all(|c| c.is_ascii_alphanumeric()))
}

pub(crate) fn email(ctx: &FieldContext<'_>) -> bool {
    text_check(ctx, |s| match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    })
}

pub(crate) fn uuid(ctx: &FieldContext<'_>) -> bool {
    text_check(ctx, |s| uuid::Uuid::parse_str(s).is_ok())
}

pub(crate) fn url(ctx: &FieldContext<'_>) -> bool {
    text_check(ctx, |s| url::Url::parse(s).is_ok())
}
