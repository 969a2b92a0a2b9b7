//! Static checks on command text before anything reaches the driver.

use std::collections::BTreeSet;

use crate::errors::{self, Error};

/// Number of positional placeholders (`$n`, `:n` or `?`) outside string literals.
///
/// Numbered placeholders count once per distinct index, so `$1 ... $1` is one.
pub fn count_placeholders(sql: &str) -> usize {
    let chars: Vec<char> = sql.chars().collect();
    let mut numbered = BTreeSet::new();
    let mut anonymous = 0;
    let mut in_literal = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_literal {
            if c == '\'' {
                in_literal = false;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' => in_literal = true,
            '?' => anonymous += 1,
            '$' | ':' => {
                // `::type` casts are not placeholders.
                let cast = c == ':' && (chars.get(i + 1) == Some(&':') || i > 0 && chars[i - 1] == ':');
                let digits: String = chars[i + 1..]
                    .iter()
                    .take_while(|d| d.is_ascii_digit())
                    .collect();
                if !cast && !digits.is_empty() {
                    numbered.insert(digits.parse::<u32>().unwrap_or(0));
                    i += digits.len();
                }
            }
            _ => {}
        }
        i += 1;
    }

    numbered.len() + anonymous
}

/// The first SQL keyword, lower-cased, skipping whitespace, comments and `(`.
pub fn leading_verb(sql: &str) -> Option<String> {
    let mut rest = sql.trim_start();
    loop {
        if let Some(stripped) = rest.strip_prefix("--") {
            rest = stripped.split_once('\n').map(|(_, r)| r).unwrap_or("").trim_start();
        } else if let Some(stripped) = rest.strip_prefix("/*") {
            rest = stripped.split_once("*/").map(|(_, r)| r).unwrap_or("").trim_start();
        } else if let Some(stripped) = rest.strip_prefix('(') {
            rest = stripped.trim_start();
        } else {
            break;
        }
    }
    let verb: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if verb.is_empty() {
        None
    } else {
        Some(verb.to_ascii_lowercase())
    }
}

/// Fail with `COMMAND_ARGUMENT_ERROR` unless `sql` declares exactly `args` placeholders.
#[track_caller]
pub fn check_arguments(name: &str, sql: &str, args: usize) -> Result<(), Error> {
    let declared = count_placeholders(sql);
    if declared != args {
        return Err(Error::internal(
            errors::COMMAND_ARGUMENT_ERROR,
            format!(
                "command '{}' declares {} placeholders but {} arguments were supplied",
                name, declared, args
            ),
        ));
    }
    Ok(())
}

/// Fail with `COMMAND_ARGUMENT_ERROR` unless the leading verb is one of `allowed`.
#[track_caller]
pub fn check_verb(name: &str, sql: &str, allowed: &[&str]) -> Result<(), Error> {
    match leading_verb(sql) {
        Some(verb) if allowed.contains(&verb.as_str()) => Ok(()),
        found => Err(Error::internal(
            errors::COMMAND_ARGUMENT_ERROR,
            format!(
                "command '{}' starts with '{}', expected one of {:?}",
                name,
                found.unwrap_or_default(),
                allowed
            ),
        )),
    }
}
