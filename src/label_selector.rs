//! Label selector parsing and matching for list and watch filtering
//!
//! Parses Kubernetes label selector strings into `kube::core::Selector`, rejecting
//! malformed input with [`Error::InvalidSelector`] the way the API server does.
//!
//! Supported syntax:
//! - Equality: `key=value` or `key==value`
//! - Inequality: `key!=value`
//! - Set-based: `key in (value1,value2)` or `key notin (value1,value2)`
//! - Existence: `key` or `!key`
//! - Requirements joined with commas are ANDed: `key1=value1,key2 in (v2,v3)`

use crate::{Error, Result};
use kube::core::{Expression, Selector, SelectorExt};
use std::collections::{BTreeMap, BTreeSet};

const MAX_NAME_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

/// Split a selector string on commas that are not inside parentheses.
fn split_requirements(selector: &str) -> Result<Vec<&str>> {
    let mut result = Vec::new();
    let mut start = 0;
    let mut depth = 0i32;

    for (i, ch) in selector.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(invalid(selector, "unbalanced ')'"));
                }
            }
            ',' if depth == 0 => {
                result.push(&selector[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(invalid(selector, "unbalanced '('"));
    }
    result.push(&selector[start..]);
    Ok(result)
}

/// Parse a label selector string into a `Selector`.
///
/// An empty (or all-whitespace) selector matches everything.
///
/// # Examples
///
/// ```
/// use kube_fake_clientset::label_selector::parse_label_selector;
///
/// let selector = parse_label_selector("dp=1").unwrap();
/// let selector = parse_label_selector("env in (production,staging),!canary").unwrap();
/// assert!(parse_label_selector("a in b").is_err());
/// ```
pub fn parse_label_selector(selector: &str) -> Result<Selector> {
    if selector.trim().is_empty() {
        return Ok(Selector::default());
    }

    let expressions = split_requirements(selector)?
        .into_iter()
        .map(|requirement| parse_requirement(requirement.trim()))
        .collect::<Result<Vec<_>>>()?;

    Ok(Selector::from_iter(expressions))
}

fn parse_requirement(requirement: &str) -> Result<Expression> {
    if requirement.is_empty() {
        return Err(Error::InvalidSelector(
            "empty requirement in selector".to_string(),
        ));
    }

    if let Some(key) = requirement.strip_prefix('!') {
        let key = key.trim();
        validate_key(key, requirement)?;
        return Ok(Expression::DoesNotExist(key.to_string()));
    }

    let key_end = requirement
        .find(|c: char| c.is_whitespace() || c == '=' || c == '!')
        .unwrap_or(requirement.len());
    let key = &requirement[..key_end];
    validate_key(key, requirement)?;

    let rest = requirement[key_end..].trim_start();
    if rest.is_empty() {
        return Ok(Expression::Exists(key.to_string()));
    }

    if let Some(value) = rest.strip_prefix("==").or_else(|| rest.strip_prefix('=')) {
        let value = value.trim();
        validate_value(value, requirement)?;
        Ok(Expression::Equal(key.to_string(), value.to_string()))
    } else if let Some(value) = rest.strip_prefix("!=") {
        let value = value.trim();
        validate_value(value, requirement)?;
        Ok(Expression::NotEqual(key.to_string(), value.to_string()))
    } else if let Some(values) = strip_operator(rest, "notin") {
        Ok(Expression::NotIn(key.to_string(), parse_set(values, requirement)?))
    } else if let Some(values) = strip_operator(rest, "in") {
        Ok(Expression::In(key.to_string(), parse_set(values, requirement)?))
    } else {
        Err(invalid(requirement, "unknown operator"))
    }
}

/// Strip a word operator that must be followed by whitespace or `(`.
fn strip_operator<'a>(rest: &'a str, op: &str) -> Option<&'a str> {
    let operand = rest.strip_prefix(op)?;
    if operand.starts_with(|c: char| c.is_whitespace() || c == '(') {
        Some(operand.trim())
    } else {
        None
    }
}

fn parse_set(operand: &str, requirement: &str) -> Result<BTreeSet<String>> {
    let inner = operand
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| invalid(requirement, "set values must be enclosed in parentheses"))?;

    let values = inner
        .split(',')
        .map(str::trim)
        .map(|value| validate_value(value, requirement).map(|_| value.to_string()))
        .collect::<Result<BTreeSet<_>>>()?;

    if values.iter().all(String::is_empty) {
        return Err(invalid(requirement, "set must contain at least one value"));
    }
    Ok(values)
}

fn validate_key(key: &str, requirement: &str) -> Result<()> {
    let name = match key.rsplit_once('/') {
        Some((prefix, name)) => {
            if prefix.is_empty() || prefix.len() > MAX_PREFIX_LEN || !is_dns_subdomain(prefix) {
                return Err(invalid(requirement, "invalid key prefix"));
            }
            name
        }
        None => key,
    };

    if name.is_empty() || name.len() > MAX_NAME_LEN || !is_label_token(name) {
        return Err(invalid(requirement, "invalid key"));
    }
    Ok(())
}

fn validate_value(value: &str, requirement: &str) -> Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    if value.len() > MAX_NAME_LEN || !is_label_token(value) {
        return Err(invalid(requirement, "invalid value"));
    }
    Ok(())
}

/// Alphanumeric at both ends, with `-`, `_` or `.` allowed in between.
fn is_label_token(s: &str) -> bool {
    let bytes = s.as_bytes();
    let edge_ok = |b: &u8| b.is_ascii_alphanumeric();
    bytes.first().is_some_and(edge_ok)
        && bytes.last().is_some_and(edge_ok)
        && bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

fn is_dns_subdomain(s: &str) -> bool {
    s.split('.').all(|part| {
        let bytes = part.as_bytes();
        let edge_ok = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
        bytes.first().is_some_and(edge_ok)
            && bytes.last().is_some_and(edge_ok)
            && bytes
                .iter()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
    })
}

fn invalid(requirement: &str, reason: &str) -> Error {
    Error::InvalidSelector(format!("{}: {:?}", reason, requirement))
}

/// Match labels against a label selector string.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use kube_fake_clientset::label_selector::matches_label_selector;
///
/// let labels = BTreeMap::from([("dp".to_string(), "1".to_string())]);
///
/// assert!(matches_label_selector(&labels, "dp=1").unwrap());
/// assert!(!matches_label_selector(&labels, "dp in (2,3)").unwrap());
/// ```
pub fn matches_label_selector(labels: &BTreeMap<String, String>, selector: &str) -> Result<bool> {
    let selector = parse_label_selector(selector)?;
    Ok(selector.matches(labels))
}
