//! Masking of sensitive values before they leave the engine.
//!
//! Keys are compared after lowercasing and dropping separators, so
//! `apiKey`, `api_key` and `API-KEY` all match.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Replacement for sensitive values.
pub const MASK: &str = "********";

const SENSITIVE: &[&str] = &["password", "passwd", "secret", "token", "apikey"];

static QUOTED_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(["'][\w\-]*(?:password|passwd|secret|token|api[_\-]?key)[\w\-]*["']\s*:\s*)(?:"(?:[^"\\]|\\.)*"|'[^']*')"#,
    )
    .expect("valid regex")
});

static BARE_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b([\w\-]*(?:password|passwd|secret|token|api[_\-]?key)[\w\-]*\s*[=:]\s*)([^\s,;&"']+)"#,
    )
    .expect("valid regex")
});

/// Whether a key names a sensitive field.
pub fn is_sensitive_key(key: &str) -> bool {
    let normalized: String = key
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    SENSITIVE.iter().any(|s| normalized.contains(s))
}

/// Return a copy of `value` with every sensitive field masked, at any depth.
pub fn mask_value(value: &Value) -> Value {
    let mut copy = value.clone();
    mask_in_place(&mut copy);
    copy
}

/// Mask sensitive fields of `value` in place.
pub fn mask_in_place(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if is_sensitive_key(key) && !v.is_null() {
                    *v = Value::String(MASK.to_string());
                } else {
                    mask_in_place(v);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(mask_in_place),
        _ => {}
    }
}

/// Mask `key: value` and `key=value` pairs inside free text.
pub fn mask_text(text: &str) -> String {
    let quoted = QUOTED_PAIR.replace_all(text, format!("${{1}}\"{}\"", MASK));
    BARE_PAIR
        .replace_all(&quoted, format!("${{1}}{}", MASK))
        .into_owned()
}

#[cfg(test)]
#[path = "mask_tests.rs"]
mod tests;
