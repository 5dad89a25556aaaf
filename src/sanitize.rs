use std::borrow::Cow;
use std::sync::OnceLock;

use http::{HeaderMap, HeaderValue};
use regex::Regex;
use serde_json::Value;

static REGEX: OnceLock<Regex> = OnceLock::new();

fn regex() -> &'static Regex {
    REGEX.get_or_init(|| {
        let s = ["secret", "key", "pkey", "session", "password", "token"]
            .map(|s| format!(r#"(\b|[-_]){s}(\b|[-_])"#))
            .join("|");

        Regex::new(&format!(r#"(?i)({s})"#)).expect("Unable to compile regex")
    })
}

pub static SANITIZED_VALUE: &str = "**********";

fn as_lowercase(s: &str) -> Cow<str> {
    if s.bytes().any(|b| b.is_ascii_uppercase()) {
        Cow::Owned(s.to_ascii_lowercase())
    } else {
        Cow::Borrowed(s)
    }
}

/// `access` and `refresh` are the token fields of the auth endpoints.
pub fn should_sanitize(key: &str) -> bool {
    let key = as_lowercase(key);
    match key.as_ref() {
        "authorization" | "cookie" | "set-cookie" | "password" | "access" | "refresh" => true,
        _ => regex().is_match(key.as_ref()),
    }
}

pub fn sanitize_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                if should_sanitize(key) {
                    *value = Value::String(SANITIZED_VALUE.to_string());
                } else {
                    sanitize_value(value);
                }
            }
        }
        Value::Array(vec) => {
            for value in vec.iter_mut() {
                sanitize_value(value);
            }
        }
        _ => {}
    }
}

pub fn sanitize_headers(headers: &mut HeaderMap) {
    let sanitized = HeaderValue::from_static(SANITIZED_VALUE);
    for (key, value) in headers.iter_mut() {
        if should_sanitize(key.as_str()) {
            *value = sanitized.clone();
        }
    }
}
