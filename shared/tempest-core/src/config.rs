//! Configuration helpers for microservices
//!
//! Services read their settings through a lookup function so that the same
//! parsing runs against the process environment or a fixed map in tests.
//! Empty values count as unset.

use crate::error::{Result, TempestError};
use std::fmt::Display;
use std::str::FromStr;

/// Lookup backed by the process environment
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn lookup_non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

/// String value or a default
pub fn string_var<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup_non_empty(lookup, key).unwrap_or_else(|| default.to_string())
}

/// String value if present
pub fn optional_var<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup_non_empty(lookup, key)
}

/// String value that must be present
pub fn require_var<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup_non_empty(lookup, key)
        .ok_or_else(|| TempestError::Config(format!("{} must be set", key)))
}

/// Parsed value or a default
pub fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup_non_empty(lookup, key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| TempestError::Config(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}

/// Boolean flag; unset means false
pub fn flag_var<F>(lookup: &F, key: &str) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup_non_empty(lookup, key) {
        None => Ok(false),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(TempestError::Config(format!(
                "Invalid {}: expected a boolean, got {:?}",
                key, other
            ))),
        },
    }
}
