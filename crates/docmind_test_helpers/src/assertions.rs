//! Domain-specific assertions for DocMind tests
//!
//! Provides custom predicates and assertion helpers for common
//! test patterns against `docmind`'s CLI output.

use predicates::prelude::*;

/// Assert that stderr does NOT contain any of the given strings.
///
/// Useful for verifying that certain log messages or errors don't appear.
///
/// # Example
///
/// ```rust
/// use docmind_test_helpers::assertions::stderr_not_contains;
/// use predicates::prelude::*;
///
/// let stderr = "indexed 3 documents";
/// assert!(stderr_not_contains(&["ERROR", "WARN"]).eval(stderr));
/// ```
pub fn stderr_not_contains(values: &[&str]) -> impl Predicate<str> {
    let owned_values: Vec<String> = values.iter().map(|&s| s.to_string()).collect();
    predicate::function(move |s: &str| !owned_values.iter().any(|v| s.contains(v.as_str())))
}

/// Assert that a string is a JSON object containing every given top-level key.
///
/// Used against `docmind search --json`/`docmind stats --json` output, which
/// emits a single JSON object per invocation rather than JSON-RPC envelopes.
///
/// # Example
///
/// ```rust
/// use docmind_test_helpers::assertions::json_object_with_keys;
/// use predicates::prelude::*;
///
/// let output = r#"{"results":[],"total":0}"#;
/// assert!(json_object_with_keys(&["results", "total"]).eval(output));
/// ```
pub fn json_object_with_keys(keys: &[&str]) -> impl Predicate<str> {
    let owned_keys: Vec<String> = keys.iter().map(|&s| s.to_string()).collect();
    predicate::function(move |s: &str| {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(s) else {
            return false;
        };
        let Some(object) = value.as_object() else {
            return false;
        };
        owned_keys.iter().all(|key| object.contains_key(key))
    })
}
