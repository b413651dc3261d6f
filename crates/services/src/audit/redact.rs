// Path: crates/services/src/audit/redact.rs

//! Field-pattern redaction for audit snapshots.
//!
//! Matching is by key name, case-insensitive substring. The replacement is
//! a fixed marker so a redacted snapshot is visibly redacted. Redaction on
//! a snapshot without sensitive fields is the identity.

use serde_json::Value;

/// The marker written over redacted values.
pub const REDACTED_MARKER: &str = "[REDACTED]";

/// Key patterns treated as sensitive by default.
const DEFAULT_PATTERNS: &[&str] = &[
    "password",
    "secret",
    "token",
    "apikey",
    "api_key",
    "credential",
    "authorization",
    "private",
];

/// Redacts sensitive fields from JSON snapshots.
#[derive(Debug, Clone)]
pub struct Redactor {
    patterns: Vec<String>,
}

impl Default for Redactor {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Redactor {
    /// Creates a redactor with custom patterns, lowercased for matching.
    pub fn new(patterns: Vec<String>) -> Self {
        Self {
            patterns: patterns.into_iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    fn key_is_sensitive(&self, key: &str) -> bool {
        let lowered = key.to_lowercase();
        self.patterns.iter().any(|p| lowered.contains(p.as_str()))
    }

    /// Redacts a snapshot, returning the scrubbed value and the dotted
    /// paths that were replaced.
    pub fn redact(&self, snapshot: Value) -> (Value, Vec<String>) {
        let mut redacted_paths = Vec::new();
        let scrubbed = self.walk(snapshot, String::new(), &mut redacted_paths);
        (scrubbed, redacted_paths)
    }

    fn walk(&self, value: Value, path: String, redacted: &mut Vec<String>) -> Value {
        match value {
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, child) in map {
                    let child_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", path, key)
                    };
                    if self.key_is_sensitive(&key) {
                        redacted.push(child_path);
                        out.insert(key, Value::String(REDACTED_MARKER.into()));
                    } else {
                        out.insert(key, self.walk(child, child_path, redacted));
                    }
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| self.walk(item, format!("{}[{}]", path, i), redacted))
                    .collect(),
            ),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clean_snapshot_is_identity() {
        let redactor = Redactor::default();
        let snapshot = json!({"campaignId": "camp_1", "amount": 10.5});
        let (scrubbed, paths) = redactor.redact(snapshot.clone());
        assert_eq!(scrubbed, snapshot);
        assert!(paths.is_empty());
    }

    #[test]
    fn nested_and_cased_keys_are_caught() {
        let redactor = Redactor::default();
        let (scrubbed, paths) = redactor.redact(json!({
            "connection": {
                "ApiKey": "sk-123",
                "endpoint": "https://api.example.com"
            },
            "items": [{"accessToken": "t"}]
        }));
        assert_eq!(scrubbed["connection"]["ApiKey"], REDACTED_MARKER);
        assert_eq!(scrubbed["connection"]["endpoint"], "https://api.example.com");
        assert_eq!(scrubbed["items"][0]["accessToken"], REDACTED_MARKER);
        assert_eq!(
            paths,
            vec![
                "connection.ApiKey".to_string(),
                "items[0].accessToken".to_string()
            ]
        );
    }

    #[test]
    fn custom_patterns_replace_defaults() {
        let redactor = Redactor::new(vec!["ssn".into()]);
        let (scrubbed, paths) = redactor.redact(json!({"ssn": "123-45-6789", "password": "x"}));
        assert_eq!(scrubbed["ssn"], REDACTED_MARKER);
        // "password" is not in the custom list.
        assert_eq!(scrubbed["password"], "x");
        assert_eq!(paths, vec!["ssn".to_string()]);
    }
}
