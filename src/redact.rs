//! No-log enforcement for sensitive data.
//!
//! Values bound through `no_log` arguments must never reach logs, the
//! invocation echo or the result payload. [`SensitiveString`] keeps a secret
//! out of formatting and serialization; [`NoLogRegistry`] scrubs any string
//! that happens to contain a registered secret.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Echo placeholder for arguments declared `no_log`.
pub const NO_LOG_MARKER: &str = "VALUE_SPECIFIED_IN_NO_LOG_PARAMETER";

/// Replacement text for secrets found inside other strings.
pub const MASK: &str = "********";

/// A string wrapper that prevents the value from being logged.
///
/// When used in format strings or logging, this type will display
/// `[REDACTED]` instead of the actual value. Use `expose()` to
/// access the underlying value when needed.
///
/// # Example
///
/// ```rust,ignore
/// use azrm::redact::SensitiveString;
///
/// let token = SensitiveString::new("eyJ0eXAi...");
///
/// // This logs "[REDACTED]" instead of the token
/// tracing::debug!("Token is: {:?}", token);
///
/// let header = format!("Bearer {}", token.expose());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct SensitiveString {
    value: String,
}

impl SensitiveString {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Expose the underlying value.
    pub fn expose(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl fmt::Display for SensitiveString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveString([REDACTED])")
    }
}

impl From<String> for SensitiveString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SensitiveString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// Serialize without exposing the value
impl serde::Serialize for SensitiveString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> serde::Deserialize<'de> for SensitiveString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

/// Registry of sensitive values to scrub from output.
pub struct NoLogRegistry {
    values: RwLock<HashSet<String>>,
}

impl NoLogRegistry {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashSet::new()),
        }
    }

    /// Register a sensitive value. Empty values are ignored.
    pub fn register(&self, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }
        self.values.write().insert(value);
    }

    pub fn contains_sensitive(&self, text: &str) -> bool {
        let values = self.values.read();
        values.iter().any(|v| text.contains(v.as_str()))
    }

    /// Replace every registered value occurring in `text`.
    pub fn redact(&self, text: &str) -> String {
        let values = self.values.read();
        // Longest first, so a secret containing another is masked whole.
        let mut ordered: Vec<&String> = values.iter().collect();
        ordered.sort_by_key(|v| std::cmp::Reverse(v.len()));

        let mut result = text.to_string();
        for value in ordered {
            if result.contains(value.as_str()) {
                result = result.replace(value.as_str(), MASK);
            }
        }
        result
    }

    /// Scrub every string inside a JSON value, keys included.
    pub fn redact_value(&self, value: &Value) -> Value {
        if self.is_empty() {
            return value.clone();
        }
        match value {
            Value::String(s) => Value::String(self.redact(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact_value(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (self.redact(k), self.redact_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

/// Copy of `value` with the member at each dotted path replaced by
/// [`NO_LOG_MARKER`]. Missing and null members are left alone.
pub fn mask_paths<S: AsRef<str>>(value: &Value, paths: &[S]) -> Value {
    let mut masked = value.clone();
    for path in paths {
        mask_path(&mut masked, path.as_ref());
    }
    masked
}

fn mask_path(value: &mut Value, path: &str) {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let Value::Object(map) = value else {
        return;
    };
    match (map.get_mut(head), rest) {
        (Some(child), Some(rest)) => mask_path(child, rest),
        (Some(child), None) if !child.is_null() => {
            *child = Value::String(NO_LOG_MARKER.to_string());
        }
        _ => {}
    }
}

impl Default for NoLogRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NoLogRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoLogRegistry")
            .field("registered_values", &self.len())
            .finish()
    }
}
