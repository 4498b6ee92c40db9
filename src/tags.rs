//! Tag reconciliation and tag filters.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Resource tags, in the order ARM returned or the user wrote them.
pub type Tags = IndexMap<String, String>;

/// How desired tags combine with the tags already on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagMode {
    /// Desired tags are the complete set.
    #[default]
    Replace,
    /// Desired tags are laid over the observed ones.
    Merge,
}

impl TagMode {
    /// Mode selected by the `append_tags` argument.
    pub fn from_append(append: bool) -> Self {
        if append {
            Self::Merge
        } else {
            Self::Replace
        }
    }
}

/// Outcome of reconciling tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPlan {
    /// Whether the resulting set differs from the observed one.
    pub changed: bool,
    /// The tag set to submit.
    pub tags: Tags,
}

/// Compute the tag set to submit.
///
/// With no desired tags nothing changes and the observed set is kept.
pub fn reconcile(desired: Option<&Tags>, observed: Option<&Tags>, mode: TagMode) -> TagPlan {
    let current = observed.cloned().unwrap_or_default();
    let tags = match (desired, mode) {
        (None, _) => current.clone(),
        (Some(desired), TagMode::Replace) => desired.clone(),
        (Some(desired), TagMode::Merge) => {
            let mut merged = current.clone();
            for (key, value) in desired {
                merged.insert(key.clone(), value.clone());
            }
            merged
        }
    };
    TagPlan {
        // IndexMap equality ignores order.
        changed: tags != current,
        tags,
    }
}

/// Read a tag mapping out of a JSON value, stringifying non-text values.
pub fn from_value(value: &Value) -> Option<Tags> {
    let map = value.as_object()?;
    Some(
        map.iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let text = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), text)
            })
            .collect(),
    )
}

pub fn to_value(tags: &Tags) -> Value {
    Value::Object(
        tags.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

/// One entry of a facts tag filter: `key` or `key:value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    pub key: String,
    pub value: Option<String>,
}

impl TagFilter {
    pub fn matches(&self, tags: &Tags) -> bool {
        match (&self.value, tags.get(&self.key)) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(expected), Some(actual)) => expected == actual,
        }
    }
}

impl FromStr for TagFilter {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.split_once(':') {
            Some((key, value)) => Self {
                key: key.to_string(),
                value: Some(value.to_string()),
            },
            None => Self {
                key: s.to_string(),
                value: None,
            },
        })
    }
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}:{}", self.key, value),
            None => f.write_str(&self.key),
        }
    }
}

/// A candidate passes when every filter entry matches; an empty filter
/// passes everything.
pub fn matches_all(observed: Option<&Tags>, filters: &[TagFilter]) -> bool {
    if filters.is_empty() {
        return true;
    }
    let empty = Tags::new();
    let tags = observed.unwrap_or(&empty);
    filters.iter().all(|f| f.matches(tags))
}
