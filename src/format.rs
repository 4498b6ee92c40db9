//! Result formatters: projections from an ARM representation to the
//! published output shape.
//!
//! Catalog descriptors declare a list of field projections; code can
//! substitute a custom function instead. Missing intermediate nodes project
//! to `null` (or the declared default) rather than failing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Custom projection function.
pub type FormatFn = fn(&Value) -> Value;

/// One published field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ProjectionSpec")]
pub struct FieldProjection {
    /// Output key.
    pub name: String,
    /// Dotted path into the observed value, e.g. `properties.startIpAddress`.
    pub path: String,
    /// When set, the value at `path` is read as an ARM resource id and the
    /// segment following this one is published (`resourceGroups` → group).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_segment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Accepted catalog spellings of a projection.
#[derive(Deserialize)]
#[serde(untagged)]
enum ProjectionSpec {
    /// `- id` publishes `id` under its own name.
    Path(String),
    Field {
        name: String,
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        id_segment: Option<String>,
        #[serde(default)]
        default: Option<Value>,
    },
}

impl From<ProjectionSpec> for FieldProjection {
    fn from(spec: ProjectionSpec) -> Self {
        match spec {
            ProjectionSpec::Path(path) => {
                let name = path.rsplit('.').next().unwrap_or(&path).to_string();
                Self {
                    name,
                    path,
                    id_segment: None,
                    default: None,
                }
            }
            ProjectionSpec::Field {
                name,
                path,
                id_segment,
                default,
            } => {
                let path = path.unwrap_or_else(|| {
                    if id_segment.is_some() {
                        "id".to_string()
                    } else {
                        name.clone()
                    }
                });
                Self {
                    name,
                    path,
                    id_segment,
                    default,
                }
            }
        }
    }
}

impl FieldProjection {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            id_segment: None,
            default: None,
        }
    }

    fn project(&self, observed: &Value) -> Value {
        let value = lookup(observed, &self.path);
        let value = match (&self.id_segment, value) {
            (Some(segment), Some(Value::String(id))) => id_segment(id, segment).map(Value::String),
            (Some(_), _) => None,
            (None, value) => value.cloned(),
        };
        value
            .filter(|v| !v.is_null())
            .or_else(|| self.default.clone())
            .unwrap_or(Value::Null)
    }
}

/// Per-resource output projection.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<FieldProjection>", into = "Vec<FieldProjection>")]
pub struct Formatter {
    fields: Vec<FieldProjection>,
    custom: Option<FormatFn>,
}

impl Formatter {
    pub fn fields(fields: Vec<FieldProjection>) -> Self {
        Self {
            fields,
            custom: None,
        }
    }

    /// A formatter implemented in code.
    pub fn custom(f: FormatFn) -> Self {
        Self {
            fields: Vec::new(),
            custom: Some(f),
        }
    }

    /// Project `observed`. With no fields and no function the value is
    /// published unchanged.
    pub fn format(&self, observed: &Value) -> Value {
        if let Some(f) = self.custom {
            return f(observed);
        }
        if self.fields.is_empty() {
            return observed.clone();
        }
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|field| (field.name.clone(), field.project(observed)))
            .collect();
        Value::Object(map)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

impl From<Vec<FieldProjection>> for Formatter {
    fn from(fields: Vec<FieldProjection>) -> Self {
        Self::fields(fields)
    }
}

impl From<Formatter> for Vec<FieldProjection> {
    fn from(formatter: Formatter) -> Self {
        formatter.fields
    }
}

impl fmt::Debug for Formatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Formatter")
            .field("fields", &self.fields)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

/// Follow a dotted path; numeric segments index into sequences.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Value following `segment` in an ARM id, matched case-insensitively.
pub fn id_segment(id: &str, segment: &str) -> Option<String> {
    let mut parts = id.split('/').filter(|p| !p.is_empty());
    while let Some(part) = parts.next() {
        if part.eq_ignore_ascii_case(segment) {
            return parts.next().map(str::to_string);
        }
    }
    None
}
