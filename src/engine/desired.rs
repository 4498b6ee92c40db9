//! Building the desired state from bound arguments.

use super::ResourceDescriptor;
use crate::arm::Coordinates;
use crate::compare;
use crate::modules::{ModuleError, ModuleResult, ParamExt};
use crate::schema::BoundArgs;
use crate::tags::{self, TagMode, Tags};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Common argument names injected into every mutating schema.
pub const STATE_ARG: &str = "state";
pub const TAGS_ARG: &str = "tags";
pub const APPEND_TAGS_ARG: &str = "append_tags";

/// Whether the resource should exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    #[default]
    Present,
    Absent,
}

impl FromStr for Intent {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            other => Err(ModuleError::InvalidParameter(format!(
                "state must be 'present' or 'absent', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Present => write!(f, "present"),
            Intent::Absent => write!(f, "absent"),
        }
    }
}

/// What the user asked for, built once per invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredState {
    pub coordinates: Coordinates,
    /// Attributes to submit; `null` members are unmanaged.
    pub body: Value,
    pub tags: Option<Tags>,
    pub tag_mode: TagMode,
    pub intent: Intent,
    pub dry_run: bool,
}

impl DesiredState {
    /// Assemble the desired state of `descriptor` from bound arguments.
    pub fn from_args(
        descriptor: &ResourceDescriptor,
        args: &BoundArgs,
        dry_run: bool,
    ) -> ModuleResult<Self> {
        let values = args.values();

        let mut coordinates = Coordinates::new();
        for name in &descriptor.coordinates {
            coordinates.push(name.clone(), values.get_string_required(name)?);
        }

        let mut body = if descriptor.fixed_body.is_object() {
            descriptor.fixed_body.clone()
        } else {
            Value::Object(Map::new())
        };
        for (argument, path) in &descriptor.body {
            if let Some(value) = args.get(argument) {
                let overlay = nest(path, value.clone());
                body = compare::merge(&body, &overlay);
            }
        }

        let intent = match values.get_string(STATE_ARG)? {
            Some(state) => state.parse()?,
            None => Intent::default(),
        };

        let tags = if descriptor.supports_tags {
            args.get(TAGS_ARG).and_then(tags::from_value)
        } else {
            None
        };
        let tag_mode = match values.get_bool(APPEND_TAGS_ARG)? {
            Some(append) => TagMode::from_append(append),
            None => descriptor.tag_mode,
        };

        Ok(Self {
            coordinates,
            body,
            tags,
            tag_mode,
            intent,
            dry_run,
        })
    }
}

/// Wrap `value` so it sits at the dotted `path`.
fn nest(path: &str, value: Value) -> Value {
    path.rsplit('.').fold(value, |inner, segment| {
        let mut map = Map::new();
        map.insert(segment.to_string(), inner);
        Value::Object(map)
    })
}
