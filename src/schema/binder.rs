//! Binding untyped inbound arguments to a schema.
//!
//! Binding never stops at the first problem: unknown keys, missing required
//! arguments, failed coercions and choice violations are all collected and
//! reported together as one [`ModuleError::InvalidArguments`].

use super::{ArgSpec, ArgType, ArgumentSchema};
use crate::modules::{ModuleError, ModuleParams, ModuleResult};
use crate::redact::{NoLogRegistry, SensitiveString, NO_LOG_MARKER};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::trace;

/// Arguments after binding.
///
/// Every declared argument is present in [`values`](Self::values); unset
/// optional arguments without a default are `null`.
#[derive(Debug, Clone, Default)]
pub struct BoundArgs {
    values: ModuleParams,
    echo: ModuleParams,
    secrets: Vec<SensitiveString>,
}

impl BoundArgs {
    pub fn values(&self) -> &ModuleParams {
        &self.values
    }

    /// A bound value, with `null` reported as absent.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|v| !v.is_null())
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The arguments as they may be shown back to the caller.
    pub fn echo(&self) -> Value {
        Value::Object(self.echo.clone())
    }

    /// Values supplied through `no_log` arguments.
    pub fn secrets(&self) -> &[SensitiveString] {
        &self.secrets
    }

    /// A registry primed with every `no_log` value.
    pub fn redactor(&self) -> NoLogRegistry {
        let registry = NoLogRegistry::new();
        for secret in &self.secrets {
            registry.register(secret.expose());
        }
        registry
    }
}

/// Bind `raw` against `schema`.
pub fn bind(schema: &ArgumentSchema, raw: &ModuleParams) -> ModuleResult<BoundArgs> {
    let mut binder = Binder::default();
    let (values, echo) = binder.bind_object(schema, raw, "");

    if binder.errors.is_empty() {
        trace!("Bound {} arguments", values.len());
        Ok(BoundArgs {
            values,
            echo,
            secrets: binder.secrets,
        })
    } else {
        Err(ModuleError::InvalidArguments(binder.errors))
    }
}

#[derive(Default)]
struct Binder {
    errors: Vec<String>,
    secrets: Vec<SensitiveString>,
}

impl Binder {
    fn bind_object(
        &mut self,
        schema: &ArgumentSchema,
        raw: &Map<String, Value>,
        context: &str,
    ) -> (ModuleParams, ModuleParams) {
        let mut provided: Map<String, Value> = Map::new();
        let mut unknown = Vec::new();
        for (key, value) in raw {
            match schema.resolve(key) {
                Some(name) => {
                    provided.insert(name.to_string(), value.clone());
                }
                None => unknown.push(key.as_str()),
            }
        }
        if !unknown.is_empty() {
            self.errors.push(format!(
                "unsupported parameters{}: {} (supported: {})",
                found_in(context),
                unknown.join(", "),
                schema.names().collect::<Vec<_>>().join(", ")
            ));
        }

        let mut values = ModuleParams::new();
        let mut echo = ModuleParams::new();
        let mut missing = Vec::new();

        for (name, spec) in schema.iter() {
            let path = join(context, name);
            let source = provided
                .get(name)
                .filter(|v| !v.is_null())
                .or(spec.default.as_ref());

            let (value, shown) = match source {
                Some(value) => match self.bind_value(spec, value, &path) {
                    Some(bound) => bound,
                    None => continue,
                },
                None => {
                    if spec.required {
                        missing.push(name);
                    }
                    (Value::Null, Value::Null)
                }
            };
            values.insert(name.to_string(), value);
            echo.insert(name.to_string(), shown);
        }

        if !missing.is_empty() {
            self.errors.push(format!(
                "missing required arguments{}: {}",
                found_in(context),
                missing.join(", ")
            ));
        }

        (values, echo)
    }

    /// Coerce, check choices and recurse. Returns `(value, echo)`, or `None`
    /// after recording an error.
    fn bind_value(&mut self, spec: &ArgSpec, raw: &Value, path: &str) -> Option<(Value, Value)> {
        let coerced = match coerce(spec.arg_type, raw, path) {
            Ok(value) => value,
            Err(message) => {
                self.errors.push(message);
                return None;
            }
        };

        let (value, echo) = match (spec.arg_type, &spec.options) {
            (ArgType::Dict, Some(options)) => {
                let map = coerced.as_object().cloned().unwrap_or_default();
                let (values, echo) = self.bind_object(options, &map, path);
                (Value::Object(values), Value::Object(echo))
            }
            (ArgType::List, _) => self.bind_elements(spec, coerced, path)?,
            _ => (coerced.clone(), coerced),
        };

        if let Some(choices) = &spec.choices {
            let candidates: Vec<&Value> = match &value {
                Value::Array(items) if spec.arg_type == ArgType::List => items.iter().collect(),
                other => vec![other],
            };
            for candidate in candidates {
                if !choices.iter().any(|c| choice_matches(c, candidate)) {
                    self.errors.push(format!(
                        "value of {} must be one of: {}, got: {}",
                        path,
                        choices.iter().map(display).collect::<Vec<_>>().join(", "),
                        display(candidate)
                    ));
                    return None;
                }
            }
        }

        if spec.no_log {
            self.protect(&value);
            return Some((value, Value::String(NO_LOG_MARKER.to_string())));
        }
        Some((value, echo))
    }

    fn bind_elements(&mut self, spec: &ArgSpec, list: Value, path: &str) -> Option<(Value, Value)> {
        let items = match list {
            Value::Array(items) => items,
            other => vec![other],
        };
        let element_type = match (spec.elements, &spec.options) {
            (Some(t), _) => Some(t),
            (None, Some(_)) => Some(ArgType::Dict),
            (None, None) => None,
        };
        let element_spec = element_type.map(|t| ArgSpec {
            arg_type: t,
            options: spec.options.clone(),
            ..ArgSpec::default()
        });

        let mut values = Vec::with_capacity(items.len());
        let mut echoes = Vec::with_capacity(items.len());
        let mut failed = false;
        for (i, item) in items.iter().enumerate() {
            match &element_spec {
                Some(element_spec) => {
                    match self.bind_value(element_spec, item, &format!("{}[{}]", path, i)) {
                        Some((value, echo)) => {
                            values.push(value);
                            echoes.push(echo);
                        }
                        None => failed = true,
                    }
                }
                None => {
                    values.push(item.clone());
                    echoes.push(item.clone());
                }
            }
        }
        if failed {
            return None;
        }
        Some((Value::Array(values), Value::Array(echoes)))
    }

    fn protect(&mut self, value: &Value) {
        match value {
            Value::Null => {}
            Value::String(s) => self.secrets.push(SensitiveString::new(s.clone())),
            Value::Array(items) => items.iter().for_each(|v| self.protect(v)),
            Value::Object(map) => map.values().for_each(|v| self.protect(v)),
            other => self.secrets.push(SensitiveString::new(other.to_string())),
        }
    }
}

fn found_in(context: &str) -> String {
    if context.is_empty() {
        String::new()
    } else {
        format!(" found in {}", context)
    }
}

fn join(context: &str, name: &str) -> String {
    if context.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", context, name)
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn choice_matches(choice: &Value, value: &Value) -> bool {
    match (choice, value) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(a), Value::Number(_)) | (Value::String(a), Value::Bool(_)) => {
            *a == value.to_string()
        }
        (a, b) => a == b,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

fn unconvertible(path: &str, value: &Value, target: ArgType) -> String {
    format!(
        "argument {} is of type {} and cannot be converted to {}",
        path,
        type_name(value),
        target
    )
}

/// Convert a raw value to the declared semantic type.
pub fn coerce(target: ArgType, value: &Value, path: &str) -> Result<Value, String> {
    let fail = || unconvertible(path, value, target);
    match target {
        ArgType::Str => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(_) | Value::Bool(_) => Ok(Value::String(value.to_string())),
            _ => Err(fail()),
        },
        ArgType::Int => match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(Value::from)
                .ok_or_else(fail),
            Value::String(s) => s.trim().parse::<i64>().map(Value::from).map_err(|_| fail()),
            _ => Err(fail()),
        },
        ArgType::Bool => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" | "y" => Ok(Value::Bool(true)),
                "false" | "no" | "off" | "0" | "n" => Ok(Value::Bool(false)),
                _ => Err(fail()),
            },
            Value::Number(n) => match n.as_i64() {
                Some(1) => Ok(Value::Bool(true)),
                Some(0) => Ok(Value::Bool(false)),
                _ => Err(fail()),
            },
            _ => Err(fail()),
        },
        ArgType::Dict => match value {
            Value::Object(_) => Ok(value.clone()),
            Value::String(s) => parse_dict(s).ok_or_else(fail),
            _ => Err(fail()),
        },
        ArgType::List => match value {
            Value::Array(_) => Ok(value.clone()),
            Value::String(s) => Ok(Value::Array(
                s.split(',')
                    .map(|item| Value::String(item.trim().to_string()))
                    .collect(),
            )),
            Value::Number(_) | Value::Bool(_) => Ok(Value::Array(vec![value.clone()])),
            _ => Err(fail()),
        },
        ArgType::Datetime => match value {
            Value::String(s) => parse_datetime(s)
                .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::Secs, true)))
                .ok_or_else(|| {
                    format!(
                        "argument {} is not a valid datetime (expected RFC 3339): {}",
                        path, s
                    )
                }),
            Value::Number(n) => n
                .as_i64()
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::Secs, true)))
                .ok_or_else(fail),
            _ => Err(fail()),
        },
    }
}

/// A JSON object, or `k=v` pairs separated by commas.
fn parse_dict(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return serde_json::from_str::<Value>(trimmed)
            .ok()
            .filter(Value::is_object);
    }
    let mut map = Map::new();
    for pair in trimmed.split(',').filter(|p| !p.trim().is_empty()) {
        let (key, value) = pair.split_once('=')?;
        map.insert(
            key.trim().to_string(),
            Value::String(value.trim().to_string()),
        );
    }
    Some(Value::Object(map))
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}
