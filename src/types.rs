use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// A typed task parameter value.
///
/// The type of a parameter is fixed by its declared default; overrides given
/// as strings are coerced to that type (see [`ParamValue::coerce`]).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "integer",
            ParamValue::Float(_) => "float",
            ParamValue::Str(_) => "string",
        }
    }

    /// Parse `raw` as a value of the same type as `self`.
    pub fn coerce(&self, raw: &str) -> Result<ParamValue, String> {
        let trimmed = raw.trim();
        match self {
            ParamValue::Str(_) => Ok(ParamValue::Str(raw.to_string())),
            ParamValue::Int(_) => trimmed
                .parse::<i64>()
                .map(ParamValue::Int)
                .map_err(|e| format!("expected an integer, got {raw:?}: {e}")),
            ParamValue::Float(_) => trimmed
                .parse::<f64>()
                .map(ParamValue::Float)
                .map_err(|e| format!("expected a float, got {raw:?}: {e}")),
            ParamValue::Bool(_) => match trimmed.to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(ParamValue::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(ParamValue::Bool(false)),
                _ => Err(format!("expected a boolean, got {raw:?}")),
            },
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(n) => Some(*n),
            ParamValue::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(n) => write!(f, "{n}"),
            ParamValue::Float(n) => write!(f, "{n}"),
            ParamValue::Str(s) => f.write_str(s),
        }
    }
}

/// Named, typed parameters of one task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskParams {
    values: BTreeMap<String, ParamValue>,
}

impl TaskParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Declare (or redeclare) a parameter with its default value.
    pub fn declare(&mut self, key: impl Into<String>, default: ParamValue) {
        self.values.insert(key.into(), default);
    }

    /// Add every parameter of `other` not declared here yet.
    pub fn merge_missing(&mut self, other: TaskParams) {
        for (key, value) in other.values {
            self.values.entry(key).or_insert(value);
        }
    }

    /// Replace the value of an existing parameter with `raw`, coerced to the
    /// declared type.
    pub fn set_from_str(&mut self, key: &str, raw: &str) -> Result<(), String> {
        let current = self
            .values
            .get_mut(key)
            .ok_or_else(|| format!("unknown parameter '{key}'"))?;
        *current = current
            .coerce(raw)
            .map_err(|e| format!("parameter '{key}': {e}"))?;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, ParamValue)> for TaskParams {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// A `--set task.key=value` override from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamOverride {
    pub task: String,
    pub key: String,
    pub value: String,
}

impl FromStr for ParamOverride {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (target, value) = s
            .split_once('=')
            .ok_or_else(|| format!("invalid override {s:?} (expected TASK.KEY=VALUE)"))?;
        let (task, key) = target
            .rsplit_once('.')
            .ok_or_else(|| format!("invalid override {s:?} (expected TASK.KEY=VALUE)"))?;

        if task.is_empty() || key.is_empty() {
            return Err(format!(
                "invalid override {s:?} (task and key must be non-empty)"
            ));
        }

        Ok(Self {
            task: task.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}
