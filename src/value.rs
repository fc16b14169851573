//! Property values and the structured values parsed from configuration files.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Metadata key recording which property source supplied a value.
pub const SOURCE_META: &str = "source";

/// A resolved configuration entry travelling through the pipeline.
///
/// Produced by the combination policy, transformed by filters and finally
/// handed to the converters. A `value` of `None` means the entry was removed
/// (by a filter) or never found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValue {
    key: String,
    value: Option<String>,
    metadata: BTreeMap<String, String>,
}

impl PropertyValue {
    /// Creates a value supplied by the named source.
    pub fn of(key: impl Into<String>, value: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(SOURCE_META.to_string(), source.into());
        Self {
            key: key.into(),
            value: Some(value.into()),
            metadata,
        }
    }

    /// Creates an entry whose value has been removed.
    pub fn removed(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Name of the source that supplied the value, if recorded.
    pub fn source(&self) -> Option<&str> {
        self.meta(SOURCE_META)
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Returns true when the entry carries no value.
    pub fn is_removed(&self) -> bool {
        self.value.is_none()
    }

    /// Returns a copy with a new value and the same key and metadata.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Returns a copy with the value cleared.
    pub fn without_value(mut self) -> Self {
        self.value = None;
        self
    }

    /// Returns a copy with an extra metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Consumes the entry and returns its value.
    pub fn into_value(self) -> Option<String> {
        self.value
    }
}

/// Structured value as read from a configuration file, before flattening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// String value
    String(String),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// Array of values
    Array(Vec<ConfigValue>),
    /// Object/map of key-value pairs
    Object(HashMap<String, ConfigValue>),
    /// Null value
    Null,
}

impl ConfigValue {
    /// Coerces a scalar to its string form. Containers render as markers.
    pub fn coerce_to_string(&self) -> String {
        match self {
            ConfigValue::String(s) => s.clone(),
            ConfigValue::Integer(i) => i.to_string(),
            ConfigValue::Float(f) => f.to_string(),
            ConfigValue::Boolean(b) => b.to_string(),
            ConfigValue::Array(_) => "[array]".to_string(),
            ConfigValue::Object(_) => "[object]".to_string(),
            ConfigValue::Null => "".to_string(),
        }
    }

    fn is_scalar(&self) -> bool {
        !matches!(self, ConfigValue::Array(_) | ConfigValue::Object(_))
    }

    /// Flattens a tree of values into dotted keys.
    ///
    /// Nested objects become `parent.child`. Arrays of scalars become one
    /// comma-joined value (commas inside elements escaped as `\,`); arrays
    /// holding objects or arrays become indexed keys `parent.N...`.
    pub fn flatten(root: &HashMap<String, ConfigValue>) -> HashMap<String, String> {
        let mut out = HashMap::new();
        for (key, value) in root {
            flatten_into(key, value, &mut out);
        }
        out
    }
}

fn flatten_into(prefix: &str, value: &ConfigValue, out: &mut HashMap<String, String>) {
    match value {
        ConfigValue::Object(obj) => {
            for (key, nested) in obj {
                flatten_into(&format!("{prefix}.{key}"), nested, out);
            }
        }
        ConfigValue::Array(items) if items.iter().all(ConfigValue::is_scalar) => {
            let joined = items
                .iter()
                .map(|item| item.coerce_to_string().replace(',', "\\,"))
                .collect::<Vec<_>>()
                .join(",");
            out.insert(prefix.to_string(), joined);
        }
        ConfigValue::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                flatten_into(&format!("{prefix}.{index}"), nested, out);
            }
        }
        ConfigValue::Null => {}
        scalar => {
            out.insert(prefix.to_string(), scalar.coerce_to_string());
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Integer(i)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Boolean(b)
    }
}
