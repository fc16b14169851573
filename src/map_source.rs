//! In-memory property source.

use crate::error::ConfigResult;
use crate::source::{ordinal_from_source, PropertySource};
use crate::value::PropertyValue;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

/// Property source backed by an in-memory map.
///
/// Useful for defaults, tests and values changed at runtime through
/// [`set`](Self::set) and [`remove`](Self::remove). Without an explicit
/// ordinal the source honours a `tamaya.ordinal` entry in its own data,
/// else `0`.
#[derive(Debug)]
pub struct MapPropertySource {
    name: String,
    ordinal: Option<i32>,
    data: ArcSwap<HashMap<String, String>>,
}

impl Clone for MapPropertySource {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            ordinal: self.ordinal,
            data: ArcSwap::new(self.data.load_full()),
        }
    }
}

impl MapPropertySource {
    /// Creates a new, empty source.
    ///
    /// # Example
    /// ```
    /// use tamaya::{MapPropertySource, PropertySource};
    ///
    /// let defaults = MapPropertySource::new("defaults")
    ///     .with_value("timeout", "30")
    ///     .with_ordinal(5);
    /// assert_eq!(defaults.ordinal(), 5);
    /// assert_eq!(defaults.len(), 1);
    /// ```
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ordinal: None,
            data: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Creates a source with initial values.
    pub fn with_values<K, V, I>(name: impl Into<String>, values: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            name: name.into(),
            ordinal: None,
            data: ArcSwap::from_pointee(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Adds or replaces one value.
    pub fn with_value(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Sets a value on a live source. Readers see either the old or the new
    /// map, never a partial update.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        self.data.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(key.clone(), value.clone());
            next
        });
    }

    /// Removes a value, returning whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        let previous = self.data.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.remove(key);
            next
        });
        previous.contains_key(key)
    }

    /// Fixes the ordinal, ignoring any `tamaya.ordinal` entry.
    pub fn with_ordinal(mut self, ordinal: i32) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    /// Returns the number of values stored in this source.
    pub fn len(&self) -> usize {
        self.data.load().len()
    }

    /// Returns true if the source contains no values.
    pub fn is_empty(&self) -> bool {
        self.data.load().is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.load().contains_key(key)
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn ordinal(&self) -> i32 {
        self.ordinal
            .unwrap_or_else(|| ordinal_from_source(self, 0))
    }

    fn get(&self, key: &str) -> ConfigResult<Option<PropertyValue>> {
        Ok(self
            .data
            .load()
            .get(key)
            .map(|value| PropertyValue::of(key, value.clone(), self.name.clone())))
    }

    fn properties(&self) -> ConfigResult<HashMap<String, PropertyValue>> {
        Ok(self
            .data
            .load()
            .iter()
            .map(|(key, value)| {
                (
                    key.clone(),
                    PropertyValue::of(key.clone(), value.clone(), self.name.clone()),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_source_is_empty() {
        let source = MapPropertySource::new("empty");
        assert!(source.is_empty());
        assert_eq!(source.ordinal(), 0);
        assert_eq!(source.get("missing").unwrap(), None);
    }

    #[test]
    fn test_values_are_tagged_with_source_name() {
        let source = MapPropertySource::with_values("defaults", [("a", "1"), ("b", "2")]);
        let value = source.get("a").unwrap().unwrap();
        assert_eq!(value.value(), Some("1"));
        assert_eq!(value.source(), Some("defaults"));
        assert_eq!(source.properties().unwrap().len(), 2);
        assert!(source.contains_key("b"));
    }

    #[test]
    fn test_ordinal_from_data_and_explicit_override() {
        let source = MapPropertySource::new("m").with_value("tamaya.ordinal", "42");
        assert_eq!(source.ordinal(), 42);

        let source = source.with_ordinal(7);
        assert_eq!(source.ordinal(), 7);
    }

    #[test]
    fn test_runtime_updates() {
        let source = MapPropertySource::new("runtime").with_value("a", "1");
        let copy = source.clone();

        source.set("a", "2");
        source.set("b", "3");
        assert_eq!(source.get("a").unwrap().unwrap().value(), Some("2"));
        assert_eq!(source.len(), 2);
        assert!(source.remove("b"));
        assert!(!source.remove("b"));

        assert_eq!(copy.get("a").unwrap().unwrap().value(), Some("1"));
        assert_eq!(copy.len(), 1);
    }
}
