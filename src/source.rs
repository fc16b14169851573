//! Property source abstraction, ordering and snapshot utilities.

use crate::error::ConfigResult;
use crate::value::PropertyValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Reserved key a source may define to declare its own ordinal.
pub const ORDINAL_KEY: &str = "tamaya.ordinal";

/// A named, prioritized provider of string key/value pairs.
///
/// Implementations may be slow or fail (remote stores); the pipeline treats
/// an `Err` from [`get`](PropertySource::get) as "key not found" and logs it.
pub trait PropertySource: Send + Sync {
    /// Returns a human-readable name for this configuration source.
    fn name(&self) -> &str;

    /// Priority of this source; higher ordinals win.
    ///
    /// The default reads [`ORDINAL_KEY`] from the source itself and falls
    /// back to `0`.
    fn ordinal(&self) -> i32 {
        ordinal_from_source(self, 0)
    }

    /// Looks up a single key.
    fn get(&self, key: &str) -> ConfigResult<Option<PropertyValue>>;

    /// Returns a snapshot of every entry this source can enumerate.
    fn properties(&self) -> ConfigResult<HashMap<String, PropertyValue>>;

    /// Whether [`properties`](PropertySource::properties) returns the full
    /// content. Non-scannable sources only answer direct lookups.
    fn is_scannable(&self) -> bool {
        true
    }

    /// Implementation type name, used to break ordinal ties.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Reads [`ORDINAL_KEY`] from `source`, returning `default` when it is
/// missing, unreadable or not an integer.
pub fn ordinal_from_source<S: PropertySource + ?Sized>(source: &S, default: i32) -> i32 {
    match source.get(ORDINAL_KEY) {
        Ok(Some(value)) => match value.value().map(|v| v.trim().parse::<i32>()) {
            Some(Ok(ordinal)) => ordinal,
            Some(Err(_)) => {
                warn!(
                    source = source.name(),
                    value = value.value().unwrap_or_default(),
                    "ignoring non-numeric {ORDINAL_KEY}"
                );
                default
            }
            None => default,
        },
        Ok(None) => default,
        Err(e) => {
            warn!(source = source.name(), error = %e, "failed to read {ORDINAL_KEY}");
            default
        }
    }
}

/// Source ordering and merging utilities.
pub mod utils {
    use super::*;
    use std::cmp::Ordering;
    use std::collections::BTreeSet;

    /// Compares two sources: descending ordinal, then ascending type name.
    pub fn compare_sources(a: &dyn PropertySource, b: &dyn PropertySource) -> Ordering {
        b.ordinal()
            .cmp(&a.ordinal())
            .then_with(|| a.type_name().cmp(b.type_name()))
    }

    /// Sorts sources so that the highest ordinal comes first.
    ///
    /// The sort is stable: sources of the same type and ordinal keep their
    /// registration order.
    pub fn sort_sources(sources: &mut [Arc<dyn PropertySource>]) {
        sources.sort_by(|a, b| compare_sources(a.as_ref(), b.as_ref()));
    }

    /// Looks a key up in one source, logging and swallowing failures.
    pub fn lookup(source: &dyn PropertySource, key: &str) -> Option<PropertyValue> {
        match source.get(key) {
            Ok(value) => value.filter(|v| !v.is_removed()),
            Err(e) => {
                warn!(
                    source = source.name(),
                    key,
                    error = %e,
                    "property source failed, treating key as not found"
                );
                None
            }
        }
    }

    /// Reads the full snapshot of one source, logging and swallowing failures.
    pub fn snapshot(source: &dyn PropertySource) -> HashMap<String, PropertyValue> {
        if !source.is_scannable() {
            return HashMap::new();
        }
        match source.properties() {
            Ok(values) => values,
            Err(e) => {
                warn!(source = source.name(), error = %e, "property source failed to list properties");
                HashMap::new()
            }
        }
    }

    /// Collects all unique keys from the scannable sources, sorted.
    pub fn collect_all_keys(sources: &[Arc<dyn PropertySource>]) -> Vec<String> {
        let mut keys = BTreeSet::new();
        for source in sources {
            keys.extend(snapshot(source.as_ref()).into_keys());
        }
        keys.into_iter().collect()
    }
}
