//! Property filters and the iterative filter chain.

use crate::value::PropertyValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{trace, warn};

/// Default upper bound on full passes over the filter list.
pub const MAX_FILTER_LOOPS: usize = 10;

/// What a filter sees besides the value it transforms.
pub struct FilterContext<'a> {
    key: &'a str,
    single_value: bool,
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl<'a> FilterContext<'a> {
    /// Context for a single-key lookup. `lookup` resolves other keys to
    /// their raw (unfiltered) values.
    pub fn single(key: &'a str, lookup: &'a dyn Fn(&str) -> Option<String>) -> Self {
        Self {
            key,
            single_value: true,
            lookup,
        }
    }

    /// Context for one entry of a whole-map evaluation.
    pub fn for_map(key: &'a str, lookup: &'a dyn Fn(&str) -> Option<String>) -> Self {
        Self {
            key,
            single_value: false,
            lookup,
        }
    }

    pub fn key(&self) -> &str {
        self.key
    }

    /// False while [`Configuration::properties`](crate::Configuration::properties)
    /// is being evaluated.
    pub fn is_single_value(&self) -> bool {
        self.single_value
    }

    /// Raw value of another key, as merged from the property sources.
    pub fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }
}

/// A transformation applied to a resolved value.
///
/// Returning `None` (or a value without content) removes the entry and ends
/// evaluation. Filters are re-applied until a full pass changes nothing, so
/// they must be idempotent on their own output to converge.
pub trait PropertyFilter: Send + Sync {
    fn filter_property(&self, value: PropertyValue, ctx: &FilterContext<'_>) -> Option<PropertyValue>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Result of running the chain over one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    pub value: Option<PropertyValue>,
    /// Number of passes executed, `0` for an empty chain.
    pub passes: usize,
    /// False when the pass cap was hit while filters still changed the value.
    pub converged: bool,
}

impl FilterOutcome {
    pub fn into_value(self) -> Option<PropertyValue> {
        self.value
    }
}

#[derive(Clone)]
struct Registered {
    filter: Arc<dyn PropertyFilter>,
    priority: i32,
}

/// Immutable, priority-ordered list of filters plus the pass cap.
///
/// Filters run in descending priority; equal priorities are ordered by
/// filter name.
#[derive(Clone)]
pub struct FilterChain {
    filters: Vec<Registered>,
    max_loops: usize,
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.filter_names())
            .field("max_loops", &self.max_loops)
            .finish()
    }
}

impl FilterChain {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            max_loops: MAX_FILTER_LOOPS,
        }
    }

    /// Sets the pass cap. A cap of `0` is raised to `1`.
    pub fn with_max_loops(mut self, max_loops: usize) -> Self {
        self.max_loops = max_loops.max(1);
        self
    }

    pub fn max_loops(&self) -> usize {
        self.max_loops
    }

    pub fn add(&mut self, filter: Arc<dyn PropertyFilter>, priority: i32) {
        self.filters.push(Registered { filter, priority });
        self.filters.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.filter.name().cmp(b.filter.name()))
        });
    }

    /// Removes every filter with the given name. Returns whether any was
    /// removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.filters.len();
        self.filters.retain(|r| r.filter.name() != name);
        self.filters.len() != before
    }

    pub fn filter_names(&self) -> Vec<String> {
        self.filters.iter().map(|r| r.filter.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Applies the filters repeatedly until a pass changes nothing, a filter
    /// removes the value, or the pass cap is reached.
    ///
    /// Hitting the cap is not an error: the value of the last pass is kept
    /// and a warning is logged.
    pub fn filter_value(&self, value: PropertyValue, ctx: &FilterContext<'_>) -> FilterOutcome {
        if self.filters.is_empty() {
            return FilterOutcome {
                value: Some(value),
                passes: 0,
                converged: true,
            };
        }

        let mut current = value;
        let mut passes = 0;
        while passes < self.max_loops {
            passes += 1;
            let mut changes = 0;
            for registered in &self.filters {
                match registered.filter.filter_property(current.clone(), ctx) {
                    Some(next) if !next.is_removed() => {
                        if next != current {
                            changes += 1;
                            current = next;
                        }
                    }
                    _ => {
                        trace!(
                            key = ctx.key(),
                            filter = registered.filter.name(),
                            "value removed by filter"
                        );
                        return FilterOutcome {
                            value: None,
                            passes,
                            converged: true,
                        };
                    }
                }
            }
            if changes == 0 {
                return FilterOutcome {
                    value: Some(current),
                    passes,
                    converged: true,
                };
            }
        }

        warn!(
            key = ctx.key(),
            passes,
            filters = ?self.filter_names(),
            "filter chain did not converge, using value of last pass"
        );
        FilterOutcome {
            value: Some(current),
            passes,
            converged: false,
        }
    }

    /// Filters a whole snapshot, evaluating each key independently.
    /// Entries removed by a filter are dropped from the result.
    pub fn filter_properties(
        &self,
        values: HashMap<String, PropertyValue>,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> HashMap<String, PropertyValue> {
        values
            .into_iter()
            .filter_map(|(key, value)| {
                let ctx = FilterContext::for_map(&key, lookup);
                let filtered = self.filter_value(value, &ctx).into_value();
                filtered.map(|v| (key.clone(), v))
            })
            .collect()
    }
}
