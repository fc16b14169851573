//! Combination policies: merging one key's value across property sources.

use crate::source::{utils, PropertySource};
use crate::value::PropertyValue;
use std::sync::Arc;

/// Rule for folding the values of one key over the property sources.
///
/// [`evaluate`] walks the sources from the lowest ordinal to the highest and
/// calls [`collect`](CombinationPolicy::collect) for every source that
/// defines the key, threading the accumulated value through.
pub trait CombinationPolicy: Send + Sync {
    /// Combines the value accumulated so far with the next (higher priority)
    /// candidate.
    fn collect(&self, current: Option<PropertyValue>, candidate: PropertyValue) -> Option<PropertyValue>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Default policy: the highest-ordinal source defining the key wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct OverridingPolicy;

impl CombinationPolicy for OverridingPolicy {
    fn collect(&self, current: Option<PropertyValue>, candidate: PropertyValue) -> Option<PropertyValue> {
        if candidate.is_removed() {
            current
        } else {
            Some(candidate)
        }
    }

    fn name(&self) -> &str {
        "overriding"
    }
}

/// Metadata key listing the sources that contributed to a collected value.
pub const SOURCES_META: &str = "sources";

/// Joins the values of every defining source, lowest ordinal first.
#[derive(Debug, Clone)]
pub struct CollectingPolicy {
    separator: String,
}

impl CollectingPolicy {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }
}

impl Default for CollectingPolicy {
    fn default() -> Self {
        Self::new(",")
    }
}

impl CombinationPolicy for CollectingPolicy {
    fn collect(&self, current: Option<PropertyValue>, candidate: PropertyValue) -> Option<PropertyValue> {
        let Some(candidate_value) = candidate.value().map(str::to_string) else {
            return current;
        };
        let candidate_source = candidate.source().unwrap_or_default().to_string();
        match current.as_ref().and_then(|c| c.value().map(|v| (c, v))) {
            Some((existing, existing_value)) => {
                let sources = match existing.meta(SOURCES_META) {
                    Some(sources) => format!("{sources}{}{candidate_source}", self.separator),
                    None => candidate_source,
                };
                let joined = format!("{existing_value}{}{candidate_value}", self.separator);
                Some(existing.clone().with_value(joined).with_meta(SOURCES_META, sources))
            }
            None => Some(candidate.with_meta(SOURCES_META, candidate_source)),
        }
    }

    fn name(&self) -> &str {
        "collecting"
    }
}

/// Resolves the raw value of `key`.
///
/// `sources` must be ordered highest ordinal first (as
/// [`utils::sort_sources`] leaves them). Failing sources are logged and
/// treated as not defining the key. Returns `None` if no source defines it.
pub fn evaluate(
    sources: &[Arc<dyn PropertySource>],
    key: &str,
    policy: &dyn CombinationPolicy,
) -> Option<PropertyValue> {
    sources
        .iter()
        .rev()
        .filter_map(|source| utils::lookup(source.as_ref(), key))
        .fold(None, |current, candidate| policy.collect(current, candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::tests::MockSource;

    fn sources(list: Vec<MockSource>) -> Vec<Arc<dyn PropertySource>> {
        let mut sources: Vec<Arc<dyn PropertySource>> = list
            .into_iter()
            .map(|s| Arc::new(s) as Arc<dyn PropertySource>)
            .collect();
        utils::sort_sources(&mut sources);
        sources
    }

    #[test]
    fn test_higher_ordinal_wins_regardless_of_registration_order() {
        for order in [[10, 20], [20, 10]] {
            let list = order
                .iter()
                .map(|o| MockSource::new(&format!("s{o}"), *o).with_value("k", &format!("v{o}")))
                .collect();
            let value = evaluate(&sources(list), "k", &OverridingPolicy).unwrap();
            assert_eq!(value.value(), Some("v20"));
            assert_eq!(value.source(), Some("s20"));
        }
    }

    #[test]
    fn test_lower_source_used_when_higher_lacks_key() {
        let list = vec![
            MockSource::new("high", 20).with_value("other", "x"),
            MockSource::new("low", 10).with_value("k", "low"),
        ];
        let value = evaluate(&sources(list), "k", &OverridingPolicy).unwrap();
        assert_eq!(value.value(), Some("low"));
    }

    #[test]
    fn test_absent_key_is_none() {
        let list = vec![MockSource::new("only", 1).with_value("a", "1")];
        assert_eq!(evaluate(&sources(list), "missing", &OverridingPolicy), None);
    }

    #[test]
    fn test_failing_source_is_skipped() {
        let list = vec![
            MockSource::new("broken", 50).with_value("k", "never").failing(),
            MockSource::new("healthy", 10).with_value("k", "ok"),
        ];
        let value = evaluate(&sources(list), "k", &OverridingPolicy).unwrap();
        assert_eq!(value.value(), Some("ok"));
    }

    #[test]
    fn test_removed_candidate_does_not_override() {
        let current = Some(PropertyValue::of("k", "v", "a"));
        let result = OverridingPolicy.collect(current.clone(), PropertyValue::removed("k"));
        assert_eq!(result, current);
    }

    #[test]
    fn test_collecting_policy_joins_low_to_high() {
        let list = vec![
            MockSource::new("high", 20).with_value("list", "c"),
            MockSource::new("low", 10).with_value("list", "a,b"),
        ];
        let value = evaluate(&sources(list), "list", &CollectingPolicy::default()).unwrap();
        assert_eq!(value.value(), Some("a,b,c"));
        assert_eq!(value.meta(SOURCES_META), Some("low,high"));
    }
}
