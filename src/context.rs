//! Configuration context: the sources, filters, policy and converters a
//! [`Configuration`] evaluates against, and the builder assembling them.

use crate::cli::CliPropertySource;
use crate::combination::{CombinationPolicy, OverridingPolicy};
use crate::config::Configuration;
use crate::conversion::{ConverterRegistry, PropertyConverter};
use crate::env_source::EnvPropertySource;
use crate::error::{ConfigError, ConfigResult};
use crate::expression::ExpressionResolutionFilter;
use crate::filter::{FilterChain, PropertyFilter, MAX_FILTER_LOOPS};
use crate::source::{utils, PropertySource};
use arc_swap::ArcSwap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Priority of the expression filter when installed by default.
pub const EXPRESSION_FILTER_PRIORITY: i32 = 0;

/// Shared, runtime-modifiable state behind a [`Configuration`].
///
/// Sources and filters are immutable snapshots swapped atomically on
/// change; lookups in flight keep the snapshot they started with.
pub struct ConfigurationContext {
    sources: ArcSwap<Vec<Arc<dyn PropertySource>>>,
    filters: ArcSwap<FilterChain>,
    policy: Arc<dyn CombinationPolicy>,
    converters: Arc<ConverterRegistry>,
}

impl fmt::Debug for ConfigurationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources: Vec<(String, i32)> = self
            .sources
            .load()
            .iter()
            .map(|s| (s.name().to_string(), s.ordinal()))
            .collect();
        f.debug_struct("ConfigurationContext")
            .field("sources", &sources)
            .field("filters", &self.filters.load().filter_names())
            .field("policy", &self.policy.name())
            .field("converters", &self.converters)
            .finish()
    }
}

impl ConfigurationContext {
    /// Property sources, highest ordinal first.
    ///
    /// Ordinals are read again on every call, so a source whose
    /// `tamaya.ordinal` entry changed is placed by its current value.
    pub fn property_sources(&self) -> Arc<Vec<Arc<dyn PropertySource>>> {
        let mut sources = Vec::clone(&self.sources.load());
        utils::sort_sources(&mut sources);
        Arc::new(sources)
    }

    pub fn property_source(&self, name: &str) -> Option<Arc<dyn PropertySource>> {
        self.sources.load().iter().find(|s| s.name() == name).cloned()
    }

    /// Adds a source and re-sorts the source list.
    pub fn add_property_source(&self, source: Arc<dyn PropertySource>) {
        debug!(source = source.name(), ordinal = source.ordinal(), "adding property source");
        self.sources.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&source));
            utils::sort_sources(&mut next);
            next
        });
    }

    /// Removes every source with the given name. Returns whether any was
    /// removed.
    pub fn remove_property_source(&self, name: &str) -> bool {
        let mut removed = false;
        self.sources.rcu(|current| {
            let next: Vec<_> = current.iter().filter(|s| s.name() != name).cloned().collect();
            removed = next.len() != current.len();
            next
        });
        removed
    }

    pub fn filters(&self) -> Arc<FilterChain> {
        self.filters.load_full()
    }

    pub fn add_filter(&self, filter: Arc<dyn PropertyFilter>, priority: i32) {
        self.filters.rcu(|current| {
            let mut next = FilterChain::clone(current);
            next.add(Arc::clone(&filter), priority);
            next
        });
    }

    pub fn remove_filter(&self, name: &str) -> bool {
        let mut removed = false;
        self.filters.rcu(|current| {
            let mut next = FilterChain::clone(current);
            removed = next.remove(name);
            next
        });
        removed
    }

    pub fn combination_policy(&self) -> &dyn CombinationPolicy {
        self.policy.as_ref()
    }

    pub fn converters(&self) -> &Arc<ConverterRegistry> {
        &self.converters
    }
}

type ConverterSetup = Box<dyn FnOnce(&ConverterRegistry) + Send>;

/// Assembles a [`ConfigurationContext`] / [`Configuration`].
///
/// Defaults: the built-in converters and the expression filter are
/// installed, no property source is added, the overriding combination
/// policy applies and the filter chain is capped at
/// [`MAX_FILTER_LOOPS`] passes.
///
/// # Example
/// ```
/// use tamaya::{Configuration, MapPropertySource};
///
/// let config = Configuration::builder()
///     .add_source(MapPropertySource::with_values("defaults", [("timeout", "30")]).with_ordinal(10))
///     .add_source(MapPropertySource::with_values("site", [("timeout", "45")]).with_ordinal(20))
///     .build()
///     .unwrap();
/// assert_eq!(config.get_as::<u32>("timeout").unwrap(), Some(45));
/// ```
pub struct ConfigurationBuilder {
    sources: Vec<Arc<dyn PropertySource>>,
    filters: Vec<(Arc<dyn PropertyFilter>, i32)>,
    policies: Vec<(Arc<dyn CombinationPolicy>, i32)>,
    registry: Option<Arc<ConverterRegistry>>,
    converter_setup: Vec<ConverterSetup>,
    max_filter_loops: usize,
    default_sources: bool,
    default_filters: bool,
    default_converters: bool,
}

impl Default for ConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationBuilder {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            filters: Vec::new(),
            policies: Vec::new(),
            registry: None,
            converter_setup: Vec::new(),
            max_filter_loops: MAX_FILTER_LOOPS,
            default_sources: false,
            default_filters: true,
            default_converters: true,
        }
    }

    pub fn add_source<S: PropertySource + 'static>(self, source: S) -> Self {
        self.add_shared_source(Arc::new(source))
    }

    /// Adds a source that is also held elsewhere, e.g. a file source
    /// registered with a watcher.
    pub fn add_shared_source(mut self, source: Arc<dyn PropertySource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Also adds the environment (ordinal 300) and the process command
    /// line (ordinal 1000).
    pub fn with_default_sources(mut self) -> Self {
        self.default_sources = true;
        self
    }

    pub fn add_filter<F: PropertyFilter + 'static>(mut self, filter: F, priority: i32) -> Self {
        self.filters.push((Arc::new(filter), priority));
        self
    }

    /// Leaves out the expression resolution filter.
    pub fn without_default_filters(mut self) -> Self {
        self.default_filters = false;
        self
    }

    /// Offers a combination policy. The one with the highest priority is
    /// used; two at the same top priority fail the build.
    pub fn with_combination_policy<P: CombinationPolicy + 'static>(mut self, policy: P, priority: i32) -> Self {
        self.policies.push((Arc::new(policy), priority));
        self
    }

    /// Uses an existing registry instead of creating one. Built-in
    /// converters are not added to it.
    pub fn with_converter_registry(mut self, registry: Arc<ConverterRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn add_converter<T, C>(mut self, priority: i32, converter: C) -> Self
    where
        T: 'static,
        C: PropertyConverter<T> + 'static,
    {
        self.converter_setup.push(Box::new(move |registry: &ConverterRegistry| {
            registry.register::<T, C>(priority, converter);
        }));
        self
    }

    /// Runs `setup` against the registry once it exists, for enum and
    /// `FromStr` defaults or type relations.
    pub fn configure_converters<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&ConverterRegistry) + Send + 'static,
    {
        self.converter_setup.push(Box::new(setup));
        self
    }

    pub fn without_default_converters(mut self) -> Self {
        self.default_converters = false;
        self
    }

    /// Caps the filter passes per value (minimum 1).
    pub fn max_filter_loops(mut self, max_loops: usize) -> Self {
        self.max_filter_loops = max_loops;
        self
    }

    /// Builds the context.
    ///
    /// # Errors
    /// * `ConfigError::AmbiguousService` - If several combination policies share the top priority
    pub fn build_context(self) -> ConfigResult<ConfigurationContext> {
        let policy = select_policy(self.policies)?;

        let mut sources = self.sources;
        if self.default_sources {
            sources.push(Arc::new(EnvPropertySource::new()));
            sources.push(Arc::new(CliPropertySource::from_env()));
        }
        utils::sort_sources(&mut sources);

        let mut filters = FilterChain::new().with_max_loops(self.max_filter_loops);
        if self.default_filters {
            filters.add(Arc::new(ExpressionResolutionFilter::new()), EXPRESSION_FILTER_PRIORITY);
        }
        for (filter, priority) in self.filters {
            filters.add(filter, priority);
        }

        let converters = match self.registry {
            Some(registry) => registry,
            None if self.default_converters => Arc::new(ConverterRegistry::with_defaults()),
            None => Arc::new(ConverterRegistry::new()),
        };
        for setup in self.converter_setup {
            setup(&converters);
        }

        Ok(ConfigurationContext {
            sources: ArcSwap::from_pointee(sources),
            filters: ArcSwap::from_pointee(filters),
            policy,
            converters,
        })
    }

    /// Builds the configuration.
    ///
    /// # Errors
    /// See [`build_context`](ConfigurationBuilder::build_context).
    pub fn build(self) -> ConfigResult<Configuration> {
        Ok(Configuration::new(self.build_context()?))
    }
}

fn select_policy(policies: Vec<(Arc<dyn CombinationPolicy>, i32)>) -> ConfigResult<Arc<dyn CombinationPolicy>> {
    let Some(top) = policies.iter().map(|(_, priority)| *priority).max() else {
        return Ok(Arc::new(OverridingPolicy));
    };
    let mut candidates: Vec<Arc<dyn CombinationPolicy>> = policies
        .into_iter()
        .filter(|(_, priority)| *priority == top)
        .map(|(policy, _)| policy)
        .collect();
    if candidates.len() > 1 {
        let mut names: Vec<String> = candidates.iter().map(|p| p.name().to_string()).collect();
        names.sort();
        return Err(ConfigError::ambiguous_service("combination policy", top, names));
    }
    Ok(candidates.remove(0))
}
