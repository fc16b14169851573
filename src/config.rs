//! The configuration facade.

use crate::combination;
use crate::context::{ConfigurationBuilder, ConfigurationContext};
use crate::conversion::builtin::split_list;
use crate::conversion::{ConversionContext, InjectionSite, TypeKey};
use crate::error::ConfigResult;
use crate::filter::FilterContext;
use crate::source::{utils, PropertySource};
use crate::value::PropertyValue;
use std::collections::HashMap;
use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::Arc;

/// Read access to configuration values.
///
/// Every lookup walks the property sources, runs the filter chain and, for
/// typed access, the converters; nothing is cached. A missing key is `None`,
/// never an error. Cloning is cheap and clones share the same context.
///
/// # Example
/// ```
/// use tamaya::{Configuration, MapPropertySource};
///
/// let config = Configuration::builder()
///     .add_source(MapPropertySource::with_values("app", [
///         ("server.port", "8080"),
///         ("server.hosts", "a.local,b.local"),
///     ]))
///     .build()
///     .unwrap();
///
/// assert_eq!(config.get("server.port").as_deref(), Some("8080"));
/// assert_eq!(config.get_as::<u16>("server.port").unwrap(), Some(8080));
/// assert_eq!(config.get_list::<String>("server.hosts").unwrap(), vec!["a.local", "b.local"]);
/// assert_eq!(config.get_or_default("missing", "fallback"), "fallback");
/// ```
#[derive(Clone)]
pub struct Configuration {
    context: Arc<ConfigurationContext>,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("context", &self.context)
            .finish()
    }
}

impl Configuration {
    pub fn new(context: ConfigurationContext) -> Self {
        Self {
            context: Arc::new(context),
        }
    }

    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::new()
    }

    pub fn context(&self) -> &ConfigurationContext {
        &self.context
    }

    /// Resolves a key to its filtered value, metadata included.
    ///
    /// # Arguments
    /// * `key` - The configuration key
    ///
    /// # Returns
    /// `None` if no source defines the key or a filter removed it.
    pub fn get_property_value(&self, key: &str) -> Option<PropertyValue> {
        let sources = self.context.property_sources();
        let policy = self.context.combination_policy();
        let raw = combination::evaluate(&sources, key, policy)?;

        let lookup = raw_lookup(&sources, policy);
        let ctx = FilterContext::single(key, &lookup);
        self.context.filters().filter_value(raw, &ctx).into_value()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.get_property_value(key).and_then(PropertyValue::into_value)
    }

    pub fn get_or_default(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Resolves a key and converts it to `T`.
    ///
    /// # Returns
    /// `Ok(None)` if the key is absent.
    ///
    /// # Errors
    /// * `ConfigError::Unconvertible` - If the value is present but no converter accepts it
    pub fn get_as<T: 'static>(&self, key: &str) -> ConfigResult<Option<T>> {
        self.get(key)
            .map(|raw| self.convert::<T>(key, &raw, None))
            .transpose()
    }

    /// Like [`get_as`](Configuration::get_as), returning `default` when the
    /// key is absent. Conversion failures are still errors.
    pub fn get_as_or_default<T: 'static>(&self, key: &str, default: T) -> ConfigResult<T> {
        Ok(self.get_as::<T>(key)?.unwrap_or(default))
    }

    /// Converts through `T`'s `FromStr` when no converter is registered for
    /// `T`; the converter is added to the registry on first use.
    pub fn get_parsed<T>(&self, key: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr + 'static,
        T::Err: Display,
    {
        let converters = self.context.converters();
        if !converters.has_converters::<T>() {
            converters.register_from_str::<T>();
        }
        self.get_as::<T>(key)
    }

    /// Splits the value on unescaped commas and converts each element.
    /// An absent key yields an empty list.
    pub fn get_list<T: 'static>(&self, key: &str) -> ConfigResult<Vec<T>> {
        let Some(raw) = self.get(key) else {
            return Ok(Vec::new());
        };
        let ctx = self.conversion_context::<Vec<T>>(key, None);
        let converters = self.context.converters();
        split_list(&raw)
            .iter()
            .map(|item| converters.convert_nested::<T>(item, &ctx))
            .collect()
    }

    /// Typed lookup on behalf of an injection site; converters can read the
    /// site from their context.
    pub fn get_for_site<T: 'static>(&self, key: &str, site: InjectionSite) -> ConfigResult<Option<T>> {
        self.get(key)
            .map(|raw| self.convert::<T>(key, &raw, Some(site)))
            .transpose()
    }

    /// All keys the scannable sources list, with filtered values.
    pub fn properties(&self) -> HashMap<String, String> {
        let sources = self.context.property_sources();
        let policy = self.context.combination_policy();
        let raw: HashMap<String, PropertyValue> = utils::collect_all_keys(&sources)
            .into_iter()
            .filter_map(|key| {
                let value = combination::evaluate(&sources, &key, policy)?;
                Some((key, value))
            })
            .collect();

        let lookup = raw_lookup(&sources, policy);
        self.context
            .filters()
            .filter_properties(raw, &lookup)
            .into_iter()
            .filter_map(|(key, value)| value.into_value().map(|v| (key, v)))
            .collect()
    }

    /// Evaluates `query` against this configuration.
    pub fn query<R>(&self, query: impl FnOnce(&Configuration) -> R) -> R {
        query(self)
    }

    /// Applies an operator producing a derived configuration.
    pub fn with(&self, operator: impl FnOnce(Configuration) -> Configuration) -> Configuration {
        operator(self.clone())
    }

    fn conversion_context<T: 'static>(&self, key: &str, site: Option<InjectionSite>) -> ConversionContext {
        let builder = ConversionContext::builder(TypeKey::of::<T>())
            .key(key)
            .configuration(self.clone());
        match site {
            Some(site) => builder.injection_site(site).build(),
            None => builder.build(),
        }
    }

    fn convert<T: 'static>(&self, key: &str, raw: &str, site: Option<InjectionSite>) -> ConfigResult<T> {
        let ctx = self.conversion_context::<T>(key, site);
        self.context.converters().convert_value::<T>(raw, &ctx)
    }
}

fn raw_lookup<'a>(
    sources: &'a [Arc<dyn PropertySource>],
    policy: &'a dyn combination::CombinationPolicy,
) -> impl Fn(&str) -> Option<String> + 'a {
    move |key: &str| combination::evaluate(sources, key, policy).and_then(PropertyValue::into_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::{ConfigEnum, PropertyConverter};
    use crate::error::ConfigError;
    use crate::filter::PropertyFilter;
    use crate::map_source::MapPropertySource;

    fn config(values: &[(&str, &str)]) -> Configuration {
        Configuration::builder()
            .add_source(MapPropertySource::with_values("test", values.iter().copied()).with_ordinal(100))
            .build()
            .unwrap()
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Mode {
        Fast,
        Safe,
    }

    impl ConfigEnum for Mode {
        const VARIANTS: &'static [(&'static str, Self)] = &[("Fast", Mode::Fast), ("Safe", Mode::Safe)];
    }

    #[test]
    fn test_get_and_defaults() {
        let config = config(&[("a", "1")]);
        assert_eq!(config.get("a").as_deref(), Some("1"));
        assert_eq!(config.get("b"), None);
        assert_eq!(config.get_or_default("b", "x"), "x");
        assert_eq!(config.get_as::<i32>("b").unwrap(), None);
        assert_eq!(config.get_as_or_default::<i32>("b", 7).unwrap(), 7);
        assert_eq!(config.get_as_or_default::<i32>("a", 7).unwrap(), 1);
    }

    #[test]
    fn test_property_value_carries_source() {
        let config = config(&[("a", "1")]);
        let value = config.get_property_value("a").unwrap();
        assert_eq!(value.source(), Some("test"));
        assert_eq!(value.key(), "a");
    }

    #[test]
    fn test_ordinal_change_reorders_sources() {
        let a = Arc::new(MapPropertySource::new("a").with_value("k", "from-a"));
        let config = Configuration::builder()
            .add_shared_source(a.clone())
            .add_source(MapPropertySource::new("b").with_value("k", "from-b").with_ordinal(10))
            .build()
            .unwrap();
        assert_eq!(config.get("k").as_deref(), Some("from-b"));

        a.set("tamaya.ordinal", "20");
        assert_eq!(config.get("k").as_deref(), Some("from-a"));
        assert_eq!(config.properties()["k"], "from-a");
        assert_eq!(config.context().property_sources()[0].name(), "a");
    }

    #[test]
    fn test_typed_access_and_unconvertible_error() {
        let config = Configuration::builder()
            .add_source(MapPropertySource::with_values("m", [("timeout", "30")]).with_ordinal(100))
            .configure_converters(|r| r.register_enum::<Mode>())
            .build()
            .unwrap();

        assert_eq!(config.get_as::<i32>("timeout").unwrap(), Some(30));
        let err = config.get_as::<Mode>("timeout").unwrap_err();
        assert!(err.is_unconvertible());
        assert!(err.to_string().contains("timeout"));
        assert!(!err.attempted_formats().is_empty());
    }

    #[test]
    fn test_string_target_never_fails() {
        let config = config(&[("name", "tamaya")]);
        assert_eq!(config.get_as::<String>("name").unwrap().as_deref(), Some("tamaya"));
    }

    #[test]
    fn test_get_parsed_synthesizes_from_str() {
        let config = config(&[("addr", "10.0.0.1"), ("bad", "nope")]);
        let addr = config.get_parsed::<std::net::Ipv4Addr>("addr").unwrap();
        assert_eq!(addr, Some(std::net::Ipv4Addr::new(10, 0, 0, 1)));
        assert!(config.context().converters().has_converters::<std::net::Ipv4Addr>());
        assert!(config.get_parsed::<std::net::Ipv4Addr>("bad").is_err());
    }

    #[test]
    fn test_get_list() {
        let config = config(&[("ports", "80, 443,\t8080"), ("broken", "1,x")]);
        assert_eq!(config.get_list::<u16>("ports").unwrap(), vec![80, 443, 8080]);
        assert!(config.get_list::<u16>("missing").unwrap().is_empty());

        let err = config.get_list::<u16>("broken").unwrap_err();
        match err {
            ConfigError::Unconvertible { key, value, .. } => {
                assert_eq!(key, "broken");
                assert_eq!(value, "x");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    struct SiteAware;

    impl PropertyConverter<String> for SiteAware {
        fn convert(&self, value: &str, ctx: &crate::conversion::ConversionContext) -> ConfigResult<Option<String>> {
            Ok(ctx
                .injection_site()
                .map(|site| format!("{}={value}", site.member())))
        }
    }

    #[test]
    fn test_get_for_site_exposes_site_to_converters() {
        let config = Configuration::builder()
            .add_source(MapPropertySource::with_values("m", [("db.user", "admin")]))
            .add_converter::<String, _>(0, SiteAware)
            .build()
            .unwrap();

        let site = InjectionSite::new("Database", "user");
        assert_eq!(
            config.get_for_site::<String>("db.user", site).unwrap().as_deref(),
            Some("user=admin")
        );
        assert_eq!(config.get_as::<String>("db.user").unwrap().as_deref(), Some("admin"));
    }

    #[test]
    fn test_converters_see_owning_configuration() {
        let config = Configuration::builder()
            .add_source(MapPropertySource::with_values("m", [("unit", "ms"), ("delay", "250")]))
            .add_converter::<std::time::Duration, _>(10, crate::conversion::FnConverter::new(
                "UnitAware",
                |value: &str, ctx: &crate::conversion::ConversionContext| {
                    let unit = ctx.configuration().and_then(|c| c.get("unit"));
                    Ok::<_, ConfigError>(match (unit.as_deref(), value.parse::<u64>()) {
                        (Some("ms"), Ok(n)) => Some(std::time::Duration::from_millis(n)),
                        _ => None,
                    })
                },
            ))
            .build()
            .unwrap();
        assert_eq!(
            config.get_as::<std::time::Duration>("delay").unwrap(),
            Some(std::time::Duration::from_millis(250))
        );
    }

    struct Hide;

    impl PropertyFilter for Hide {
        fn filter_property(&self, value: PropertyValue, _ctx: &FilterContext<'_>) -> Option<PropertyValue> {
            (!value.key().starts_with("hidden.")).then_some(value)
        }

        fn name(&self) -> &str {
            "hide"
        }
    }

    #[test]
    fn test_properties_are_filtered_and_resolved() {
        let config = Configuration::builder()
            .add_source(MapPropertySource::with_values(
                "m",
                [("host", "db"), ("url", "pg://${host}"), ("hidden.token", "t")],
            ))
            .add_filter(Hide, 5)
            .build()
            .unwrap();

        let properties = config.properties();
        assert_eq!(properties.len(), 2);
        assert_eq!(properties["url"], "pg://db");
        assert_eq!(config.get("hidden.token"), None);
    }

    #[test]
    fn test_query_and_with() {
        let config = config(&[("a", "1"), ("b", "2")]);
        let count = config.query(|c| c.properties().len());
        assert_eq!(count, 2);

        let derived = config.with(|c| {
            c.context()
                .add_property_source(Arc::new(MapPropertySource::with_values("extra", [("c", "3")])));
            c
        });
        assert_eq!(derived.get("c").as_deref(), Some("3"));
    }
}
