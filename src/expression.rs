//! `${...}` expression resolution filter.
//!
//! Supported forms:
//! - `${key}` and `${conf:key}`: raw value of another configuration key
//! - `${env:VAR}`: environment variable
//! - nested expressions such as `${env:${var.name}}`
//! - `\$` produces a literal `$` and never starts an expression
//!
//! Expressions that cannot be resolved stay in the text unchanged.

use crate::filter::{FilterContext, PropertyFilter};
use crate::value::PropertyValue;
use std::sync::Arc;
use tracing::debug;

/// Metadata entry holding the text produced by the last resolution.
pub const RESOLVED_META: &str = "expression.resolved";

/// Default bound on nested and chained resolutions.
pub const MAX_EXPRESSION_DEPTH: usize = 10;

/// Resolves expressions carrying a given prefix (`conf`, `env`, ...).
pub trait ExpressionResolver: Send + Sync {
    fn prefix(&self) -> &str;

    fn resolve(&self, expression: &str, ctx: &FilterContext<'_>) -> Option<String>;
}

/// Looks the expression up as a configuration key.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigResolver;

impl ExpressionResolver for ConfigResolver {
    fn prefix(&self) -> &str {
        "conf"
    }

    fn resolve(&self, expression: &str, ctx: &FilterContext<'_>) -> Option<String> {
        ctx.raw(expression.trim())
    }
}

/// Reads the expression as an environment variable name.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvResolver;

impl ExpressionResolver for EnvResolver {
    fn prefix(&self) -> &str {
        "env"
    }

    fn resolve(&self, expression: &str, _ctx: &FilterContext<'_>) -> Option<String> {
        std::env::var(expression.trim()).ok()
    }
}

/// Filter replacing `${...}` expressions in values.
///
/// Unprefixed expressions go to the `conf` resolver. Referenced values are
/// themselves resolved, up to [`MAX_EXPRESSION_DEPTH`] levels; a reference
/// cycle therefore ends with the unresolved expression left in place.
///
/// # Example
/// ```
/// use tamaya::{Configuration, MapPropertySource};
///
/// let config = Configuration::builder()
///     .add_source(MapPropertySource::with_values("m", [
///         ("host", "db.local"),
///         ("url", "jdbc://${host}:5432"),
///         ("price", "\\${not.an.expression}"),
///     ]))
///     .build()
///     .unwrap();
/// assert_eq!(config.get("url").as_deref(), Some("jdbc://db.local:5432"));
/// assert_eq!(config.get("price").as_deref(), Some("${not.an.expression}"));
/// ```
#[derive(Clone)]
pub struct ExpressionResolutionFilter {
    resolvers: Vec<Arc<dyn ExpressionResolver>>,
    max_depth: usize,
}

impl Default for ExpressionResolutionFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExpressionResolutionFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefixes: Vec<&str> = self.resolvers.iter().map(|r| r.prefix()).collect();
        f.debug_struct("ExpressionResolutionFilter")
            .field("resolvers", &prefixes)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl ExpressionResolutionFilter {
    /// Filter with the `conf` and `env` resolvers.
    pub fn new() -> Self {
        Self {
            resolvers: vec![Arc::new(ConfigResolver), Arc::new(EnvResolver)],
            max_depth: MAX_EXPRESSION_DEPTH,
        }
    }

    /// Adds a resolver; it replaces an existing one with the same prefix.
    pub fn with_resolver(mut self, resolver: Arc<dyn ExpressionResolver>) -> Self {
        self.resolvers.retain(|r| r.prefix() != resolver.prefix());
        self.resolvers.push(resolver);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    fn resolver(&self, prefix: &str) -> Option<&dyn ExpressionResolver> {
        self.resolvers
            .iter()
            .find(|r| r.prefix() == prefix)
            .map(|r| r.as_ref())
    }

    /// Resolves every expression in `text`.
    pub fn resolve_text(&self, text: &str, ctx: &FilterContext<'_>) -> String {
        self.resolve_at(text, ctx, 0)
    }

    fn resolve_at(&self, text: &str, ctx: &FilterContext<'_>, depth: usize) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '\\' if chars.get(i + 1) == Some(&'$') => {
                    out.push('$');
                    i += 2;
                }
                '$' if chars.get(i + 1) == Some(&'{') => match closing_brace(&chars, i + 2) {
                    Some(end) => {
                        let inner: String = chars[i + 2..end].iter().collect();
                        let original: String = chars[i..=end].iter().collect();
                        out.push_str(&self.evaluate(&inner, &original, ctx, depth));
                        i = end + 1;
                    }
                    None => {
                        out.extend(&chars[i..]);
                        break;
                    }
                },
                c => {
                    out.push(c);
                    i += 1;
                }
            }
        }
        out
    }

    fn evaluate(&self, inner: &str, original: &str, ctx: &FilterContext<'_>, depth: usize) -> String {
        if depth >= self.max_depth {
            debug!(key = ctx.key(), expression = original, "expression depth limit reached");
            return original.to_string();
        }

        let expression = self.resolve_at(inner, ctx, depth + 1);
        let (resolver, name) = match expression.split_once(':') {
            Some((prefix, name)) if self.resolver(prefix).is_some() => (self.resolver(prefix), name),
            _ => (self.resolver("conf"), expression.as_str()),
        };

        match resolver.and_then(|r| r.resolve(name, ctx)) {
            Some(value) => self.resolve_at(&value, ctx, depth + 1),
            None => {
                debug!(key = ctx.key(), expression = original, "unresolved expression left in place");
                original.to_string()
            }
        }
    }
}

/// Index of the `}` closing an expression whose body starts at `start`.
fn closing_brace(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 1;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\\' if chars.get(i + 1) == Some(&'$') => i += 1,
            '$' if chars.get(i + 1) == Some(&'{') => {
                depth += 1;
                i += 1;
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

impl PropertyFilter for ExpressionResolutionFilter {
    fn filter_property(&self, value: PropertyValue, ctx: &FilterContext<'_>) -> Option<PropertyValue> {
        let Some(text) = value.value() else {
            return Some(value);
        };
        if !text.contains('$') || value.meta(RESOLVED_META) == Some(text) {
            return Some(value);
        }

        let resolved = self.resolve_text(text, ctx);
        if resolved == text {
            return Some(value);
        }
        Some(value.with_value(resolved.clone()).with_meta(RESOLVED_META, resolved))
    }

    fn name(&self) -> &str {
        "expression"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterChain;
    use std::collections::HashMap;

    fn lookup_in(values: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn resolve(text: &str, values: &[(&str, &str)]) -> String {
        let lookup = lookup_in(values);
        let ctx = FilterContext::single("test", &lookup);
        ExpressionResolutionFilter::new().resolve_text(text, &ctx)
    }

    #[test]
    fn test_plain_and_prefixed_references() {
        let values = [("host", "localhost"), ("port", "8080")];
        assert_eq!(resolve("${host}:${conf:port}", &values), "localhost:8080");
        assert_eq!(resolve("no expressions", &values), "no expressions");
    }

    #[test]
    fn test_env_reference() {
        std::env::set_var("TAMAYA_EXPR_TEST_HOME", "/opt/app");
        assert_eq!(resolve("${env:TAMAYA_EXPR_TEST_HOME}/conf", &[]), "/opt/app/conf");
        std::env::remove_var("TAMAYA_EXPR_TEST_HOME");
    }

    #[test]
    fn test_nested_and_chained_references() {
        let values = [
            ("which", "primary"),
            ("db.primary", "pg-1"),
            ("alias", "${db.${which}}"),
        ];
        assert_eq!(resolve("${db.${which}}", &values), "pg-1");
        assert_eq!(resolve("${alias}", &values), "pg-1");
    }

    #[test]
    fn test_escaped_dollar_is_literal() {
        let values = [("a", "1")];
        assert_eq!(resolve("cost: \\$5", &values), "cost: $5");
        assert_eq!(resolve("\\${a}", &values), "${a}");
        assert_eq!(resolve("\\,kept", &values), "\\,kept");
    }

    #[test]
    fn test_unresolved_and_unterminated_stay_in_place() {
        assert_eq!(resolve("x${missing}y", &[]), "x${missing}y");
        assert_eq!(resolve("${unknown:thing}", &[]), "${unknown:thing}");
        assert_eq!(resolve("open ${never", &[]), "open ${never");
    }

    #[test]
    fn test_reference_cycle_terminates() {
        let values = [("a", "${b}"), ("b", "${a}")];
        assert_eq!(resolve("${a}", &values), "${a}");

        let lookup = lookup_in(&values);
        let ctx = FilterContext::single("test", &lookup);
        let shallow = ExpressionResolutionFilter::new().with_max_depth(3);
        assert_eq!(shallow.resolve_text("${a}", &ctx), "${b}");
    }

    #[test]
    fn test_filter_converges_on_escaped_output() {
        let mut chain = FilterChain::new();
        chain.add(Arc::new(ExpressionResolutionFilter::new()), 0);
        let lookup = lookup_in(&[("a", "1")]);
        let ctx = FilterContext::single("k", &lookup);

        let outcome = chain.filter_value(PropertyValue::of("k", "\\${a}-${a}", "m"), &ctx);
        assert!(outcome.converged);
        assert_eq!(outcome.passes, 2);
        let value = outcome.value.unwrap();
        assert_eq!(value.value(), Some("${a}-1"));
        assert_eq!(value.meta(RESOLVED_META), Some("${a}-1"));
    }

    #[test]
    fn test_custom_resolver_replaces_prefix() {
        struct Upper;
        impl ExpressionResolver for Upper {
            fn prefix(&self) -> &str {
                "upper"
            }
            fn resolve(&self, expression: &str, _ctx: &FilterContext<'_>) -> Option<String> {
                Some(expression.to_uppercase())
            }
        }

        let filter = ExpressionResolutionFilter::new().with_resolver(Arc::new(Upper));
        let lookup = lookup_in(&[]);
        let ctx = FilterContext::single("k", &lookup);
        assert_eq!(filter.resolve_text("${upper:abc}", &ctx), "ABC");
    }
}
