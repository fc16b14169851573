//! Environment variable property source.

use crate::error::ConfigResult;
use crate::source::PropertySource;
use crate::value::PropertyValue;
use std::collections::HashMap;
use std::env;
use tracing::debug;

/// Default ordinal of the environment source.
pub const ENV_ORDINAL: i32 = 300;

/// Property source reading environment variables on every lookup.
///
/// A key is first looked up verbatim, then in its transformed form
/// (uppercased, dots replaced by underscores, custom replacer applied,
/// prefix prepended). With a prefix configured, [`properties`] lists only
/// prefixed variables, keyed by their lowercase dotted form without the
/// prefix; without one it lists every variable verbatim.
///
/// [`properties`]: PropertySource::properties
pub struct EnvPropertySource {
    /// Optional prefix for environment variable names
    prefix: Option<String>,

    /// Custom key transformation function
    key_replacer: Option<Box<dyn Fn(&str) -> String + Send + Sync>>,

    ordinal: i32,
}

impl EnvPropertySource {
    /// Creates a source over all environment variables.
    pub fn new() -> Self {
        Self {
            prefix: None,
            key_replacer: None,
            ordinal: ENV_ORDINAL,
        }
    }

    /// Creates a source restricted to variables starting with `PREFIX_`.
    ///
    /// # Example
    /// ```
    /// use tamaya::env_source::EnvPropertySource;
    ///
    /// let source = EnvPropertySource::with_prefix("APP");
    /// assert_eq!(source.transform_key("database.host"), "APP_DATABASE_HOST");
    /// ```
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Self::new()
        }
    }

    pub fn with_ordinal(mut self, ordinal: i32) -> Self {
        self.ordinal = ordinal;
        self
    }

    /// Sets a custom key replacement function applied after the default
    /// uppercase/underscore transformation.
    pub fn set_key_replacer<F>(&mut self, replacer: F)
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.key_replacer = Some(Box::new(replacer));
    }

    /// Transforms a configuration key to an environment variable name.
    pub fn transform_key(&self, key: &str) -> String {
        let mut env_key = key.to_uppercase().replace('.', "_");

        if let Some(ref replacer) = self.key_replacer {
            env_key = replacer(&env_key);
        }

        match self.prefix {
            Some(ref prefix) => format!("{prefix}_{env_key}"),
            None => env_key,
        }
    }

    fn read(&self, key: &str, var_name: &str) -> Option<PropertyValue> {
        env::var(var_name)
            .ok()
            .map(|value| PropertyValue::of(key, value, self.name()).with_meta("env.var", var_name))
    }
}

impl Default for EnvPropertySource {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertySource for EnvPropertySource {
    fn name(&self) -> &str {
        "environment-properties"
    }

    fn ordinal(&self) -> i32 {
        self.ordinal
    }

    fn get(&self, key: &str) -> ConfigResult<Option<PropertyValue>> {
        if self.prefix.is_none() {
            if let Some(value) = self.read(key, key) {
                return Ok(Some(value));
            }
        }
        Ok(self.read(key, &self.transform_key(key)))
    }

    fn properties(&self) -> ConfigResult<HashMap<String, PropertyValue>> {
        let mut values = HashMap::new();
        for (var, value) in env::vars_os() {
            let (var, value) = match (var.into_string(), value.into_string()) {
                (Ok(var), Ok(value)) => (var, value),
                (var, _) => {
                    debug!(var = ?var, "skipping environment variable that is not valid UTF-8");
                    continue;
                }
            };
            let key = match self.prefix {
                Some(ref prefix) => match var.strip_prefix(&format!("{prefix}_")) {
                    Some(stripped) => stripped.to_lowercase().replace('_', "."),
                    None => continue,
                },
                None => var.clone(),
            };
            values.insert(
                key.clone(),
                PropertyValue::of(key, value, self.name()).with_meta("env.var", var),
            );
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_env_source() {
        let source = EnvPropertySource::new();
        assert_eq!(source.name(), "environment-properties");
        assert_eq!(source.ordinal(), ENV_ORDINAL);
        assert_eq!(source.with_ordinal(7).ordinal(), 7);
    }

    #[test]
    fn test_transform_key_basic() {
        let source = EnvPropertySource::new();
        assert_eq!(source.transform_key("database.host"), "DATABASE_HOST");
        assert_eq!(
            source.transform_key("nested.config.value"),
            "NESTED_CONFIG_VALUE"
        );
    }

    #[test]
    fn test_transform_key_with_prefix_and_replacer() {
        let mut source = EnvPropertySource::with_prefix("MYAPP");
        assert_eq!(source.transform_key("port"), "MYAPP_PORT");

        source.set_key_replacer(|key: &str| key.replace('_', "__"));
        assert_eq!(source.transform_key("database.host"), "MYAPP_DATABASE__HOST");
    }

    #[test]
    fn test_get_verbatim_and_transformed() {
        env::set_var("TAMAYA_ENV_TEST_VERBATIM", "raw");
        env::set_var("TAMAYA_ENV_TEST_DOTTED", "dotted");

        let source = EnvPropertySource::new();
        let value = source.get("TAMAYA_ENV_TEST_VERBATIM").unwrap().unwrap();
        assert_eq!(value.value(), Some("raw"));
        assert_eq!(value.source(), Some("environment-properties"));

        let value = source.get("tamaya.env.test.dotted").unwrap().unwrap();
        assert_eq!(value.value(), Some("dotted"));
        assert_eq!(value.meta("env.var"), Some("TAMAYA_ENV_TEST_DOTTED"));

        env::remove_var("TAMAYA_ENV_TEST_VERBATIM");
        env::remove_var("TAMAYA_ENV_TEST_DOTTED");
    }

    #[test]
    fn test_get_nonexistent_variable() {
        let source = EnvPropertySource::with_prefix("NONEXISTENT_TAMAYA");
        assert_eq!(source.get("some.key").unwrap(), None);
    }

    #[test]
    fn test_prefixed_properties_are_stripped_and_dotted() {
        env::set_var("TAMAYAPFX_A_B_C", "deep");
        env::set_var("TAMAYAPFXOTHER", "ignored");

        let source = EnvPropertySource::with_prefix("TAMAYAPFX");
        let values = source.properties().unwrap();
        assert_eq!(values.get("a.b.c").and_then(|v| v.value()), Some("deep"));
        assert!(values.keys().all(|k| !k.contains("TAMAYAPFXOTHER")));
        assert_eq!(source.get("a.b.c").unwrap().unwrap().value(), Some("deep"));

        env::remove_var("TAMAYAPFX_A_B_C");
        env::remove_var("TAMAYAPFXOTHER");
    }

    #[cfg(unix)]
    #[test]
    fn test_properties_skip_non_utf8_variables() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        env::set_var("TAMAYA_ENV_TEST_BADUTF8", OsString::from_vec(b"f\xffo".to_vec()));
        env::set_var("TAMAYA_ENV_TEST_GOODUTF8", "fine");

        let values = EnvPropertySource::new().properties().unwrap();
        assert!(!values.contains_key("TAMAYA_ENV_TEST_BADUTF8"));
        assert_eq!(
            values.get("TAMAYA_ENV_TEST_GOODUTF8").and_then(|v| v.value()),
            Some("fine")
        );
        assert_eq!(EnvPropertySource::new().get("TAMAYA_ENV_TEST_BADUTF8").unwrap(), None);

        env::remove_var("TAMAYA_ENV_TEST_BADUTF8");
        env::remove_var("TAMAYA_ENV_TEST_GOODUTF8");
    }
}
