//! Command line property source.

use crate::error::ConfigResult;
use crate::source::PropertySource;
use crate::value::PropertyValue;
use std::collections::HashMap;

/// Default ordinal of the command line source; it overrides files and the
/// environment.
pub const CLI_ORDINAL: i32 = 1000;

/// Property source over command line arguments.
///
/// Recognised forms:
/// - `--key=value` and `-k=value`
/// - `--key value` and `-k value` (when the next argument is not an option)
/// - `--flag` on its own, which yields `"true"`
///
/// Arguments that do not start with `-` and are not consumed as a value are
/// ignored. A repeated key keeps the last value.
///
/// # Example
/// ```
/// use tamaya::{CliPropertySource, PropertySource};
///
/// let source = CliPropertySource::from_args(["--db.host=localhost", "--verbose", "-p", "8080"]);
/// assert_eq!(source.get("db.host").unwrap().unwrap().value(), Some("localhost"));
/// assert_eq!(source.get("verbose").unwrap().unwrap().value(), Some("true"));
/// assert_eq!(source.get("p").unwrap().unwrap().value(), Some("8080"));
/// ```
#[derive(Debug, Clone)]
pub struct CliPropertySource {
    values: HashMap<String, String>,
    ordinal: i32,
}

impl CliPropertySource {
    /// Parses the given arguments (without the program name).
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();
        Self {
            values: parse_args(&args),
            ordinal: CLI_ORDINAL,
        }
    }

    /// Parses the current process arguments, skipping the program name.
    pub fn from_env() -> Self {
        Self::from_args(std::env::args().skip(1))
    }

    pub fn with_ordinal(mut self, ordinal: i32) -> Self {
        self.ordinal = ordinal;
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn parse_args(args: &[String]) -> HashMap<String, String> {
    let mut values = HashMap::new();
    let mut index = 0;
    while index < args.len() {
        let arg = &args[index];
        index += 1;

        if is_number(arg) {
            continue;
        }
        let Some(option) = arg.strip_prefix("--").or_else(|| arg.strip_prefix('-')) else {
            continue;
        };
        if option.is_empty() {
            continue;
        }

        if let Some((key, value)) = option.split_once('=') {
            values.insert(key.to_string(), value.to_string());
            continue;
        }

        match args.get(index) {
            Some(next) if !next.starts_with('-') || is_number(next) => {
                values.insert(option.to_string(), next.clone());
                index += 1;
            }
            _ => {
                values.insert(option.to_string(), "true".to_string());
            }
        }
    }
    values
}

/// Negative numbers are values, not options.
fn is_number(arg: &str) -> bool {
    arg.parse::<f64>().is_ok()
}

#[cfg(feature = "cli")]
impl CliPropertySource {
    /// Builds the source from arguments already parsed by clap.
    ///
    /// Each provided argument id becomes a key (hyphens and underscores
    /// mapped to dots, lowercased). Multi-valued arguments are comma-joined,
    /// counters yield their count and boolean flags `"true"`/`"false"`.
    pub fn from_matches(matches: &clap::ArgMatches) -> Self {
        let mut values = HashMap::new();
        for id in matches.ids() {
            let name = id.as_str();
            if let Some(value) = arg_value(matches, name) {
                values.insert(name.replace(['-', '_'], ".").to_lowercase(), value);
            }
        }
        Self {
            values,
            ordinal: CLI_ORDINAL,
        }
    }
}

#[cfg(feature = "cli")]
fn arg_value(matches: &clap::ArgMatches, name: &str) -> Option<String> {
    if let Ok(Some(flag)) = matches.try_get_one::<bool>(name) {
        return Some(flag.to_string());
    }
    if let Ok(Some(values)) = matches.try_get_many::<String>(name) {
        return Some(
            values
                .map(|v| v.replace(',', "\\,"))
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    if let Ok(Some(count)) = matches.try_get_one::<u8>(name) {
        return Some(count.to_string());
    }
    None
}

impl PropertySource for CliPropertySource {
    fn name(&self) -> &str {
        "command-line-properties"
    }

    fn ordinal(&self) -> i32 {
        self.ordinal
    }

    fn get(&self, key: &str) -> ConfigResult<Option<PropertyValue>> {
        Ok(self
            .values
            .get(key)
            .map(|value| PropertyValue::of(key, value.clone(), self.name())))
    }

    fn properties(&self) -> ConfigResult<HashMap<String, PropertyValue>> {
        Ok(self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), PropertyValue::of(k.clone(), v.clone(), self.name())))
            .collect())
    }
}
