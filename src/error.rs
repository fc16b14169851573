//! Error types and utilities for configuration access.

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading, resolving or converting configuration.
///
/// A key that no property source defines is *not* an error: lookups return
/// `None` for it. Only the final "could not convert" condition and setup
/// problems surface as errors to callers.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parsing failed
    #[error("Parse error in {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    /// No converter accepted the raw value for the requested type
    #[error("Unconvertible value for key '{key}': cannot convert '{value}' to {target}, supported formats: [{}]", .formats.join(", "))]
    Unconvertible {
        key: String,
        value: String,
        target: String,
        formats: Vec<String>,
    },

    /// More than one service candidate shares the top priority
    #[error("Ambiguous {service}: {} candidates share priority {priority}: [{}]", .candidates.len(), .candidates.join(", "))]
    AmbiguousService {
        service: String,
        priority: i32,
        candidates: Vec<String>,
    },

    /// Unsupported configuration file format
    #[error("Unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// Invalid configuration value, raised by individual converters
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// File watching operation failed
    #[error("File watching error: {0}")]
    FileWatch(String),

    /// Change observer could not be started or stopped
    #[error("Observer error: {0}")]
    Observer(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::parse_error("JSON", err.to_string())
    }
}

impl From<notify::Error> for ConfigError {
    fn from(err: notify::Error) -> Self {
        ConfigError::FileWatch(err.to_string())
    }
}

impl ConfigError {
    /// Creates a new parse error with context.
    pub fn parse_error(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Creates the user-facing conversion failure.
    pub fn unconvertible(
        key: impl Into<String>,
        value: impl Into<String>,
        target: impl Into<String>,
        formats: Vec<String>,
    ) -> Self {
        Self::Unconvertible {
            key: key.into(),
            value: value.into(),
            target: target.into(),
            formats,
        }
    }

    /// Creates a duplicate-priority ambiguity error.
    pub fn ambiguous_service(
        service: impl Into<String>,
        priority: i32,
        candidates: Vec<String>,
    ) -> Self {
        Self::AmbiguousService {
            service: service.into(),
            priority,
            candidates,
        }
    }

    /// Creates a new invalid value error.
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue(message.into())
    }

    /// Creates a new file watch error.
    pub fn file_watch(message: impl Into<String>) -> Self {
        Self::FileWatch(message.into())
    }

    /// Returns true if no converter could handle the value.
    pub fn is_unconvertible(&self) -> bool {
        matches!(self, ConfigError::Unconvertible { .. })
    }

    /// Returns true if this error is related to parsing.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, ConfigError::Parse { .. })
    }

    /// Returns true if this error is related to IO operations.
    pub fn is_io_error(&self) -> bool {
        matches!(self, ConfigError::Io(_))
    }

    /// Formats attempted before giving up, when this is a conversion failure.
    pub fn attempted_formats(&self) -> &[String] {
        match self {
            ConfigError::Unconvertible { formats, .. } => formats,
            _ => &[],
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ConfigResultExt<T> {
    /// Adds context to a parse error if the result is an error.
    fn with_context<F>(self, f: F) -> ConfigResult<T>
    where
        F: FnOnce() -> String;

    /// Maps a ConfigError to a different ConfigError variant.
    fn map_config_err<F>(self, f: F) -> ConfigResult<T>
    where
        F: FnOnce(ConfigError) -> ConfigError;
}

impl<T> ConfigResultExt<T> for ConfigResult<T> {
    fn with_context<F>(self, f: F) -> ConfigResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|err| match err {
            ConfigError::Parse {
                source_name,
                message,
            } => ConfigError::Parse {
                source_name,
                message: format!("{}: {}", f(), message),
            },
            other => other,
        })
    }

    fn map_config_err<F>(self, f: F) -> ConfigResult<T>
    where
        F: FnOnce(ConfigError) -> ConfigError,
    {
        self.map_err(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_unconvertible_display_lists_formats() {
        let error = ConfigError::unconvertible(
            "timeout",
            "abc",
            "i32",
            vec!["<i32> (I32Converter)".to_string(), "0x<hex> (I32Converter)".to_string()],
        );
        let text = error.to_string();
        assert!(text.contains("'timeout'"));
        assert!(text.contains("i32"));
        assert!(text.contains("<i32> (I32Converter), 0x<hex> (I32Converter)"));
        assert_eq!(error.attempted_formats().len(), 2);
        assert!(error.is_unconvertible());
    }

    #[test]
    fn test_ambiguous_service_display() {
        let error = ConfigError::ambiguous_service(
            "combination policy",
            5,
            vec!["A".to_string(), "B".to_string()],
        );
        assert_eq!(
            error.to_string(),
            "Ambiguous combination policy: 2 candidates share priority 5: [A, B]"
        );
    }

    #[test]
    fn test_parse_error_display() {
        let error = ConfigError::parse_error("config.yaml", "invalid YAML syntax");
        assert_eq!(
            error.to_string(),
            "Parse error in config.yaml: invalid YAML syntax"
        );
        assert!(error.is_parse_error());
        assert!(!error.is_io_error());
        assert!(error.attempted_formats().is_empty());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let config_error: ConfigError = io_error.into();
        assert!(config_error.is_io_error());
    }

    #[test]
    fn test_with_context_only_touches_parse_errors() {
        let result: ConfigResult<()> = Err(ConfigError::parse_error("a.json", "bad token"));
        match result.with_context(|| "loading defaults".to_string()) {
            Err(ConfigError::Parse { message, .. }) => {
                assert_eq!(message, "loading defaults: bad token");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let result: ConfigResult<()> = Err(ConfigError::invalid_value("x"));
        let result = result.with_context(|| "ignored".to_string());
        assert!(matches!(result, Err(ConfigError::InvalidValue(m)) if m == "x"));
    }

    #[test]
    fn test_map_config_err() {
        let result: ConfigResult<()> = Err(ConfigError::file_watch("gone"));
        let mapped = result.map_config_err(|e| ConfigError::Observer(e.to_string()));
        assert!(matches!(mapped, Err(ConfigError::Observer(m)) if m.contains("gone")));
    }
}
