//! # Tamaya
//!
//! A configuration access facade. Values come from any number of prioritized
//! property sources, pass through a chain of property filters and are
//! converted to typed values by a registry of converters.
//!
//! ## Resolution pipeline
//!
//! A call to [`Configuration::get_as`] runs three stages:
//!
//! 1. **Combination**: the property sources are consulted by ordinal and a
//!    [`CombinationPolicy`] decides the raw value. With the default
//!    [`OverridingPolicy`] the source with the highest ordinal wins.
//! 2. **Filtering**: the [`FilterChain`] applies every filter in priority
//!    order, repeating whole passes until the value stops changing or
//!    [`MAX_FILTER_LOOPS`] passes have run. The default
//!    [`ExpressionResolutionFilter`] resolves `${key}` and `${env:VAR}`.
//! 3. **Conversion**: the [`ConverterRegistry`] tries the converters for the
//!    target type in priority order; the first non-empty result wins.
//!
//! A key no source defines is not an error: lookups return `None`. A value
//! no converter accepts is reported as [`ConfigError::Unconvertible`],
//! listing every format the converters declared.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use tamaya::{Configuration, MapPropertySource};
//!
//! let config = Configuration::builder()
//!     .add_source(
//!         MapPropertySource::new("defaults")
//!             .with_value("server.port", "8080")
//!             .with_value("server.timeout", "30s")
//!             .with_ordinal(10),
//!     )
//!     .add_source(
//!         MapPropertySource::new("overrides")
//!             .with_value("server.port", "0x1F90")
//!             .with_value("server.url", "http://localhost:${server.port}/")
//!             .with_ordinal(20),
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.get_as::<u16>("server.port").unwrap(), Some(8080));
//! assert_eq!(
//!     config.get_as::<Duration>("server.timeout").unwrap(),
//!     Some(Duration::from_secs(30))
//! );
//! assert_eq!(
//!     config.get("server.url").as_deref(),
//!     Some("http://localhost:0x1F90/")
//! );
//! assert_eq!(config.get_as::<u16>("server.missing").unwrap(), None);
//! ```
//!
//! ## Property sources
//!
//! | Source                 | Ordinal | Content                                |
//! |------------------------|---------|----------------------------------------|
//! | [`CliPropertySource`]  | 1000    | `--key=value` command line arguments   |
//! | [`EnvPropertySource`]  | 300     | environment variables                  |
//! | [`FilePropertySource`] | 100     | JSON, YAML, TOML, INI, `.properties`   |
//! | [`MapPropertySource`]  | 0       | in-memory values                       |
//!
//! Every source may override its ordinal with a `tamaya.ordinal` entry.
//!
//! ## Observing changes
//!
//! [`ChangeObserver`] polls [`Configuration::properties`] and publishes a
//! [`ConfigurationChange`] per difference; [`FileWatcher`] reloads file
//! sources when the files change on disk.

pub mod change;
pub mod cli;
pub mod combination;
pub mod config;
pub mod context;
pub mod conversion;
pub mod env_source;
pub mod error;
pub mod expression;
pub mod file_source;
pub mod filter;
pub mod map_source;
pub mod observer;
pub mod parser;
pub mod source;
pub mod value;
pub mod watcher;

// Re-export main types for convenience
pub use change::{ChangeType, ConfigurationChange, PropertyChange, PropertySourceChange};
pub use cli::CliPropertySource;
pub use combination::{CollectingPolicy, CombinationPolicy, OverridingPolicy};
pub use config::Configuration;
pub use context::{ConfigurationBuilder, ConfigurationContext};
pub use conversion::{
    ConfigEnum, ConversionContext, ConverterRegistry, FnConverter, InjectionSite, PropertyConverter,
    TypeKey,
};
pub use env_source::EnvPropertySource;
pub use error::{ConfigError, ConfigResult};
pub use expression::ExpressionResolutionFilter;
pub use file_source::FilePropertySource;
pub use filter::{FilterChain, FilterContext, FilterOutcome, PropertyFilter, MAX_FILTER_LOOPS};
pub use map_source::MapPropertySource;
pub use observer::{ChangeObserver, Dispatch, ObserverSettings};
pub use source::PropertySource;
pub use value::PropertyValue;
pub use watcher::FileWatcher;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
