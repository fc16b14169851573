//! File-backed property source.

use crate::error::{ConfigError, ConfigResult};
use crate::parser::{detect_parser_by_extension, ConfigParser, SUPPORTED_EXTENSIONS};
use crate::source::{PropertySource, ORDINAL_KEY};
use crate::value::{ConfigValue, PropertyValue};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::debug;

/// Default ordinal of file sources without a `tamaya.ordinal` entry.
pub const FILE_ORDINAL: i32 = 100;

/// Property source loading one configuration file.
///
/// The parsed content is flattened to dotted keys and kept in an atomically
/// swappable snapshot, so [`reload`](FilePropertySource::reload) can run
/// through a shared reference while readers keep answering lookups.
pub struct FilePropertySource {
    data: ArcSwap<HashMap<String, String>>,
    file_path: PathBuf,
    parser: Box<dyn ConfigParser>,
    last_modified: Mutex<Option<SystemTime>>,
    name: String,
    ordinal: Option<i32>,
}

impl std::fmt::Debug for FilePropertySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePropertySource")
            .field("file_path", &self.file_path)
            .field("parser", &self.parser.name())
            .field("entries", &self.data.load().len())
            .field("ordinal", &self.ordinal)
            .finish()
    }
}

impl FilePropertySource {
    /// Loads a file, choosing the parser from its extension.
    ///
    /// # Errors
    /// * `ConfigError::UnsupportedFormat` - If the file extension is not supported
    /// * `ConfigError::Io` - If the file cannot be read
    /// * `ConfigError::Parse` - If the file content cannot be parsed
    pub fn new<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;
        let parser = detect_parser_by_extension(extension)?;
        Self::with_parser(path, parser)
    }

    /// Loads a file with an explicit parser.
    pub fn with_parser<P: AsRef<Path>>(
        path: P,
        parser: Box<dyn ConfigParser>,
    ) -> ConfigResult<Self> {
        let file_path = path.as_ref().to_path_buf();
        let source = Self {
            data: ArcSwap::from_pointee(HashMap::new()),
            name: file_path.display().to_string(),
            file_path,
            parser,
            last_modified: Mutex::new(None),
            ordinal: None,
        };
        source.reload()?;
        Ok(source)
    }

    /// Searches `paths` (then the user configuration directory) for
    /// `<name>.<ext>` with any supported extension and loads every match.
    pub fn discover<P: AsRef<Path>>(name: &str, paths: &[P]) -> ConfigResult<Vec<Self>> {
        let mut dirs: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
        if let Some(config_dir) = dirs::config_dir() {
            dirs.push(config_dir);
        }

        let mut found = Vec::new();
        for dir in dirs {
            for ext in SUPPORTED_EXTENSIONS {
                let candidate = dir.join(format!("{name}.{ext}"));
                if candidate.is_file() {
                    debug!(path = %candidate.display(), "discovered configuration file");
                    found.push(Self::new(candidate)?);
                }
            }
        }
        Ok(found)
    }

    /// Fixes the ordinal, ignoring any `tamaya.ordinal` entry in the file.
    pub fn with_ordinal(mut self, ordinal: i32) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    /// Re-reads and re-parses the file, swapping in the new content.
    ///
    /// Returns whether the content changed. On error the previous content
    /// stays in place.
    pub fn reload(&self) -> ConfigResult<bool> {
        if !self.file_path.exists() {
            return Err(ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Configuration file not found: {}", self.file_path.display()),
            )));
        }

        let content = fs::read_to_string(&self.file_path)?;
        let tree = self.parser.parse(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::parse_error(&self.name, message),
            other => other,
        })?;
        let flattened = ConfigValue::flatten(&tree);

        let modified = fs::metadata(&self.file_path)
            .and_then(|metadata| metadata.modified())
            .ok();
        *self.last_modified.lock().unwrap_or_else(|e| e.into_inner()) = modified;

        let changed = **self.data.load() != flattened;
        if changed {
            self.data.store(Arc::new(flattened));
        }
        Ok(changed)
    }

    /// Checks if the file has been modified since it was last loaded.
    pub fn is_modified(&self) -> ConfigResult<bool> {
        let last = *self.last_modified.lock().unwrap_or_else(|e| e.into_inner());
        match last {
            Some(last_modified) => {
                let current = fs::metadata(&self.file_path)?.modified()?;
                Ok(current > last_modified)
            }
            None => Ok(true),
        }
    }

    /// Returns the file path of this source.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Returns the parser used by this source.
    pub fn parser(&self) -> &dyn ConfigParser {
        self.parser.as_ref()
    }
}

impl PropertySource for FilePropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn ordinal(&self) -> i32 {
        if let Some(ordinal) = self.ordinal {
            return ordinal;
        }
        self.data
            .load()
            .get(ORDINAL_KEY)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(FILE_ORDINAL)
    }

    fn get(&self, key: &str) -> ConfigResult<Option<PropertyValue>> {
        Ok(self
            .data
            .load()
            .get(key)
            .map(|value| PropertyValue::of(key, value.clone(), self.name.clone())))
    }

    fn properties(&self) -> ConfigResult<HashMap<String, PropertyValue>> {
        Ok(self
            .data
            .load()
            .iter()
            .map(|(k, v)| (k.clone(), PropertyValue::of(k.clone(), v.clone(), self.name.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_json_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "app.json", r#"{"server": {"port": 8080}}"#);

        let source = FilePropertySource::new(&path).unwrap();
        assert_eq!(source.parser().name(), "JSON");
        assert_eq!(source.ordinal(), FILE_ORDINAL);
        let value = source.get("server.port").unwrap().unwrap();
        assert_eq!(value.value(), Some("8080"));
        assert_eq!(value.source(), Some(path.display().to_string().as_str()));
    }

    #[test]
    fn test_ordinal_from_file_content() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "app.properties", "tamaya.ordinal=250\na=1\n");

        let source = FilePropertySource::new(&path).unwrap();
        assert_eq!(source.ordinal(), 250);
        assert_eq!(source.with_ordinal(3).ordinal(), 3);
    }

    #[test]
    fn test_unsupported_and_missing_files() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "app.xml", "<a/>");
        assert!(matches!(
            FilePropertySource::new(&path),
            Err(ConfigError::UnsupportedFormat(_))
        ));

        let missing = dir.path().join("missing.yaml");
        assert!(FilePropertySource::new(missing).unwrap_err().is_io_error());
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "broken.json", "{ nope");
        match FilePropertySource::new(&path) {
            Err(ConfigError::Parse { source_name, .. }) => {
                assert_eq!(source_name, path.display().to_string());
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_reload_swaps_content() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "app.yaml", "a: 1\n");
        let source = FilePropertySource::new(&path).unwrap();

        assert!(!source.reload().unwrap());

        fs::write(&path, "a: 2\nb: 3\n").unwrap();
        assert!(source.reload().unwrap());
        assert_eq!(source.get("a").unwrap().unwrap().value(), Some("2"));
        assert_eq!(source.properties().unwrap().len(), 2);

        fs::write(&path, "a: [unclosed\n").unwrap();
        assert!(source.reload().is_err());
        assert_eq!(source.get("a").unwrap().unwrap().value(), Some("2"));
    }

    #[test]
    fn test_discover_finds_all_formats() {
        let dir = TempDir::new().unwrap();
        write(&dir, "tamaya-discover-test.toml", "a = 1\n");
        write(&dir, "tamaya-discover-test.properties", "b=2\n");
        write(&dir, "other.json", "{}");

        let found = FilePropertySource::discover("tamaya-discover-test", &[dir.path()]).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].parser().name(), "Properties");
        assert_eq!(found[1].parser().name(), "TOML");
    }
}
