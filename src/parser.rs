//! Configuration file parsers.
//!
//! Each parser turns file content into a tree of [`ConfigValue`]s keyed by the
//! top-level names; [`ConfigValue::flatten`] then produces the dotted string
//! keys that property sources expose.
//!
//! Supported formats:
//! - JSON (`.json`)
//! - YAML (`.yaml`, `.yml`)
//! - TOML (`.toml`)
//! - INI (`.ini`), sections become key prefixes
//! - Java-style properties (`.properties`)
//!
//! ```rust
//! use tamaya::parser::detect_parser_by_extension;
//!
//! let parser = detect_parser_by_extension("yml").unwrap();
//! assert_eq!(parser.name(), "YAML");
//! ```

use crate::error::{ConfigError, ConfigResult};
use crate::value::ConfigValue;
use std::collections::HashMap;

/// Parses the content of one configuration file format.
pub trait ConfigParser: Send + Sync {
    /// Parses configuration content into a key-value tree.
    ///
    /// # Errors
    /// * `ConfigError::Parse` - If the content cannot be parsed due to syntax errors
    fn parse(&self, content: &str) -> ConfigResult<HashMap<String, ConfigValue>>;

    /// File extensions (without the dot) this parser handles.
    fn supported_extensions(&self) -> &[&str];

    /// Human-readable format name used in error messages.
    fn name(&self) -> &str;
}

/// Returns the parser registered for a file extension (case-insensitive).
///
/// # Errors
/// * `ConfigError::UnsupportedFormat` - If no parser handles the extension
pub fn detect_parser_by_extension(extension: &str) -> ConfigResult<Box<dyn ConfigParser>> {
    match extension.to_lowercase().as_str() {
        "json" => Ok(Box::new(JsonParser)),
        "yaml" | "yml" => Ok(Box::new(YamlParser)),
        "toml" => Ok(Box::new(TomlParser)),
        "ini" => Ok(Box::new(IniParser)),
        "properties" => Ok(Box::new(PropertiesParser)),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

/// All extensions a parser exists for, in discovery order.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["properties", "json", "yaml", "yml", "toml", "ini"];

/// JSON configuration parser. The root must be an object.
pub struct JsonParser;

impl ConfigParser for JsonParser {
    fn parse(&self, content: &str) -> ConfigResult<HashMap<String, ConfigValue>> {
        let value: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| ConfigError::parse_error("JSON", e.to_string()))?;

        convert_json_value(value)
    }

    fn supported_extensions(&self) -> &[&str] {
        &["json"]
    }

    fn name(&self) -> &str {
        "JSON"
    }
}

/// YAML configuration parser. The root must be a mapping.
pub struct YamlParser;

impl ConfigParser for YamlParser {
    fn parse(&self, content: &str) -> ConfigResult<HashMap<String, ConfigValue>> {
        let value: serde_yaml::Value = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::parse_error("YAML", e.to_string()))?;

        convert_yaml_value(value)
    }

    fn supported_extensions(&self) -> &[&str] {
        &["yaml", "yml"]
    }

    fn name(&self) -> &str {
        "YAML"
    }
}

/// TOML configuration parser. Datetimes are kept as their string form.
pub struct TomlParser;

impl ConfigParser for TomlParser {
    fn parse(&self, content: &str) -> ConfigResult<HashMap<String, ConfigValue>> {
        let value: toml::Value =
            toml::from_str(content).map_err(|e| ConfigError::parse_error("TOML", e.to_string()))?;

        convert_toml_value(value)
    }

    fn supported_extensions(&self) -> &[&str] {
        &["toml"]
    }

    fn name(&self) -> &str {
        "TOML"
    }
}

/// INI configuration parser.
///
/// Global keys stay at the root; `[section]` keys end up under `section.`.
/// Comments start with `;` or `#`. Values are kept verbatim as strings.
pub struct IniParser;

impl ConfigParser for IniParser {
    fn parse(&self, content: &str) -> ConfigResult<HashMap<String, ConfigValue>> {
        parse_ini_content(content)
    }

    fn supported_extensions(&self) -> &[&str] {
        &["ini"]
    }

    fn name(&self) -> &str {
        "INI"
    }
}

fn parse_ini_content(content: &str) -> ConfigResult<HashMap<String, ConfigValue>> {
    let mut result = HashMap::new();
    let mut current_section: Option<String> = None;
    let mut current_section_data = HashMap::new();

    for (number, line) in content.lines().enumerate() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            if let Some(section_name) = current_section.take() {
                merge_section(&mut result, section_name, std::mem::take(&mut current_section_data));
            }

            let section_name = line[1..line.len() - 1].trim().to_string();
            if section_name.is_empty() {
                return Err(ConfigError::parse_error(
                    "INI",
                    format!("Empty section name on line {}", number + 1),
                ));
            }
            current_section = Some(section_name);
            continue;
        }

        let Some(eq_pos) = line.find('=') else {
            return Err(ConfigError::parse_error(
                "INI",
                format!("Invalid line format on line {}: {line}", number + 1),
            ));
        };

        let key = line[..eq_pos].trim().to_string();
        if key.is_empty() {
            return Err(ConfigError::parse_error(
                "INI",
                format!("Empty key name on line {}", number + 1),
            ));
        }
        let value = ConfigValue::String(unquote(line[eq_pos + 1..].trim()).to_string());

        if current_section.is_some() {
            current_section_data.insert(key, value);
        } else {
            result.insert(key, value);
        }
    }

    if let Some(section_name) = current_section {
        merge_section(&mut result, section_name, current_section_data);
    }

    Ok(result)
}

fn merge_section(
    result: &mut HashMap<String, ConfigValue>,
    section: String,
    data: HashMap<String, ConfigValue>,
) {
    match result.get_mut(&section) {
        Some(ConfigValue::Object(existing)) => existing.extend(data),
        _ => {
            result.insert(section, ConfigValue::Object(data));
        }
    }
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Java-style `.properties` parser.
///
/// Supports `key=value`, `key: value` and `key value` separators, `#` and `!`
/// comment lines, trailing-backslash line continuation and the `\n`, `\t`,
/// `\\` and `\uXXXX` escapes. Keys are returned flat, exactly as written.
pub struct PropertiesParser;

impl ConfigParser for PropertiesParser {
    fn parse(&self, content: &str) -> ConfigResult<HashMap<String, ConfigValue>> {
        let mut result = HashMap::new();
        let mut logical = String::new();

        for line in content.lines() {
            let trimmed = line.trim_start();
            if logical.is_empty() && (trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!')) {
                continue;
            }

            if ends_with_continuation(trimmed) {
                logical.push_str(&trimmed[..trimmed.len() - 1]);
                continue;
            }
            logical.push_str(trimmed);

            let (key, value) = split_property_line(&logical);
            result.insert(unescape_properties(key)?, ConfigValue::String(unescape_properties(value)?));
            logical.clear();
        }

        if !logical.is_empty() {
            let (key, value) = split_property_line(&logical);
            result.insert(unescape_properties(key)?, ConfigValue::String(unescape_properties(value)?));
        }

        Ok(result)
    }

    fn supported_extensions(&self) -> &[&str] {
        &["properties"]
    }

    fn name(&self) -> &str {
        "Properties"
    }
}

fn ends_with_continuation(line: &str) -> bool {
    let trailing = line.chars().rev().take_while(|c| *c == '\\').count();
    trailing % 2 == 1
}

fn split_property_line(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (idx, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '=' | ':' => return (line[..idx].trim_end(), line[idx + 1..].trim_start()),
            c if c.is_whitespace() => {
                let rest = line[idx..].trim_start();
                let rest = rest
                    .strip_prefix('=')
                    .or_else(|| rest.strip_prefix(':'))
                    .unwrap_or(rest);
                return (&line[..idx], rest.trim_start());
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape_properties(text: &str) -> ConfigResult<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| {
                        ConfigError::parse_error("Properties", format!("Invalid unicode escape \\u{hex}"))
                    })?;
                out.push(code);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    Ok(out)
}

fn convert_json_value(value: serde_json::Value) -> ConfigResult<HashMap<String, ConfigValue>> {
    match value {
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (k, json_to_config_value(v)))
            .collect()),
        _ => Err(ConfigError::parse_error("JSON", "Root must be an object")),
    }
}

fn json_to_config_value(value: serde_json::Value) -> ConfigValue {
    match value {
        serde_json::Value::String(s) => ConfigValue::String(s),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                ConfigValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                ConfigValue::Float(f)
            } else {
                ConfigValue::String(n.to_string())
            }
        }
        serde_json::Value::Bool(b) => ConfigValue::Boolean(b),
        serde_json::Value::Array(arr) => {
            ConfigValue::Array(arr.into_iter().map(json_to_config_value).collect())
        }
        serde_json::Value::Object(obj) => ConfigValue::Object(
            obj.into_iter()
                .map(|(k, v)| (k, json_to_config_value(v)))
                .collect(),
        ),
        serde_json::Value::Null => ConfigValue::Null,
    }
}

fn convert_yaml_value(value: serde_yaml::Value) -> ConfigResult<HashMap<String, ConfigValue>> {
    match value {
        serde_yaml::Value::Mapping(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (yaml_key_to_string(k), yaml_to_config_value(v)))
            .collect()),
        // An empty document parses to null.
        serde_yaml::Value::Null => Ok(HashMap::new()),
        _ => Err(ConfigError::parse_error(
            "YAML",
            "Root must be a mapping/object",
        )),
    }
}

fn yaml_to_config_value(value: serde_yaml::Value) -> ConfigValue {
    match value {
        serde_yaml::Value::String(s) => ConfigValue::String(s),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                ConfigValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                ConfigValue::Float(f)
            } else {
                ConfigValue::String(n.to_string())
            }
        }
        serde_yaml::Value::Bool(b) => ConfigValue::Boolean(b),
        serde_yaml::Value::Sequence(arr) => {
            ConfigValue::Array(arr.into_iter().map(yaml_to_config_value).collect())
        }
        serde_yaml::Value::Mapping(map) => ConfigValue::Object(
            map.into_iter()
                .map(|(k, v)| (yaml_key_to_string(k), yaml_to_config_value(v)))
                .collect(),
        ),
        serde_yaml::Value::Null => ConfigValue::Null,
        serde_yaml::Value::Tagged(tagged) => yaml_to_config_value(tagged.value),
    }
}

fn yaml_key_to_string(value: serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Null => "null".to_string(),
        other => format!("{other:?}"),
    }
}

fn convert_toml_value(value: toml::Value) -> ConfigResult<HashMap<String, ConfigValue>> {
    match value {
        toml::Value::Table(table) => Ok(table
            .into_iter()
            .map(|(k, v)| (k, toml_to_config_value(v)))
            .collect()),
        _ => Err(ConfigError::parse_error(
            "TOML",
            "Root must be a table/object",
        )),
    }
}

fn toml_to_config_value(value: toml::Value) -> ConfigValue {
    match value {
        toml::Value::String(s) => ConfigValue::String(s),
        toml::Value::Integer(i) => ConfigValue::Integer(i),
        toml::Value::Float(f) => ConfigValue::Float(f),
        toml::Value::Boolean(b) => ConfigValue::Boolean(b),
        toml::Value::Array(arr) => {
            ConfigValue::Array(arr.into_iter().map(toml_to_config_value).collect())
        }
        toml::Value::Table(table) => ConfigValue::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_config_value(v)))
                .collect(),
        ),
        toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
    }
}
