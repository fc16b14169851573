//! Built-in converters for standard, `url` and `chrono` types.

use super::{ConversionContext, ConverterRegistry, PropertyConverter};
use crate::error::{ConfigError, ConfigResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::fmt::Display;
use std::marker::PhantomData;
use std::net::{IpAddr, SocketAddr};
use std::num::ParseIntError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Registers every built-in converter at priority `0`.
pub fn register_defaults(registry: &ConverterRegistry) {
    registry.register::<bool, _>(0, BoolConverter);
    registry.register::<char, _>(0, CharConverter);

    register_integer::<i8>(registry);
    register_integer::<i16>(registry);
    register_integer::<i32>(registry);
    register_integer::<i64>(registry);
    register_integer::<i128>(registry);
    register_integer::<isize>(registry);
    register_integer::<u8>(registry);
    register_integer::<u16>(registry);
    register_integer::<u32>(registry);
    register_integer::<u64>(registry);
    register_integer::<u128>(registry);
    register_integer::<usize>(registry);

    registry.register::<f32, _>(0, FloatConverter::<f32>(PhantomData));
    registry.register::<f64, _>(0, FloatConverter::<f64>(PhantomData));

    registry.register::<Duration, _>(0, DurationConverter);
    registry.register::<PathBuf, _>(0, ParseConverter::<PathBuf>::new("PathConverter", &["<path>"]));
    registry.register::<url::Url, _>(
        0,
        ParseConverter::<url::Url>::new("UrlConverter", &["<scheme>://<host>[:<port>][/<path>]"]),
    );
    registry.register::<IpAddr, _>(
        0,
        ParseConverter::<IpAddr>::new("IpAddrConverter", &["<ipv4>", "<ipv6>"]),
    );
    registry.register::<SocketAddr, _>(
        0,
        ParseConverter::<SocketAddr>::new("SocketAddrConverter", &["<ip>:<port>"]),
    );
    registry.register::<DateTime<Utc>, _>(
        0,
        ParseConverter::<DateTime<Utc>>::new("DateTimeConverter", &["yyyy-MM-ddTHH:mm:ss[.SSS]Z|±hh:mm (RFC 3339)"]),
    );
    registry.register::<NaiveDate, _>(0, ParseConverter::<NaiveDate>::new("DateConverter", &["yyyy-MM-dd"]));
    registry.register::<NaiveTime, _>(0, ParseConverter::<NaiveTime>::new("TimeConverter", &["HH:mm[:ss[.SSS]]"]));
    registry.register::<NaiveDateTime, _>(
        0,
        ParseConverter::<NaiveDateTime>::new("DateTimeLocalConverter", &["yyyy-MM-ddTHH:mm:ss[.SSS]"]),
    );
}

fn register_integer<T: Integer>(registry: &ConverterRegistry) {
    registry.register::<T, _>(0, IntegerConverter::<T>(PhantomData));
}

/// Splits a list value on commas not escaped as `\,`.
///
/// Elements are trimmed and empty elements dropped.
///
/// ```
/// use tamaya::conversion::builtin::split_list;
///
/// assert_eq!(split_list("a, b\\,c ,,d"), vec!["a", "b,c", "d"]);
/// ```
pub fn split_list(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&',') => {
                current.push(',');
                chars.next();
            }
            ',' => items.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    items.push(current);
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

pub struct BoolConverter;

impl PropertyConverter<bool> for BoolConverter {
    fn convert(&self, value: &str, ctx: &ConversionContext) -> ConfigResult<Option<bool>> {
        ctx.add_supported_formats(
            self.name(),
            &["true|yes|y|t|on (ignoring case)", "false|no|n|f|off (ignoring case)"],
        );
        Ok(match value.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "t" | "on" => Some(true),
            "false" | "no" | "n" | "f" | "off" => Some(false),
            _ => None,
        })
    }

    fn name(&self) -> &str {
        "BoolConverter"
    }
}

pub struct CharConverter;

impl PropertyConverter<char> for CharConverter {
    fn convert(&self, value: &str, ctx: &ConversionContext) -> ConfigResult<Option<char>> {
        ctx.add_supported_formats(self.name(), &["<char>", "'<char>'"]);
        let chars: Vec<char> = value.chars().collect();
        Ok(match chars.as_slice() {
            [c] => Some(*c),
            ['\'', c, '\''] => Some(*c),
            _ => None,
        })
    }

    fn name(&self) -> &str {
        "CharConverter"
    }
}

/// Integer types handled by [`IntegerConverter`].
pub trait Integer: FromStr<Err = ParseIntError> + Send + Sync + 'static {
    const TYPE: &'static str;
    const CONVERTER: &'static str;
    const MIN: Self;
    const MAX: Self;

    fn parse_radix(digits: &str, radix: u32) -> Result<Self, ParseIntError>;
}

macro_rules! integer {
    ($($t:ty => $name:literal),* $(,)?) => {
        $(
            impl Integer for $t {
                const TYPE: &'static str = stringify!($t);
                const CONVERTER: &'static str = $name;
                const MIN: Self = <$t>::MIN;
                const MAX: Self = <$t>::MAX;

                fn parse_radix(digits: &str, radix: u32) -> Result<Self, ParseIntError> {
                    <$t>::from_str_radix(digits, radix)
                }
            }
        )*
    };
}

integer!(
    i8 => "I8Converter",
    i16 => "I16Converter",
    i32 => "I32Converter",
    i64 => "I64Converter",
    i128 => "I128Converter",
    isize => "IsizeConverter",
    u8 => "U8Converter",
    u16 => "U16Converter",
    u32 => "U32Converter",
    u64 => "U64Converter",
    u128 => "U128Converter",
    usize => "UsizeConverter",
);

/// Decimal, `0x`/`#` hexadecimal, `MIN_VALUE` and `MAX_VALUE`.
pub struct IntegerConverter<T>(PhantomData<fn() -> T>);

impl<T> Default for IntegerConverter<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: Integer> PropertyConverter<T> for IntegerConverter<T> {
    fn convert(&self, value: &str, ctx: &ConversionContext) -> ConfigResult<Option<T>> {
        let plain = format!("<{}>", T::TYPE);
        ctx.add_supported_formats(
            T::CONVERTER,
            &[plain.as_str(), "0x<hex>", "#<hex>", "MIN_VALUE", "MAX_VALUE"],
        );

        let trimmed = value.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "MIN_VALUE" => return Ok(Some(T::MIN)),
            "MAX_VALUE" => return Ok(Some(T::MAX)),
            _ => {}
        }

        let (sign, unsigned) = match trimmed.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let hex = unsigned
            .strip_prefix("0x")
            .or_else(|| unsigned.strip_prefix("0X"))
            .or_else(|| unsigned.strip_prefix('#'));
        let parsed = match hex {
            Some(digits) => T::parse_radix(&format!("{sign}{digits}"), 16),
            None => trimmed.parse::<T>(),
        };
        parsed
            .map(Some)
            .map_err(|e| ConfigError::invalid_value(format!("'{trimmed}' is not a valid {}: {e}", T::TYPE)))
    }

    fn name(&self) -> &str {
        T::CONVERTER
    }
}

/// Floating point types handled by [`FloatConverter`].
pub trait Float: FromStr + Send + Sync + 'static {
    const TYPE: &'static str;
    const CONVERTER: &'static str;
    const NAN: Self;
    const INFINITY: Self;
    const NEG_INFINITY: Self;
    const MAX: Self;

    /// Smallest positive value.
    fn min_value() -> Self;
}

impl Float for f32 {
    const TYPE: &'static str = "f32";
    const CONVERTER: &'static str = "F32Converter";
    const NAN: Self = f32::NAN;
    const INFINITY: Self = f32::INFINITY;
    const NEG_INFINITY: Self = f32::NEG_INFINITY;
    const MAX: Self = f32::MAX;

    fn min_value() -> Self {
        f32::from_bits(1)
    }
}

impl Float for f64 {
    const TYPE: &'static str = "f64";
    const CONVERTER: &'static str = "F64Converter";
    const NAN: Self = f64::NAN;
    const INFINITY: Self = f64::INFINITY;
    const NEG_INFINITY: Self = f64::NEG_INFINITY;
    const MAX: Self = f64::MAX;

    fn min_value() -> Self {
        f64::from_bits(1)
    }
}

pub struct FloatConverter<T>(PhantomData<fn() -> T>);

impl<T> Default for FloatConverter<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: Float> PropertyConverter<T> for FloatConverter<T>
where
    T::Err: Display,
{
    fn convert(&self, value: &str, ctx: &ConversionContext) -> ConfigResult<Option<T>> {
        let plain = format!("<{}>", T::TYPE);
        ctx.add_supported_formats(
            T::CONVERTER,
            &[
                plain.as_str(),
                "NaN",
                "POSITIVE_INFINITY",
                "NEGATIVE_INFINITY",
                "MIN_VALUE",
                "MAX_VALUE",
            ],
        );

        let trimmed = value.trim();
        let special = match trimmed {
            "NaN" => Some(T::NAN),
            "POSITIVE_INFINITY" => Some(T::INFINITY),
            "NEGATIVE_INFINITY" => Some(T::NEG_INFINITY),
            "MIN_VALUE" => Some(T::min_value()),
            "MAX_VALUE" => Some(T::MAX),
            _ => None,
        };
        if special.is_some() {
            return Ok(special);
        }
        trimmed
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::invalid_value(format!("'{trimmed}' is not a valid {}: {e}", T::TYPE)))
    }

    fn name(&self) -> &str {
        T::CONVERTER
    }
}

/// ISO-8601 durations (`PT1H30M`, `P2DT3H`, `PT0.5S`) and suffixed
/// amounts (`250ms`, `30s`, `5m`, `2h`, `1d`, also `ns` and `us`).
pub struct DurationConverter;

impl PropertyConverter<Duration> for DurationConverter {
    fn convert(&self, value: &str, ctx: &ConversionContext) -> ConfigResult<Option<Duration>> {
        ctx.add_supported_formats(
            self.name(),
            &["P[<d>D][T[<h>H][<m>M][<s>S]] (ISO-8601)", "<n>ns|us|ms|s|m|h|d"],
        );
        Ok(parse_duration(value))
    }

    fn name(&self) -> &str {
        "DurationConverter"
    }
}

fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    let upper = text.to_ascii_uppercase();
    if let Some(iso) = upper.strip_prefix('P') {
        return parse_iso_duration(iso);
    }

    let split = text.find(|c: char| c.is_ascii_alphabetic())?;
    let (number, unit) = text.split_at(split);
    let number = number.trim();
    if let Ok(amount) = number.parse::<u64>() {
        return match unit {
            "ns" => Some(Duration::from_nanos(amount)),
            "us" => Some(Duration::from_micros(amount)),
            "ms" => Some(Duration::from_millis(amount)),
            "s" => Some(Duration::from_secs(amount)),
            "m" | "min" => amount.checked_mul(60).map(Duration::from_secs),
            "h" => amount.checked_mul(3_600).map(Duration::from_secs),
            "d" => amount.checked_mul(86_400).map(Duration::from_secs),
            _ => None,
        };
    }

    let amount: f64 = number.parse().ok()?;
    let unit_seconds = match unit {
        "ns" => 1e-9,
        "us" => 1e-6,
        "ms" => 1e-3,
        "s" => 1.0,
        "m" | "min" => 60.0,
        "h" => 3_600.0,
        "d" => 86_400.0,
        _ => return None,
    };
    Duration::try_from_secs_f64(amount * unit_seconds).ok()
}

fn parse_iso_duration(body: &str) -> Option<Duration> {
    let (date, time) = match body.split_once('T') {
        Some((date, time)) => (date, time),
        None => (body, ""),
    };
    if date.is_empty() && time.is_empty() {
        return None;
    }

    let mut seconds = 0.0;
    if !date.is_empty() {
        let days: f64 = date.strip_suffix('D')?.parse().ok()?;
        seconds += days * 86_400.0;
    }

    let mut rest = time;
    for (unit, factor) in [('H', 3_600.0), ('M', 60.0), ('S', 1.0)] {
        if let Some(index) = rest.find(unit) {
            let amount: f64 = rest[..index].parse().ok()?;
            seconds += amount * factor;
            rest = &rest[index + 1..];
        }
    }
    if !rest.is_empty() {
        return None;
    }
    Duration::try_from_secs_f64(seconds).ok()
}

/// Converter delegating to a type's `FromStr`, declaring fixed formats.
pub struct ParseConverter<T> {
    name: &'static str,
    formats: &'static [&'static str],
    _target: PhantomData<fn() -> T>,
}

impl<T> ParseConverter<T> {
    pub fn new(name: &'static str, formats: &'static [&'static str]) -> Self {
        Self {
            name,
            formats,
            _target: PhantomData,
        }
    }
}

impl<T> PropertyConverter<T> for ParseConverter<T>
where
    T: FromStr + 'static,
    T::Err: Display,
{
    fn convert(&self, value: &str, ctx: &ConversionContext) -> ConfigResult<Option<T>> {
        ctx.add_supported_formats(self.name, self.formats);
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::invalid_value(format!("'{trimmed}' rejected by {}: {e}", self.name)))
    }

    fn name(&self) -> &str {
        self.name
    }
}
