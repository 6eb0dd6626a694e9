use alloc::{
    collections::BTreeMap,
    string::String,
    sync::Arc,
};
use anyhow::{anyhow, Context as _};
use core::{any::type_name, str::FromStr, time::Duration};
use tracing::{debug, error};

use crate::{any::TypeInfo, errors::PropertyErrorKind, Instance};

type ConvertFn = Arc<dyn Fn(&str) -> anyhow::Result<Instance> + Send + Sync>;

/// Configuration store used to fill value injection points.
///
/// Keys are looked up either as is (`app.title`) or as placeholders:
/// - `${app.title}`: value of `app.title`
/// - `${app.title:Wirebox}`: value of `app.title` or `Wirebox` if it's absent
/// - `${app.title:${app.name:Wirebox}}`: defaults may contain placeholders, e.g. `${app.title:${app.name} v2}`
#[derive(Clone)]
pub struct PropertyResolver {
    properties: BTreeMap<String, String>,
    converters: BTreeMap<TypeInfo, ConvertFn>,
}

impl Default for PropertyResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyResolver {
    /// Empty store with converters for strings, `bool`, `char`, numeric primitives and [`Duration`]
    #[must_use]
    pub fn new() -> Self {
        Self {
            properties: BTreeMap::new(),
            converters: BTreeMap::new(),
        }
        .with_converter(|value: &str| Ok(value.to_owned()))
        .with_converter(parse_bool)
        .with_converter(parse_trimmed::<char>)
        .with_converter(parse_trimmed::<i8>)
        .with_converter(parse_trimmed::<i16>)
        .with_converter(parse_trimmed::<i32>)
        .with_converter(parse_trimmed::<i64>)
        .with_converter(parse_trimmed::<i128>)
        .with_converter(parse_trimmed::<isize>)
        .with_converter(parse_trimmed::<u8>)
        .with_converter(parse_trimmed::<u16>)
        .with_converter(parse_trimmed::<u32>)
        .with_converter(parse_trimmed::<u64>)
        .with_converter(parse_trimmed::<u128>)
        .with_converter(parse_trimmed::<usize>)
        .with_converter(parse_trimmed::<f32>)
        .with_converter(parse_trimmed::<f64>)
        .with_converter(parse_duration)
    }

    /// Store seeded with the environment variables of the process
    #[must_use]
    pub fn from_env() -> Self {
        let mut resolver = Self::new();
        resolver.properties.extend(std::env::vars());
        resolver
    }

    #[inline]
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns the previous value of the key
    #[inline]
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.properties.insert(key.into(), value.into())
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Registers a converter for `T`, replacing the previous one
    pub fn register_converter<T, F>(&mut self, convert: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&str) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.converters
            .insert(TypeInfo::of::<T>(), Arc::new(move |value: &str| convert(value).map(Instance::new)));
    }

    #[inline]
    #[must_use]
    pub fn with_converter<T, F>(mut self, convert: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&str) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.register_converter(convert);
        self
    }

    /// Raw value of the key or the placeholder
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        let Some(expr) = key.strip_prefix("${").and_then(|expr| expr.strip_suffix('}')) else {
            return self.properties.get(key).cloned();
        };

        match expr.split_once(':') {
            Some((key, default)) => self.properties.get(key).cloned().or_else(|| self.expand(default)),
            None => self.properties.get(expr).cloned(),
        }
    }

    /// Text with every placeholder replaced by its value, `None` if one of them is absent.
    /// An unclosed placeholder is kept as is.
    fn expand(&self, text: &str) -> Option<String> {
        let mut expanded = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("${") {
            let Some(len) = placeholder_len(&rest[start..]) else {
                break;
            };
            expanded.push_str(&rest[..start]);
            expanded.push_str(&self.get(&rest[start..start + len])?);
            rest = &rest[start + len..];
        }

        expanded.push_str(rest);
        Some(expanded)
    }

    /// Value of the key or the placeholder converted to `T`
    ///
    /// # Errors
    /// Returns [`PropertyErrorKind::UnsupportedType`] if there's no converter for `T`
    /// or [`PropertyErrorKind::Conversion`] if the conversion fails
    pub fn get_as<T: Clone + 'static>(&self, key: &str) -> Result<Option<T>, PropertyErrorKind> {
        let Some(instance) = self.resolve(key, &TypeInfo::of::<T>())? else {
            return Ok(None);
        };

        match instance.get::<T>() {
            Some(value) => Ok(Some((*value).clone())),
            None => Err(PropertyErrorKind::UnsupportedType {
                key: key.to_owned(),
                type_name: type_name::<T>(),
            }),
        }
    }

    /// Same as [`PropertyResolver::get_as`], but the value must be present
    ///
    /// # Errors
    /// Returns [`PropertyErrorKind::NotFound`] if neither the value nor the default is present
    pub fn get_required<T: Clone + 'static>(&self, key: &str) -> Result<T, PropertyErrorKind> {
        match self.get_as(key)? {
            Some(value) => Ok(value),
            None => {
                let err = PropertyErrorKind::NotFound { key: key.to_owned() };
                error!("{}", err);
                Err(err)
            }
        }
    }

    /// Looks up the key and converts the value to the target type
    ///
    /// # Errors
    /// Returns [`PropertyErrorKind::UnsupportedType`] if there's no converter for the target
    /// or [`PropertyErrorKind::Conversion`] if the conversion fails
    pub fn resolve(&self, key: &str, target: &TypeInfo) -> Result<Option<Instance>, PropertyErrorKind> {
        let Some(convert) = self.converters.get(target) else {
            let err = PropertyErrorKind::UnsupportedType {
                key: key.to_owned(),
                type_name: target.name,
            };
            error!("{}", err);
            return Err(err);
        };

        let Some(value) = self.get(key) else {
            debug!(key, "Property not found");
            return Ok(None);
        };

        convert(&value).map(Some).map_err(|source| {
            let err = PropertyErrorKind::Conversion {
                key: key.to_owned(),
                type_name: target.name,
                source,
            };
            error!("{}", err);
            err
        })
    }
}

/// Length of the placeholder `text` starts with, up to its matching closing brace
fn placeholder_len(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (index, ch) in text.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(index + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_trimmed<T>(value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| alloc::format!("invalid `{}`: {value:?}", type_name::<T>()))
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(anyhow!("invalid `bool`: {value:?}"))
    }
}

/// `500ms`, `30s`, `5m`, `1h` or a number of seconds
fn parse_duration(value: &str) -> anyhow::Result<Duration> {
    let value = value.trim();
    let (amount, unit) = match value.find(|ch: char| !ch.is_ascii_digit()) {
        Some(split) => value.split_at(split),
        None => (value, "s"),
    };

    let amount = amount
        .parse::<u64>()
        .with_context(|| alloc::format!("invalid duration: {value:?}"))?;

    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(amount.saturating_mul(60 * 60))),
        unit => Err(anyhow!("unknown duration unit `{unit}` in {value:?}")),
    }
}
