//! Validated configuration for one storage instance.
//!
//! Settings are built from an untyped key-value mapping. Recognized fields
//! are type-checked; unrecognized ones are preserved verbatim in
//! [`Settings::extra`] so backend adapters and extension code can still read
//! them. They are never silently dropped and never fatal.

use serde_json::Value;

use crate::capability::Capability;
use crate::data::Extras;
use crate::error::{StorageError, StorageResult};

/// Common configuration fields shared by all storage adapters.
///
/// Backend-specific fields live in `extra` and are interpreted by the
/// adapter's own validation hook.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Human-readable name of the storage, used in error messages and logs.
    pub name: String,
    /// Allow operations to overwrite occupied locations.
    pub override_existing: bool,
    /// Root or prefix under which the backend stores objects.
    pub path: String,
    /// Ordered list of location transformer names applied by
    /// `prepare_location`.
    pub location_transformers: Vec<String>,
    /// Capability bits excluded from the effective set regardless of what
    /// the services declare.
    pub disabled_capabilities: Capability,
    /// Tell the backend to provision its root on startup.
    pub initialize: bool,
    /// Max allowed upload size in bytes. 0 removes all limitations.
    pub max_size: u64,
    /// Supported MIME types or their parts. Empty list allows everything.
    pub supported_types: Vec<String>,
    /// Unrecognized fields, preserved verbatim.
    pub extra: Extras,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            name: "unknown".to_string(),
            override_existing: false,
            path: String::new(),
            location_transformers: Vec::new(),
            disabled_capabilities: Capability::NONE,
            initialize: false,
            max_size: 0,
            supported_types: Vec::new(),
            extra: Extras::new(),
        }
    }
}

impl Settings {
    /// Build settings from an untyped mapping.
    ///
    /// Recognized keys must carry the right type, otherwise construction
    /// fails with a configuration error. Everything else lands in `extra`.
    pub fn from_value(value: Value) -> StorageResult<Settings> {
        let map = match value {
            Value::Object(map) => map,
            other => {
                return Err(StorageError::InvalidConfiguration {
                    name: "unknown".to_string(),
                    problem: format!("settings must be a mapping, got {}", json_type(&other)),
                })
            }
        };

        // Name first, so every later error can mention it.
        let name = match map.get("name") {
            Some(Value::String(name)) => name.clone(),
            Some(other) => {
                return Err(invalid("unknown", "name", "a string", other));
            }
            None => "unknown".to_string(),
        };

        let mut settings = Settings {
            name: name.clone(),
            ..Settings::default()
        };
        let mut unrecognized = Vec::new();

        for (key, value) in map {
            match key.as_str() {
                "name" => {}
                "override_existing" => {
                    settings.override_existing = expect_bool(&name, &key, &value)?;
                }
                "initialize" => {
                    settings.initialize = expect_bool(&name, &key, &value)?;
                }
                "path" => {
                    settings.path = expect_str(&name, &key, &value)?.to_string();
                }
                "location_transformers" => {
                    settings.location_transformers = expect_str_list(&name, &key, &value)?;
                }
                "disabled_capabilities" => {
                    for flag in expect_str_list(&name, &key, &value)? {
                        let capability = Capability::from_name(&flag).ok_or_else(|| {
                            StorageError::InvalidConfiguration {
                                name: name.clone(),
                                problem: format!("unknown capability {flag}"),
                            }
                        })?;
                        settings.disabled_capabilities |= capability;
                    }
                }
                "max_size" => {
                    settings.max_size = match &value {
                        Value::Number(n) => n.as_u64().ok_or_else(|| {
                            invalid(&name, &key, "a non-negative size", &value)
                        })?,
                        Value::String(human) => parse_filesize(human).ok_or_else(|| {
                            StorageError::InvalidConfiguration {
                                name: name.clone(),
                                problem: format!("cannot parse max_size {human}"),
                            }
                        })?,
                        other => return Err(invalid(&name, &key, "a size", other)),
                    };
                }
                "supported_types" => {
                    settings.supported_types = expect_str_list(&name, &key, &value)?;
                }
                _ => {
                    unrecognized.push(key.clone());
                    settings.extra.insert(key, value);
                }
            }
        }

        if !unrecognized.is_empty() {
            tracing::debug!(
                storage = %settings.name,
                keys = ?unrecognized,
                "Storage received unrecognized settings"
            );
        }

        Ok(settings)
    }

    /// Read a required backend-specific option from `extra`.
    pub fn required_extra_str(&self, option: &str) -> StorageResult<&str> {
        self.extra
            .get(option)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| StorageError::MissingConfiguration {
                name: self.name.clone(),
                option: option.to_string(),
            })
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}

fn invalid(name: &str, key: &str, expected: &str, got: &Value) -> StorageError {
    StorageError::InvalidConfiguration {
        name: name.to_string(),
        problem: format!("option {key} must be {expected}, got {}", json_type(got)),
    }
}

fn expect_bool(name: &str, key: &str, value: &Value) -> StorageResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| invalid(name, key, "a boolean", value))
}

fn expect_str<'a>(name: &str, key: &str, value: &'a Value) -> StorageResult<&'a str> {
    value
        .as_str()
        .ok_or_else(|| invalid(name, key, "a string", value))
}

fn expect_str_list(name: &str, key: &str, value: &Value) -> StorageResult<Vec<String>> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid(name, key, "a list of strings", value))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid(name, key, "a list of strings", value))
        })
        .collect()
}

/// Check whether `content_type` matches one of the supported types.
///
/// A supported entry may be a full MIME type (`text/plain`), a main type
/// (`text`) or a subtype (`plain`). An empty list allows everything.
pub fn is_supported_type(content_type: &str, supported: &[String]) -> bool {
    if supported.is_empty() {
        return true;
    }
    let (maintype, subtype) = content_type.split_once('/').unwrap_or((content_type, ""));
    supported
        .iter()
        .any(|st| st == content_type || st == maintype || st == subtype)
}

/// Transform a human-readable filesize into a number of bytes.
///
/// ```
/// use depot_core::settings::parse_filesize;
///
/// assert_eq!(parse_filesize("10GiB"), Some(10_737_418_240));
/// assert_eq!(parse_filesize("5 kb"), Some(5_000));
/// assert_eq!(parse_filesize("zero"), None);
/// ```
pub fn parse_filesize(value: &str) -> Option<u64> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let size: f64 = number.parse().ok()?;

    let multiplier: u64 = match unit.trim().to_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 10u64.pow(3),
        "m" | "mb" => 10u64.pow(6),
        "g" | "gb" => 10u64.pow(9),
        "t" | "tb" => 10u64.pow(12),
        "p" | "pb" => 10u64.pow(15),
        "kib" => 1 << 10,
        "mib" => 1 << 20,
        "gib" => 1 << 30,
        "tib" => 1 << 40,
        "pib" => 1 << 50,
        _ => return None,
    };

    Some((size * multiplier as f64) as u64)
}

/// Transform a number of bytes into a human-readable filesize.
///
/// `base` is 1000 for SI units (KB, MB) or 1024 for binary ones (KiB, MiB);
/// any other base yields `None`.
pub fn humanize_filesize(value: u64, base: u64) -> Option<String> {
    let suffixes: &[&str] = match base {
        1000 => &["B", "KB", "MB", "GB", "TB", "PB", "EB"],
        1024 => &["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"],
        _ => return None,
    };

    let mut value = value as f64;
    let mut iteration = 0;
    while value > base as f64 && iteration < suffixes.len() - 1 {
        iteration += 1;
        value /= base as f64;
    }

    let value = (value * 100.0).trunc() / 100.0;
    Some(format!("{:.2}{}", value, suffixes[iteration]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let settings = Settings::from_value(json!({})).unwrap();
        assert_eq!(settings.name, "unknown");
        assert!(!settings.override_existing);
        assert_eq!(settings.max_size, 0);
        assert!(settings.extra.is_empty());
    }

    #[test]
    fn test_recognized_fields_are_typed() {
        let settings = Settings::from_value(json!({
            "name": "memo",
            "override_existing": true,
            "path": "files",
            "location_transformers": ["safe_relative_path"],
            "max_size": "10MiB",
        }))
        .unwrap();
        assert_eq!(settings.name, "memo");
        assert!(settings.override_existing);
        assert_eq!(settings.path, "files");
        assert_eq!(settings.location_transformers, vec!["safe_relative_path"]);
        assert_eq!(settings.max_size, 10 << 20);
    }

    #[test]
    fn test_wrong_type_is_fatal() {
        let err = Settings::from_value(json!({"name": "memo", "override_existing": "yes"}))
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidConfiguration { .. }));
        assert!(err.to_string().contains("override_existing"));
    }

    #[test]
    fn test_unrecognized_fields_are_preserved() {
        let settings = Settings::from_value(json!({
            "name": "memo",
            "bucket_region": "eu-west-1",
            "retries": 3,
        }))
        .unwrap();
        assert_eq!(
            settings.extra.get("bucket_region").and_then(|v| v.as_str()),
            Some("eu-west-1")
        );
        assert_eq!(
            settings.extra.get("retries").and_then(|v| v.as_u64()),
            Some(3)
        );
    }

    #[test]
    fn test_disabled_capabilities_parsed_by_name() {
        let settings = Settings::from_value(json!({
            "disabled_capabilities": ["remove", "SCAN"],
        }))
        .unwrap();
        assert!(settings.disabled_capabilities.supports(Capability::REMOVE));
        assert!(settings.disabled_capabilities.supports(Capability::SCAN));
        assert!(!settings.disabled_capabilities.supports(Capability::CREATE));

        let err = Settings::from_value(json!({"disabled_capabilities": ["teleport"]}))
            .unwrap_err();
        assert!(err.to_string().contains("teleport"));
    }

    #[test]
    fn test_required_extra_str() {
        let settings = Settings::from_value(json!({"name": "db", "url": "postgres://x"})).unwrap();
        assert_eq!(settings.required_extra_str("url").unwrap(), "postgres://x");
        let err = settings.required_extra_str("bucket").unwrap_err();
        assert!(matches!(err, StorageError::MissingConfiguration { .. }));
    }

    #[test]
    fn test_parse_filesize_units() {
        assert_eq!(parse_filesize("10"), Some(10));
        assert_eq!(parse_filesize("10b"), Some(10));
        assert_eq!(parse_filesize("1.5 kb"), Some(1_500));
        assert_eq!(parse_filesize("2MiB"), Some(2 << 20));
        assert_eq!(parse_filesize("10GiB"), Some(10_737_418_240));
        assert_eq!(parse_filesize("1 parsec"), None);
    }

    #[test]
    fn test_humanize_filesize() {
        assert_eq!(humanize_filesize(10, 1000).unwrap(), "10.00B");
        assert_eq!(humanize_filesize(10_418_240, 1024).unwrap(), "9.93MiB");
        assert_eq!(humanize_filesize(10_737_418_240, 1024).unwrap(), "10.00GiB");
        assert_eq!(humanize_filesize(10, 12), None);
    }

    #[test]
    fn test_is_supported_type() {
        let supported = vec!["text".to_string(), "application/pdf".to_string()];
        assert!(is_supported_type("text/plain", &supported));
        assert!(is_supported_type("application/pdf", &supported));
        assert!(!is_supported_type("image/png", &supported));
    }

    #[test]
    fn test_empty_supported_types_allows_everything() {
        assert!(is_supported_type("application/octet-stream", &[]));
        assert!(is_supported_type("image/png", &[]));
    }
}
