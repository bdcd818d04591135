//! Settings loading with deep merge and environment overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`AvisoSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `AVISO_*` environment overrides
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per key)
//! - Arrays and primitives are replaced by the source
//! - `null` in the source is skipped

use std::path::{Path, PathBuf};

use aviso_core::AccountId;
use aviso_core::logging::LogFormat;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::AvisoSettings;

/// Path of the user settings file (`~/.aviso/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".aviso").join("settings.json")
}

/// Load from [`settings_path`] with environment overrides.
pub fn load_settings() -> Result<AvisoSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` with environment overrides.
///
/// A missing file yields defaults; an unreadable or invalid file is an error.
pub fn load_settings_from_path(path: &Path) -> Result<AvisoSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<AvisoSettings> {
    let defaults = serde_json::to_value(AvisoSettings::default())?;
    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };
    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of `source` over `target`.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `AVISO_*` overrides from the process environment.
///
/// Unparseable or out-of-range values are ignored with a warning.
pub fn apply_env_overrides(settings: &mut AvisoSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup` (the environment in production).
pub fn apply_overrides_from<F>(settings: &mut AvisoSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = read("AVISO_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("AVISO_PORT") {
        if let Some(port) = checked(&v, "AVISO_PORT", |s| parse_u16_range(s, 0, u16::MAX)) {
            settings.server.port = port;
        }
    }
    if let Some(v) = read("AVISO_SEND_QUEUE_CAPACITY") {
        if let Some(n) = checked(&v, "AVISO_SEND_QUEUE_CAPACITY", |s| parse_usize_range(s, 1, 65_536)) {
            settings.server.send_queue_capacity = n;
        }
    }
    if let Some(v) = read("AVISO_HEARTBEAT_INTERVAL_SECS") {
        if let Some(n) = checked(&v, "AVISO_HEARTBEAT_INTERVAL_SECS", |s| parse_u64_range(s, 1, 3_600)) {
            settings.server.heartbeat_interval_secs = n;
        }
    }
    if let Some(v) = read("AVISO_HEARTBEAT_TIMEOUT_SECS") {
        if let Some(n) = checked(&v, "AVISO_HEARTBEAT_TIMEOUT_SECS", |s| parse_u64_range(s, 1, 86_400)) {
            settings.server.heartbeat_timeout_secs = n;
        }
    }
    if let Some(v) = read("AVISO_ADMIN_ACCOUNT_ID") {
        if let Some(id) = checked(&v, "AVISO_ADMIN_ACCOUNT_ID", |s| s.parse::<AccountId>().ok()) {
            settings.notifications.admin_account_id = id;
        }
    }
    if let Some(v) = read("AVISO_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("AVISO_LOG_FORMAT") {
        if let Some(format) = checked(&v, "AVISO_LOG_FORMAT", |s| s.parse::<LogFormat>().ok()) {
            settings.logging.format = format;
        }
    }
}

fn checked<T>(value: &str, key: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let parsed = parse(value.trim());
    if parsed.is_none() {
        warn!(key, value, "invalid env var, ignoring");
    }
    parsed
}

/// Parse a `u16` within `[min, max]`.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a `u64` within `[min, max]`.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a `usize` within `[min, max]`.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}
