//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`HandoffSettings::default()`]
//! 2. If `~/.handoff/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `HANDOFF_*` environment variable overrides (highest priority)
//! 4. [`HandoffSettings::validate`]
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::HandoffSettings;

/// Resolve the path to the settings file (`~/.handoff/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".handoff").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HandoffSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an unusable endpoint is
/// an error.
pub fn load_settings_from_path(path: &Path) -> Result<HandoffSettings> {
    let defaults = serde_json::to_value(HandoffSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: HandoffSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
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

/// Apply `HANDOFF_*` environment variable overrides.
///
/// Invalid values are ignored with a warning.
pub fn apply_env_overrides(settings: &mut HandoffSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary lookup. Separated for testing.
pub fn apply_overrides(settings: &mut HandoffSettings, lookup: impl Fn(&str) -> Option<String>) {
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let u64_in = |name: &str, min: u64, max: u64| {
        let val = lookup(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    };
    let boolean = |name: &str| {
        let val = lookup(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    };

    // ── Transport ───────────────────────────────────────────────────
    if let Some(v) = string("HANDOFF_TRANSPORT_URL") {
        settings.transport.url = v;
    }
    if let Some(v) = string("HANDOFF_ACCESS_TOKEN") {
        settings.transport.access_token = Some(v);
    }

    // ── Oracle ──────────────────────────────────────────────────────
    if let Some(v) = string("HANDOFF_ORACLE_URL") {
        settings.oracle.base_url = v;
    }

    // ── Protocol timings ────────────────────────────────────────────
    if let Some(v) = u64_in("HANDOFF_IDLE_TIMEOUT_MS", 1_000, 86_400_000) {
        settings.watchdog.idle_timeout_ms = v;
    }
    if let Some(v) = u64_in("HANDOFF_DEDUP_WINDOW_MS", 100, 600_000) {
        settings.dedup.window_ms = v;
    }

    // ── Local ───────────────────────────────────────────────────────
    if let Some(v) = string("HANDOFF_DATA_DIR") {
        settings.storage.data_dir = v;
    }
    if let Some(v) = string("HANDOFF_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = boolean("HANDOFF_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
