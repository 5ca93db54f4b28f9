//! Layered settings: compiled defaults, then `settings.json`, then
//! `SKYRELAY_*` environment variables.
//!
//! The file is overlaid on the serialized defaults as JSON, so a partial file
//! only touches the keys it names. Nested objects overlay key by key; any
//! other value replaces what was there; `null` leaves the default alone.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{LogFormat, RelaySettings};

/// Resolve the path to the settings file (`~/.skyrelay/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".skyrelay").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON, or a merged result that
/// fails [`RelaySettings::validate`], is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<RelaySettings> {
    let mut layered = serde_json::to_value(RelaySettings::default())?;

    match std::fs::read_to_string(path) {
        Ok(content) => {
            debug!(?path, "overlaying settings file");
            overlay(&mut layered, serde_json::from_str(&content)?);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(?path, "no settings file, using defaults");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(serde_json::from_value(layered)?)
}

/// Overlay `patch` onto `base` in place.
pub fn overlay(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(existing), Value::Object(fields)) => {
            for (key, value) in fields.into_iter().filter(|(_, v)| !v.is_null()) {
                match existing.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None => {
                        let _ = existing.insert(key, value);
                    }
                }
            }
        }
        (slot, replacement) => *slot = replacement,
    }
}

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning (falling back to file/default).
/// `SKYRELAY_PORT` wins over the conventional `PORT`.
pub fn apply_overrides_from<F>(settings: &mut RelaySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("SKYRELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env
        .u64_in("SKYRELAY_PORT", 0, 65_535)
        .or_else(|| env.u64_in("PORT", 0, 65_535))
    {
        settings.server.port = v as u16;
    }
    if let Some(v) = env.u64_in("SKYRELAY_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = v as usize;
    }
    if let Some(v) = env.u64_in("SKYRELAY_HEARTBEAT_INTERVAL_SECS", 1, 3_600) {
        settings.server.heartbeat_interval_secs = v;
    }
    if let Some(v) = env.u64_in("SKYRELAY_HEARTBEAT_TIMEOUT_SECS", 1, 86_400) {
        settings.server.heartbeat_timeout_secs = v;
    }

    // ── Sessions ────────────────────────────────────────────────────
    if let Some(v) = env.u64_in("SKYRELAY_SESSION_IDLE_TTL_SECS", 0, 31_536_000) {
        settings.sessions.idle_ttl_secs = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("SKYRELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("SKYRELAY_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(format) => settings.logging.format = format,
            None => tracing::warn!(value = %v, "invalid SKYRELAY_LOG_FORMAT, ignoring"),
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a log format name (case-insensitive).
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "compact" | "text" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn u64_in(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        result
    }
}
