//! # skyrelay-settings
//!
//! Configuration for the relay, loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: `~/.skyrelay/settings.json` (overlaid on the defaults)
//! 3. **Environment variables**: `SKYRELAY_*` overrides (highest priority)
//!
//! Command-line flags are applied by the binary on top of the result.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, load_settings, load_settings_from_path, overlay,
    settings_path,
};
pub use types::*;
