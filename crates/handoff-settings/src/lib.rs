//! # handoff-settings
//!
//! Layered configuration for the handoff coordinator.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`HandoffSettings::default()`]
//! 2. **User file**: `~/.handoff/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `HANDOFF_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

/// Global settings singleton.
static SETTINGS: OnceLock<HandoffSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.handoff/settings.json` with env var
/// overrides. If loading fails, returns compiled defaults.
pub fn get_settings() -> &'static HandoffSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            HandoffSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// Returns the settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: HandoffSettings) -> std::result::Result<(), HandoffSettings> {
    SETTINGS.set(settings)
}
