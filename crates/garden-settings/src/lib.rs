//! # garden-settings
//!
//! Layered configuration for the garden store.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`GardenSettings::default()`]
//! 2. **User file** — `~/.garden/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `GARDEN_*` overrides (highest priority)
//!
//! Library code receives a [`GardenSettings`] value explicitly; the global
//! accessor exists for binaries.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, garden_dir, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<GardenSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// Loaded on first call; falls back to compiled defaults if loading fails.
pub fn get_settings() -> &'static GardenSettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Initialize the global settings with a specific value.
///
/// Returns the value back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: GardenSettings) -> std::result::Result<(), GardenSettings> {
    SETTINGS.set(settings)
}
