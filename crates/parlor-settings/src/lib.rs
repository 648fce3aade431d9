//! # parlor-settings
//!
//! Layered configuration for the parlor gateway.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ParlorSettings::default()`]
//! 2. **User file**: `~/.parlor/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `PARLOR_*` overrides (highest priority)
//!
//! There is no global instance. The binary loads settings once and hands the
//! result to the server.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
