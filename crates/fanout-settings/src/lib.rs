//! # fanout-settings
//!
//! Configuration for the fanout relay, loaded in three layers (lowest to
//! highest priority):
//! 1. **Compiled defaults**: [`FanoutSettings::default()`]
//! 2. **Environment variables**: `PORT`, `WS_SOURCE`, `FANOUT_*`
//! 3. **Command-line flags**: applied by the binary on top of the result
//!
//! The listener port and the upstream URL have no default. A settings value
//! that is still missing after all layers is a fatal startup error, reported
//! by [`FanoutSettings::validate`].

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_overrides, load_settings};
pub use types::FanoutSettings;
