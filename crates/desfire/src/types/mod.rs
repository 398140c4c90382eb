//! Parsed command responses

mod key_settings;
mod version;

pub use key_settings::KeySettings;
pub use version::{Version, VersionInfo};
