//! # aviso-settings
//!
//! Layered configuration for the aviso relay.
//!
//! Settings are resolved from, lowest to highest priority:
//! 1. **Compiled defaults**: [`AvisoSettings::default()`]
//! 2. **User file**: `~/.aviso/settings.json` (deep-merged over defaults)
//! 3. **Environment**: `AVISO_*` overrides
//!
//! CLI flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::{AvisoSettings, LoggingSettings, NotificationSettings, ServerSettings};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = AvisoSettings::default();
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.notifications.admin_account_id, aviso_core::AccountId::Numeric(1));
        assert_eq!(settings.logging.level, "info");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn settings_path_ends_with_file_name() {
        let path = settings_path();
        assert!(path.ends_with(".aviso/settings.json"));
    }
}
