use pairlink_core::client::{ControllerConfig, RemoteServiceConfig};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current settings schema version - increment when making breaking changes
pub const SETTINGS_VERSION: u32 = 1;

/// Everything the CLI reads from `settings.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub settings_version: u32,

    /// Remote connection service endpoint
    #[serde(default)]
    pub remote: RemoteServiceConfig,

    /// Polling and pairing policy
    #[serde(default)]
    pub controller: ControllerConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            settings_version: SETTINGS_VERSION,
            remote: RemoteServiceConfig::default(),
            controller: ControllerConfig::default(),
        }
    }
}

/// Get the config directory path
pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pairlink")
}

/// Get the settings file path
pub fn get_settings_path() -> PathBuf {
    get_config_dir().join("settings.json")
}

/// Load settings from `path`, falling back to defaults when the file is
/// missing or cannot be parsed.
pub fn load_settings(path: &Path) -> Settings {
    if !path.exists() {
        log::info!("Settings file not found at {}, using defaults", path.display());
        return Settings::default();
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            log::error!("Failed to read settings file {}: {}", path.display(), e);
            return Settings::default();
        }
    };

    let settings = match serde_json::from_str::<Settings>(&content) {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("Failed to parse settings {}: {}, using defaults", path.display(), e);
            return Settings::default();
        }
    };

    let (settings, migrated) = migrate_settings(settings);
    if migrated {
        if let Err(e) = save_settings(path, &settings) {
            log::warn!("Failed to save migrated settings: {}", e);
        }
    }
    settings
}

/// Bring older settings up to `SETTINGS_VERSION`. Returns whether anything changed.
fn migrate_settings(mut settings: Settings) -> (Settings, bool) {
    let original_version = settings.settings_version;

    // Migration from version 0 (pre-versioning) to version 1
    if settings.settings_version == 0 {
        log::info!("Migrating settings from pre-versioning (v0) to v1");
        settings.settings_version = 1;
    }

    if settings.settings_version > SETTINGS_VERSION {
        log::warn!(
            "Settings version {} is newer than supported version {}, unknown fields are ignored",
            settings.settings_version,
            SETTINGS_VERSION
        );
    }

    let migrated = original_version != settings.settings_version;
    if migrated {
        log::info!(
            "Settings migrated from v{} to v{}",
            original_version,
            settings.settings_version
        );
    }
    (settings, migrated)
}

/// Save settings to `path` atomically (temp file + rename).
///
/// The file may hold a session cookie, so it is only readable by the owner.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600));
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(&dir.path().join("settings.json"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.settings_version, SETTINGS_VERSION);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.remote.base_url = "https://console.example/api/whatsapp".into();
        settings.remote.cookie = Some("session=abc".into());
        settings.controller.max_pairing_attempts = 4;
        save_settings(&path, &settings).unwrap();

        assert_eq!(load_settings(&path), settings);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"settings_version": 1, "remote": {"base_url": "http://10.0.0.2:3000/api/whatsapp"}}"#,
        )
        .unwrap();

        let settings = load_settings(&path);
        assert_eq!(settings.remote.base_url, "http://10.0.0.2:3000/api/whatsapp");
        assert_eq!(settings.remote.request_timeout_secs, 10);
        assert_eq!(settings.controller, ControllerConfig::default());
    }

    #[test]
    fn corrupt_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert_eq!(load_settings(&path), Settings::default());
    }

    #[test]
    fn unversioned_file_is_migrated_and_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"controller": {"status_interval_ms": 2000}}"#).unwrap();

        let settings = load_settings(&path);
        assert_eq!(settings.settings_version, 1);
        assert_eq!(settings.controller.status_interval_ms, 2000);

        let on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["settings_version"], 1);
    }
}
