use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{error::SettingsError, session_guard::SessionGuardConfig};

pub const SETTINGS_STORAGE_KEY: &str = "lunaguard-app-settings";

/// The settings record is tiny; anything bigger is treated as corrupt.
pub const MAX_SETTINGS_BYTES: u64 = 64 * 1024;

pub const DEFAULT_AUTO_LOGOUT_TIMEOUT_SECS: u64 = 5;

/// Missing fields in the stored JSON fall back to their defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub auto_logout_enabled: bool,
    pub auto_logout_timeout_seconds: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            auto_logout_enabled: true,
            auto_logout_timeout_seconds: DEFAULT_AUTO_LOGOUT_TIMEOUT_SECS,
        }
    }
}

impl AppSettings {
    #[must_use]
    pub fn merged(self, patch: SettingsPatch) -> Self {
        Self {
            auto_logout_enabled: patch.auto_logout_enabled.unwrap_or(self.auto_logout_enabled),
            auto_logout_timeout_seconds: patch
                .auto_logout_timeout_seconds
                .unwrap_or(self.auto_logout_timeout_seconds),
        }
        .normalized()
    }

    #[must_use]
    fn normalized(mut self) -> Self {
        self.auto_logout_timeout_seconds = self.auto_logout_timeout_seconds.max(1);
        self
    }

    pub fn guard_config(&self) -> SessionGuardConfig {
        SessionGuardConfig::new(self.auto_logout_enabled, self.auto_logout_timeout_seconds)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub auto_logout_enabled: Option<bool>,
    pub auto_logout_timeout_seconds: Option<u64>,
}

pub fn default_settings_path() -> PathBuf {
    let base = std::env::var_os("LUNAGUARD_DATA_DIR")
        .or_else(|| std::env::var_os("LOCALAPPDATA"))
        .or_else(|| std::env::var_os("XDG_CONFIG_HOME"))
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("LunaGuard")
        .join(format!("{SETTINGS_STORAGE_KEY}.json"))
}

pub fn parse_settings_json(data: &str) -> Result<AppSettings, serde_json::Error> {
    serde_json::from_str::<AppSettings>(data).map(AppSettings::normalized)
}

pub fn load_settings_from_path(path: &Path) -> Result<AppSettings, SettingsError> {
    let meta = fs::metadata(path).map_err(SettingsError::Metadata)?;
    if meta.len() > MAX_SETTINGS_BYTES {
        return Err(SettingsError::TooLarge {
            size: meta.len(),
            max: MAX_SETTINGS_BYTES,
        });
    }

    let data = fs::read_to_string(path).map_err(SettingsError::Read)?;
    parse_settings_json(&data).map_err(SettingsError::Parse)
}

pub fn save_settings_to_path(path: &Path, settings: &AppSettings) -> Result<(), SettingsError> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir).map_err(SettingsError::WriteTmp)?;
    }

    let tmp = path.with_extension("json.tmp");
    let payload = serde_json::to_string_pretty(settings).map_err(SettingsError::Serialize)?;
    fs::write(&tmp, payload.as_bytes()).map_err(SettingsError::WriteTmp)?;

    // Windows rename does not replace an existing file; elsewhere it does so atomically.
    #[cfg(windows)]
    if path.exists() {
        let _ = fs::remove_file(path);
    }

    fs::rename(&tmp, path).map_err(SettingsError::Rename)?;
    Ok(())
}

/// Persisted app settings, read once on open and written back on every change.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    current: AppSettings,
}

impl SettingsStore {
    /// Never fails: unreadable or corrupt files yield the defaults.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = match load_settings_from_path(&path) {
            Ok(settings) => settings,
            Err(SettingsError::Metadata(err)) if err.kind() == io::ErrorKind::NotFound => {
                AppSettings::default()
            }
            Err(err) => {
                warn!(path = %path.display(), "ignoring stored settings: {}", err);
                AppSettings::default()
            }
        };
        Self { path, current }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> AppSettings {
        self.current
    }

    /// The in-memory value changes even when the write fails.
    pub fn update(&mut self, patch: SettingsPatch) -> Result<AppSettings, SettingsError> {
        self.current = self.current.merged(patch);
        save_settings_to_path(&self.path, &self.current)?;
        Ok(self.current)
    }

    pub fn reset(&mut self) -> Result<(), SettingsError> {
        self.current = AppSettings::default();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SettingsError::Remove(err)),
        }
    }
}
