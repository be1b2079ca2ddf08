//! Per-mode settings and the JSON file they persist to.
//!
//! The settings object is owned outside the core. The controller only reads a
//! snapshot of the relevant [`ModeSettings`] at decision time through a
//! [`SettingsProvider`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::mode::CaffeineMode;

const SETTINGS_DIR: &str = "CaffeineTake";
const SETTINGS_FILE: &str = "settings.json";

/// The two knobs every non-disabled mode has.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModeSettings {
    pub keep_display_on: bool,
    pub disable_on_lock_screen: bool,
}

impl Default for ModeSettings {
    fn default() -> Self {
        Self {
            keep_display_on: false,
            disable_on_lock_screen: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoSettings {
    pub keep_display_on: bool,
    pub disable_on_lock_screen: bool,
    /// Milliseconds between two scans.
    pub scan_interval: u64,
    /// Executable names that make auto mode active while any of them runs.
    pub process_names: Vec<String>,
}

impl Default for AutoSettings {
    fn default() -> Self {
        Self {
            keep_display_on: false,
            disable_on_lock_screen: true,
            scan_interval: 2000,
            process_names: Vec::new(),
        }
    }
}

impl AutoSettings {
    pub fn mode_settings(&self) -> ModeSettings {
        ModeSettings {
            keep_display_on: self.keep_display_on,
            disable_on_lock_screen: self.disable_on_lock_screen,
        }
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval.max(1))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimerSettings {
    pub keep_display_on: bool,
    pub disable_on_lock_screen: bool,
    /// Seconds the timer keeps the machine awake.
    pub duration: u64,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            keep_display_on: false,
            disable_on_lock_screen: true,
            duration: 60 * 60,
        }
    }
}

impl TimerSettings {
    pub fn mode_settings(&self) -> ModeSettings {
        ModeSettings {
            keep_display_on: self.keep_display_on,
            disable_on_lock_screen: self.disable_on_lock_screen,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration)
    }
}

/// Whole settings document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub standard: ModeSettings,
    pub auto: AutoSettings,
    pub timer: TimerSettings,
    /// Mode entered on startup. Written by the host when the user picks a mode;
    /// nothing in this crate saves it.
    pub last_mode: CaffeineMode,
}

impl Settings {
    /// Settings for `mode`. Disabled has none of its own and gets defaults.
    pub fn for_mode(&self, mode: CaffeineMode) -> ModeSettings {
        match mode {
            CaffeineMode::Disabled => ModeSettings::default(),
            CaffeineMode::Enabled => self.standard,
            CaffeineMode::Auto => self.auto.mode_settings(),
            CaffeineMode::Timer => self.timer.mode_settings(),
        }
    }

    /// Loads settings from `path`, writing a default file if none exists.
    ///
    /// Text that is not JSON is an error. A JSON document that does not fit
    /// the schema falls back to defaults with a warning.
    pub fn load(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "settings file not found, creating default one");
            let settings = Settings::default();
            settings.save(path)?;
            return Ok(settings);
        }

        let content = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| Error::SettingsMalformed {
                path: path.to_path_buf(),
                details: e.to_string(),
            })?;

        match serde_json::from_value::<Settings>(value) {
            Ok(settings) => {
                tracing::info!(path = %path.display(), "loaded settings");
                Ok(settings)
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to deserialize settings");
                tracing::warn!("using default settings");
                Ok(Settings::default())
            }
        }
    }

    /// Writes settings to `path` as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| Error::SettingsMalformed {
            path: path.to_path_buf(),
            details: e.to_string(),
        })?;
        fs::write(path, content).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "saved settings");
        Ok(())
    }
}

/// Returns the default settings path (`<config dir>/CaffeineTake/settings.json`).
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(SETTINGS_DIR).join(SETTINGS_FILE))
}

/// Read-only access to per-mode settings.
pub trait SettingsProvider: Send + Sync {
    fn mode_settings(&self, mode: CaffeineMode) -> Result<ModeSettings, Error>;
}

/// Settings object shared between the core, the strategies and whatever edits it.
#[derive(Clone, Debug, Default)]
pub struct SharedSettings(Arc<RwLock<Settings>>);

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self(Arc::new(RwLock::new(settings)))
    }

    /// Copy of the current settings.
    pub fn snapshot(&self) -> Settings {
        self.0.read().clone()
    }

    /// Swaps in new settings. Callers follow up with a reload on the core.
    pub fn replace(&self, settings: Settings) {
        *self.0.write() = settings;
    }

    pub fn auto(&self) -> AutoSettings {
        self.0.read().auto.clone()
    }

    pub fn timer(&self) -> TimerSettings {
        self.0.read().timer
    }
}

impl SettingsProvider for SharedSettings {
    fn mode_settings(&self, mode: CaffeineMode) -> Result<ModeSettings, Error> {
        Ok(self.0.read().for_mode(mode))
    }
}
