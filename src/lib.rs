//! caffeine-take: keep your computer awake on demand.
//!
//! The crate tracks which operating mode is active, reconciles it with the
//! session lock state and per-mode settings, and applies the result to the
//! OS idle/display timers exactly once per actual change.
//!
//! Usage:
//! ```no_run
//! use caffeine_take::{Caffeine, CaffeineMode, SharedSettings, SystemPower};
//!
//! let settings = SharedSettings::default();
//! let mut caffeine = Caffeine::new(SystemPower::new()?, settings);
//! caffeine.set_mode(CaffeineMode::Enabled);
//! // keep running...
//! caffeine.shutdown(); // idle sleep allowed again
//! # Ok::<(), caffeine_take::Error>(())
//! ```

use std::path::PathBuf;

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(target_os = "windows")] {
        mod windows;
        use self::windows as sys;
    } else if #[cfg(target_os = "macos")] {
        mod macos;
        use self::macos as sys;
    } else if #[cfg(target_os = "linux")] {
        mod linux;
        use self::linux as sys;
    } else {
        compile_error!("caffeine-take only supports Windows, macOS, and Linux.");
    }
}

pub mod app;
pub mod controller;
pub mod execution;
pub mod mode;
pub mod power;
pub mod session;
pub mod settings;
pub mod strategy;

pub use app::{Caffeine, CaffeineHandle, CaffeineObserver, Event};
pub use controller::ModeController;
pub use execution::{Commit, ExecutionStateController, desired_assertion};
pub use mode::{Assertion, CaffeineMode, CaffeineState, SessionState};
pub use power::{PowerBackend, SystemPower};
pub use session::{SessionEvent, SessionLockTracker};
pub use settings::{
    AutoSettings, ModeSettings, Settings, SettingsProvider, SharedSettings, TimerSettings,
};
pub use strategy::{
    ActivityProbe, ActivityReport, ActivityReporter, ActivitySink, AutoMode, DisabledMode,
    EnabledMode, ModeStrategy, ProcessProbe, TimerMode,
};

/// Error type for every fallible operation in the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Generic OS error (e.g. Win32 GetLastError, IOReturn).
    #[error("OS error: {0}")]
    Os(String),
    /// D-Bus error (Linux).
    #[error("D-Bus error: {0}")]
    Dbus(String),
    /// Not supported in the current environment (Linux without a session bus/service).
    #[error("Unsupported: {0}")]
    Unsupported(String),
    /// The settings provider could not supply a mode's configuration.
    #[error("settings unavailable for {0} mode")]
    SettingsUnavailable(CaffeineMode),
    #[error("settings file malformed: {path}: {details}")]
    SettingsMalformed { path: PathBuf, details: String },
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// An activity report arrived from a strategy that is no longer running.
    #[error("activity report from stopped {mode} strategy (generation {generation}, current {current})")]
    ProtocolViolation {
        mode: CaffeineMode,
        generation: u64,
        current: u64,
    },
    /// A strategy failed to start its detection.
    #[error("{mode} strategy failed: {details}")]
    Strategy { mode: CaffeineMode, details: String },
}
