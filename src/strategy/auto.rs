//! Auto mode - background poller that keeps the machine awake while a probe says so.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{RecvTimeoutError, Sender};
use parking_lot::Mutex;
use sysinfo::{ProcessesToUpdate, System};

use super::{ActivityReporter, ModeStrategy};
use crate::Error;
use crate::mode::CaffeineMode;
use crate::settings::SharedSettings;

/// Decides whether auto mode should currently be active.
pub trait ActivityProbe: Send + Sync {
    fn is_active(&self) -> bool;
}

/// Active while any of the configured processes is running.
pub struct ProcessProbe {
    names: Vec<String>,
    system: Mutex<System>,
}

impl ProcessProbe {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names,
            system: Mutex::new(System::new()),
        }
    }
}

impl ActivityProbe for ProcessProbe {
    fn is_active(&self) -> bool {
        if self.names.is_empty() {
            return false;
        }

        let mut system = self.system.lock();
        system.refresh_processes(ProcessesToUpdate::All, true);
        system.processes().values().any(|process| {
            let running = process.name().to_string_lossy();
            self.names
                .iter()
                .any(|configured| process_name_matches(configured, &running))
        })
    }
}

/// Case-insensitive match that ignores a trailing `.exe` on either side.
fn process_name_matches(configured: &str, running: &str) -> bool {
    fn stem(name: &str) -> &str {
        let split = name.len().saturating_sub(4);
        match (name.get(..split), name.get(split..)) {
            (Some(head), Some(ext)) if !head.is_empty() && ext.eq_ignore_ascii_case(".exe") => head,
            _ => name,
        }
    }
    let configured = stem(configured.trim());
    !configured.is_empty() && configured.eq_ignore_ascii_case(stem(running))
}

struct Poller {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Polls an [`ActivityProbe`] every `scan_interval` and reports transitions.
pub struct AutoMode {
    settings: SharedSettings,
    probe: Option<Arc<dyn ActivityProbe>>,
    poller: Option<Poller>,
}

impl AutoMode {
    /// Auto mode backed by a [`ProcessProbe`] built from the settings at each start.
    pub fn new(settings: SharedSettings) -> Self {
        Self {
            settings,
            probe: None,
            poller: None,
        }
    }

    /// Auto mode backed by a custom probe.
    pub fn with_probe(settings: SharedSettings, probe: Arc<dyn ActivityProbe>) -> Self {
        Self {
            settings,
            probe: Some(probe),
            poller: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.poller.is_some()
    }
}

impl ModeStrategy for AutoMode {
    fn mode(&self) -> CaffeineMode {
        CaffeineMode::Auto
    }

    fn start(&mut self, reporter: ActivityReporter) -> Result<(), Error> {
        if self.poller.is_some() {
            tracing::warn!("auto mode already running, restarting");
            self.stop();
        }

        let auto = self.settings.auto();
        let interval = auto.scan_interval();
        let probe: Arc<dyn ActivityProbe> = match &self.probe {
            Some(probe) => Arc::clone(probe),
            None => Arc::new(ProcessProbe::new(auto.process_names.clone())),
        };

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name("caffeine-auto".to_string())
            .spawn(move || {
                tracing::info!(?interval, "auto mode poller started");
                let mut last: Option<bool> = None;
                loop {
                    let active = probe.is_active();
                    if last != Some(active) {
                        tracing::debug!(active, "auto mode activity changed");
                        reporter.report(active);
                        last = Some(active);
                    }

                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::info!("auto mode poller stopped");
            })
            .map_err(|e| Error::Strategy {
                mode: CaffeineMode::Auto,
                details: e.to_string(),
            })?;

        self.poller = Some(Poller { stop_tx, handle });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(poller) = self.poller.take() {
            let _ = poller.stop_tx.send(());
            if poller.handle.join().is_err() {
                tracing::error!("auto mode poller panicked");
            }
        }
    }
}

impl Drop for AutoMode {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::strategy::testing::recording_sink;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct FlagProbe(AtomicBool);

    impl ActivityProbe for FlagProbe {
        fn is_active(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn fast_settings() -> SharedSettings {
        let mut settings = Settings::default();
        settings.auto.scan_interval = 10;
        SharedSettings::new(settings)
    }

    #[test]
    fn process_names_match_without_exe_and_case() {
        assert!(process_name_matches("vlc.exe", "VLC.EXE"));
        assert!(process_name_matches("vlc", "vlc.exe"));
        assert!(process_name_matches("VLC.exe", "vlc"));
        assert!(!process_name_matches("vlc", "vlc-helper"));
        assert!(!process_name_matches("", "anything"));
    }

    #[test]
    fn empty_process_list_is_never_active() {
        assert!(!ProcessProbe::new(Vec::new()).is_active());
    }

    #[test]
    fn reports_only_transitions_and_nothing_after_stop() {
        let probe = Arc::new(FlagProbe(AtomicBool::new(false)));
        let (sink, reports) = recording_sink();
        let mut auto = AutoMode::with_probe(fast_settings(), probe.clone());

        auto.start(ActivityReporter::new(CaffeineMode::Auto, 7, sink))
            .unwrap();
        assert!(auto.is_running());

        std::thread::sleep(Duration::from_millis(60));
        probe.0.store(true, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(60));

        auto.stop();
        assert!(!auto.is_running());
        let count_at_stop = reports.lock().len();

        probe.0.store(false, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(60));

        let reports = reports.lock();
        assert_eq!(reports.len(), count_at_stop);
        let states: Vec<bool> = reports.iter().map(|r| r.active).collect();
        assert_eq!(states, vec![false, true]);
        assert!(reports.iter().all(|r| r.generation == 7));
    }

    #[test]
    fn stop_interrupts_long_interval() {
        let mut settings = Settings::default();
        settings.auto.scan_interval = 60_000;
        let probe = Arc::new(FlagProbe(AtomicBool::new(true)));
        let (sink, _reports) = recording_sink();
        let mut auto = AutoMode::with_probe(SharedSettings::new(settings), probe);

        auto.start(ActivityReporter::new(CaffeineMode::Auto, 1, sink))
            .unwrap();
        let started = std::time::Instant::now();
        auto.stop();

        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
