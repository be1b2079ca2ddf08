//! Owns the current mode and drives strategy start/stop transitions.

use crate::Error;
use crate::mode::{CaffeineMode, CaffeineState};
use crate::settings::{ModeSettings, SettingsProvider, SharedSettings};
use crate::strategy::{
    ActivityReport, ActivityReporter, ActivitySink, AutoMode, DisabledMode, EnabledMode,
    ModeStrategy, TimerMode,
};

fn slot(mode: CaffeineMode) -> usize {
    match mode {
        CaffeineMode::Disabled => 0,
        CaffeineMode::Enabled => 1,
        CaffeineMode::Auto => 2,
        CaffeineMode::Timer => 3,
    }
}

/// Holds one strategy per mode; at most one of them runs at a time.
pub struct ModeController {
    strategies: [Box<dyn ModeStrategy>; 4],
    current: CaffeineMode,
    generation: u64,
    running: bool,
    sink: ActivitySink,
}

impl ModeController {
    /// Controller with the built-in strategies. Nothing runs until [`set_mode`](Self::set_mode).
    pub fn new(settings: SharedSettings, sink: ActivitySink) -> Self {
        Self {
            strategies: [
                Box::new(DisabledMode),
                Box::new(EnabledMode),
                Box::new(AutoMode::new(settings.clone())),
                Box::new(TimerMode::new(settings)),
            ],
            current: CaffeineMode::Disabled,
            generation: 0,
            running: false,
            sink,
        }
    }

    /// Swaps in a strategy for the mode it reports. A running strategy being
    /// replaced is stopped first and the replacement is not started.
    pub fn replace_strategy(&mut self, strategy: Box<dyn ModeStrategy>) {
        let mode = strategy.mode();
        if self.running && self.current == mode {
            self.stop();
        }
        self.strategies[slot(mode)] = strategy;
    }

    pub fn current(&self) -> CaffeineMode {
        self.current
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the current mode's strategy has been started and not stopped.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Stops the current strategy, switches to `mode` and starts its strategy.
    ///
    /// Re-selecting the current mode still restarts it. If the settings for
    /// `mode` cannot be read nothing changes. Returns the new mode's settings.
    pub fn set_mode(
        &mut self,
        mode: CaffeineMode,
        settings: &dyn SettingsProvider,
    ) -> Result<ModeSettings, Error> {
        let mode_settings = settings.mode_settings(mode).map_err(|e| {
            tracing::error!(%mode, error = %e, "cannot enter mode, keeping {}", self.current);
            e
        })?;

        tracing::info!(from = %self.current, to = %mode, "setting caffeine mode");

        self.stop();
        self.current = mode;
        self.start()?;

        Ok(mode_settings)
    }

    /// Advances the toggle cycle by one.
    pub fn toggle_mode(&mut self, settings: &dyn SettingsProvider) -> Result<ModeSettings, Error> {
        self.set_mode(self.current.next(), settings)
    }

    /// Validates a report against the running strategy.
    ///
    /// Returns the state to feed into the execution-state computation, `None`
    /// when the current mode ignores activity, or
    /// [`Error::ProtocolViolation`] for a report from a stopped strategy.
    pub fn report_activity(&self, report: ActivityReport) -> Result<Option<CaffeineState>, Error> {
        if !self.running || report.generation != self.generation || report.mode != self.current {
            return Err(Error::ProtocolViolation {
                mode: report.mode,
                generation: report.generation,
                current: self.generation,
            });
        }

        if self.current == CaffeineMode::Disabled {
            tracing::debug!("ignoring activity report in disabled mode");
            return Ok(None);
        }

        Ok(Some(CaffeineState::from_active(report.active)))
    }

    /// Stops the current strategy. Returns once its background work has halted.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.strategies[slot(self.current)].stop();
        self.running = false;
        tracing::debug!(mode = %self.current, generation = self.generation, "stopped strategy");
    }

    fn start(&mut self) -> Result<(), Error> {
        self.generation += 1;
        let reporter = ActivityReporter::new(self.current, self.generation, self.sink.clone());
        self.running = true;
        if let Err(e) = self.strategies[slot(self.current)].start(reporter) {
            self.running = false;
            tracing::error!(mode = %self.current, error = %e, "failed to start strategy");
            return Err(e);
        }
        tracing::debug!(mode = %self.current, generation = self.generation, "started strategy");
        Ok(())
    }
}

impl Drop for ModeController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::testing::recording_sink;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records start/stop calls into a shared log and checks for overlap.
    struct Probe {
        mode: CaffeineMode,
        log: Arc<Mutex<Vec<String>>>,
        live: Arc<Mutex<usize>>,
    }

    impl ModeStrategy for Probe {
        fn mode(&self) -> CaffeineMode {
            self.mode
        }

        fn start(&mut self, _reporter: ActivityReporter) -> Result<(), Error> {
            let mut live = self.live.lock();
            assert_eq!(*live, 0, "strategy started while another was running");
            *live += 1;
            self.log.lock().push(format!("start {}", self.mode));
            Ok(())
        }

        fn stop(&mut self) {
            *self.live.lock() -= 1;
            self.log.lock().push(format!("stop {}", self.mode));
        }
    }

    struct Unavailable;

    impl SettingsProvider for Unavailable {
        fn mode_settings(&self, mode: CaffeineMode) -> Result<ModeSettings, Error> {
            match mode {
                CaffeineMode::Auto => Err(Error::SettingsUnavailable(mode)),
                _ => Ok(ModeSettings::default()),
            }
        }
    }

    fn probed_controller() -> (ModeController, Arc<Mutex<Vec<String>>>) {
        let (sink, _) = recording_sink();
        let mut controller = ModeController::new(SharedSettings::default(), sink);
        let log = Arc::new(Mutex::new(Vec::new()));
        let live = Arc::new(Mutex::new(0));
        for mode in CaffeineMode::ALL {
            controller.replace_strategy(Box::new(Probe {
                mode,
                log: log.clone(),
                live: live.clone(),
            }));
        }
        (controller, log)
    }

    #[test]
    fn transitions_stop_before_start() {
        let (mut controller, log) = probed_controller();
        let settings = SharedSettings::default();

        controller.set_mode(CaffeineMode::Enabled, &settings).unwrap();
        controller.set_mode(CaffeineMode::Auto, &settings).unwrap();
        controller.set_mode(CaffeineMode::Auto, &settings).unwrap();
        controller.stop();

        assert_eq!(
            *log.lock(),
            vec![
                "start enabled",
                "stop enabled",
                "start auto",
                "stop auto",
                "start auto",
                "stop auto",
            ]
        );
    }

    #[test]
    fn toggle_walks_the_cycle() {
        let (mut controller, _log) = probed_controller();
        let settings = SharedSettings::default();
        controller.set_mode(CaffeineMode::Timer, &settings).unwrap();

        let mut seen = Vec::new();
        for _ in 0..4 {
            controller.toggle_mode(&settings).unwrap();
            seen.push(controller.current());
        }

        assert_eq!(
            seen,
            vec![
                CaffeineMode::Disabled,
                CaffeineMode::Enabled,
                CaffeineMode::Auto,
                CaffeineMode::Timer,
            ]
        );
    }

    #[test]
    fn unavailable_settings_keep_previous_mode() {
        let (mut controller, log) = probed_controller();
        controller.set_mode(CaffeineMode::Enabled, &Unavailable).unwrap();

        let err = controller.set_mode(CaffeineMode::Auto, &Unavailable).unwrap_err();

        assert!(matches!(err, Error::SettingsUnavailable(CaffeineMode::Auto)));
        assert_eq!(controller.current(), CaffeineMode::Enabled);
        assert!(controller.is_running());
        assert_eq!(*log.lock(), vec!["start enabled"]);
    }

    #[test]
    fn stale_reports_are_protocol_violations() {
        let (mut controller, _log) = probed_controller();
        let settings = SharedSettings::default();
        controller.set_mode(CaffeineMode::Auto, &settings).unwrap();
        let old = controller.generation();
        controller.set_mode(CaffeineMode::Timer, &settings).unwrap();

        let stale = ActivityReport {
            mode: CaffeineMode::Auto,
            generation: old,
            active: true,
        };
        assert!(matches!(
            controller.report_activity(stale),
            Err(Error::ProtocolViolation { .. })
        ));

        let fresh = ActivityReport {
            mode: CaffeineMode::Timer,
            generation: controller.generation(),
            active: true,
        };
        assert_eq!(
            controller.report_activity(fresh).unwrap(),
            Some(CaffeineState::Active)
        );

        controller.stop();
        assert!(controller.report_activity(fresh).is_err());
    }

    #[test]
    fn disabled_mode_ignores_reports() {
        let (mut controller, _log) = probed_controller();
        controller
            .set_mode(CaffeineMode::Disabled, &SharedSettings::default())
            .unwrap();

        let report = ActivityReport {
            mode: CaffeineMode::Disabled,
            generation: controller.generation(),
            active: true,
        };
        assert_eq!(controller.report_activity(report).unwrap(), None);
    }
}
