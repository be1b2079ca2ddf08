//! The control thread: serializes mode changes, activity reports and session
//! notifications, and feeds them to the execution-state controller.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::Error;
use crate::controller::ModeController;
use crate::execution::{Commit, ExecutionStateController};
use crate::mode::{Assertion, CaffeineMode, CaffeineState, SessionState};
use crate::power::PowerBackend;
use crate::session::{SessionEvent, SessionLockTracker};
use crate::settings::{ModeSettings, SettingsProvider, SharedSettings};
use crate::strategy::{ActivityReport, ActivitySink, ModeStrategy};

/// Everything the control thread reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    SetMode(CaffeineMode),
    ToggleMode,
    /// Report from a running strategy.
    Activity(ActivityReport),
    Session(SessionEvent),
    /// External request to assert or release, keeping the current mode.
    UpdateExecutionState(CaffeineState),
    Refresh,
    /// Settings were replaced externally.
    ReloadSettings,
    Shutdown,
}

/// Notified on actual changes; used by the icon/tip layer.
pub trait CaffeineObserver {
    fn on_mode_changed(&self, _mode: CaffeineMode) {}

    fn on_execution_state_changed(&self, _mode: CaffeineMode, _assertion: Assertion) {}
}

/// Posts events to the control thread from anywhere.
#[derive(Clone, Debug)]
pub struct CaffeineHandle {
    tx: Sender<Event>,
}

impl CaffeineHandle {
    /// Returns `false` if the control thread is gone.
    pub fn send(&self, event: Event) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn set_mode(&self, mode: CaffeineMode) -> bool {
        self.send(Event::SetMode(mode))
    }

    pub fn toggle_mode(&self) -> bool {
        self.send(Event::ToggleMode)
    }

    pub fn enable_caffeine(&self) -> bool {
        self.send(Event::UpdateExecutionState(CaffeineState::Active))
    }

    pub fn disable_caffeine(&self) -> bool {
        self.send(Event::UpdateExecutionState(CaffeineState::Inactive))
    }

    pub fn session_locked(&self) -> bool {
        self.send(Event::Session(SessionEvent::Lock))
    }

    pub fn session_unlocked(&self) -> bool {
        self.send(Event::Session(SessionEvent::Unlock))
    }

    pub fn reload_settings(&self) -> bool {
        self.send(Event::ReloadSettings)
    }

    pub fn shutdown(&self) -> bool {
        self.send(Event::Shutdown)
    }
}

/// Mode machine plus execution-state controller, driven from one thread.
pub struct Caffeine<P: PowerBackend> {
    controller: ModeController,
    execution: ExecutionStateController<P>,
    session: SessionLockTracker,
    settings: SharedSettings,
    provider: Arc<dyn SettingsProvider>,
    observers: Vec<Box<dyn CaffeineObserver>>,
    tx: Sender<Event>,
    rx: Receiver<Event>,
    shut_down: bool,
}

impl<P: PowerBackend> Caffeine<P> {
    pub fn new(backend: P, settings: SharedSettings) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded::<Event>();

        let activity_tx = tx.clone();
        let sink: ActivitySink = Arc::new(move |report| {
            if activity_tx.send(Event::Activity(report)).is_err() {
                tracing::debug!(?report, "control thread gone, dropping activity report");
            }
        });

        Self {
            controller: ModeController::new(settings.clone(), sink),
            execution: ExecutionStateController::new(backend),
            session: SessionLockTracker::default(),
            provider: Arc::new(settings.clone()),
            settings,
            observers: Vec::new(),
            tx,
            rx,
            shut_down: false,
        }
    }

    /// Session state at startup.
    pub fn with_session_state(mut self, state: SessionState) -> Self {
        self.session = SessionLockTracker::new(state);
        self
    }

    /// Reads per-mode settings from `provider` instead of the shared settings.
    pub fn with_settings_provider(mut self, provider: Arc<dyn SettingsProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Replaces the built-in strategy for `strategy.mode()`.
    pub fn with_strategy(mut self, strategy: Box<dyn ModeStrategy>) -> Self {
        self.controller.replace_strategy(strategy);
        self
    }

    pub fn add_observer(&mut self, observer: Box<dyn CaffeineObserver>) {
        self.observers.push(observer);
    }

    pub fn handle(&self) -> CaffeineHandle {
        CaffeineHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn mode(&self) -> CaffeineMode {
        self.controller.current()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn committed(&self) -> Assertion {
        self.execution.committed()
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    pub fn backend(&self) -> &P {
        self.execution.backend()
    }

    /// Enters the mode remembered in the settings. Mode changes are not written
    /// back; the host persists `last_mode` itself.
    pub fn start(&mut self) -> bool {
        let mode = self.settings.snapshot().last_mode;
        tracing::info!(%mode, "starting");
        self.set_mode(mode)
    }

    pub fn set_mode(&mut self, mode: CaffeineMode) -> bool {
        self.dispatch(Event::SetMode(mode))
    }

    pub fn toggle_mode(&mut self) -> bool {
        self.dispatch(Event::ToggleMode)
    }

    pub fn enable_caffeine(&mut self) -> bool {
        tracing::trace!("enable caffeine");
        self.dispatch(Event::UpdateExecutionState(CaffeineState::Active))
    }

    pub fn disable_caffeine(&mut self) -> bool {
        tracing::trace!("disable caffeine");
        self.dispatch(Event::UpdateExecutionState(CaffeineState::Inactive))
    }

    pub fn refresh_execution_state(&mut self) -> bool {
        self.dispatch(Event::Refresh)
    }

    pub fn session_locked(&mut self) -> bool {
        self.dispatch(Event::Session(SessionEvent::Lock))
    }

    pub fn session_unlocked(&mut self) -> bool {
        self.dispatch(Event::Session(SessionEvent::Unlock))
    }

    pub fn reload_settings(&mut self) -> bool {
        self.dispatch(Event::ReloadSettings)
    }

    /// Handles `event`, then everything it queued. Returns whether `event`
    /// took effect.
    pub fn dispatch(&mut self, event: Event) -> bool {
        let applied = self.handle_event(event);
        self.drain();
        applied
    }

    /// Handles whatever is queued without blocking.
    pub fn drain(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.handle_event(event);
        }
    }

    /// Blocks handling events until [`Event::Shutdown`].
    pub fn run(&mut self) {
        tracing::info!("event loop started");
        while !self.shut_down {
            match self.rx.recv() {
                Ok(event) => {
                    self.handle_event(event);
                }
                Err(_) => break,
            }
        }
        tracing::info!("event loop ended");
    }

    /// Stops the current strategy and clears the OS assertion.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        tracing::info!("shutting down");
        self.controller.stop();
        if let Err(e) = self.execution.clear() {
            tracing::error!(error = %e, "failed to clear execution state on shutdown");
        }
        self.shut_down = true;
    }

    fn handle_event(&mut self, event: Event) -> bool {
        if self.shut_down {
            tracing::debug!(?event, "ignoring event after shutdown");
            return false;
        }
        tracing::trace!(?event, "handling event");

        match event {
            Event::SetMode(mode) => self.apply_mode(mode),
            Event::ToggleMode => self.apply_mode(self.controller.current().next()),
            Event::Activity(report) => match self.controller.report_activity(report) {
                Ok(Some(state)) => self.update_execution_state(state),
                Ok(None) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping activity report");
                    false
                }
            },
            Event::Session(session_event) => {
                if self.session.apply(session_event) {
                    self.refresh()
                } else {
                    true
                }
            }
            Event::UpdateExecutionState(state) => self.update_execution_state(state),
            Event::Refresh => self.refresh(),
            Event::ReloadSettings => {
                tracing::info!("settings reloaded");
                self.refresh()
            }
            Event::Shutdown => {
                self.shutdown();
                true
            }
        }
    }

    fn apply_mode(&mut self, mode: CaffeineMode) -> bool {
        let previous = self.controller.current();
        let generation = self.controller.generation();

        let result = self.controller.set_mode(mode, self.provider.as_ref());
        if self.controller.generation() == generation {
            // Settings could not be read; nothing was stopped.
            return false;
        }

        // A different mode never inherits the previous mode's activity.
        // Re-entering the same mode keeps it until the restarted strategy reports.
        if previous != mode {
            self.execution.reset_reported();
            for observer in &self.observers {
                observer.on_mode_changed(mode);
            }
        }

        // Runs after anything the new strategy reported while starting.
        let _ = self.tx.send(Event::Refresh);

        result.is_ok()
    }

    fn update_execution_state(&mut self, state: CaffeineState) -> bool {
        let mode = self.controller.current();
        let Some(settings) = self.mode_settings(mode) else {
            return false;
        };
        let result = self
            .execution
            .update(mode, state, self.session.state(), &settings);
        self.after_update(mode, result)
    }

    fn refresh(&mut self) -> bool {
        let mode = self.controller.current();
        let Some(settings) = self.mode_settings(mode) else {
            return false;
        };
        let result = self.execution.refresh(mode, self.session.state(), &settings);
        self.after_update(mode, result)
    }

    fn mode_settings(&self, mode: CaffeineMode) -> Option<ModeSettings> {
        match self.provider.mode_settings(mode) {
            Ok(settings) => Some(settings),
            Err(e) => {
                tracing::error!(%mode, error = %e, "cannot compute execution state");
                None
            }
        }
    }

    fn after_update(&self, mode: CaffeineMode, result: Result<Commit, Error>) -> bool {
        match result {
            Ok(Commit::Committed(assertion)) => {
                for observer in &self.observers {
                    observer.on_execution_state_changed(mode, assertion);
                }
                true
            }
            Ok(Commit::Unchanged) => true,
            Err(_) => false,
        }
    }
}

impl<P: PowerBackend> Drop for Caffeine<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::strategy::{ActivityProbe, AutoMode};
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<Assertion>>>,
        fail: Arc<Mutex<bool>>,
    }

    impl PowerBackend for Recorder {
        fn set_execution_state(&mut self, assertion: Assertion) -> Result<(), Error> {
            if *self.fail.lock() {
                return Err(Error::Os("injected".to_string()));
            }
            self.calls.lock().push(assertion);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct Notifications {
        modes: Arc<Mutex<Vec<CaffeineMode>>>,
        states: Arc<Mutex<Vec<Assertion>>>,
    }

    impl CaffeineObserver for Notifications {
        fn on_mode_changed(&self, mode: CaffeineMode) {
            self.modes.lock().push(mode);
        }

        fn on_execution_state_changed(&self, _mode: CaffeineMode, assertion: Assertion) {
            self.states.lock().push(assertion);
        }
    }

    fn caffeine(settings: Settings) -> (Caffeine<Recorder>, Recorder) {
        let recorder = Recorder::default();
        let caffeine = Caffeine::new(recorder.clone(), SharedSettings::new(settings));
        (caffeine, recorder)
    }

    #[test]
    fn enabled_mode_commits_once() {
        let mut settings = Settings::default();
        settings.standard.keep_display_on = true;
        let (mut caffeine, recorder) = caffeine(settings);

        assert!(caffeine.set_mode(CaffeineMode::Enabled));

        assert_eq!(
            caffeine.committed(),
            Assertion::new(CaffeineState::Active, true)
        );
        assert_eq!(recorder.calls.lock().len(), 1);
    }

    #[test]
    fn setting_the_same_mode_twice_is_idempotent() {
        let (mut caffeine, recorder) = caffeine(Settings::default());

        caffeine.set_mode(CaffeineMode::Enabled);
        let once = caffeine.committed();
        caffeine.set_mode(CaffeineMode::Enabled);

        assert_eq!(caffeine.committed(), once);
        assert_eq!(recorder.calls.lock().len(), 1);
    }

    #[test]
    fn disabling_releases_the_assertion() {
        let (mut caffeine, recorder) = caffeine(Settings::default());

        caffeine.set_mode(CaffeineMode::Enabled);
        caffeine.set_mode(CaffeineMode::Disabled);

        assert_eq!(caffeine.committed(), Assertion::INACTIVE);
        assert_eq!(
            *recorder.calls.lock(),
            vec![
                Assertion::new(CaffeineState::Active, false),
                Assertion::INACTIVE
            ]
        );
    }

    #[test]
    fn enable_caffeine_in_disabled_mode_stays_inactive() {
        let (mut caffeine, recorder) = caffeine(Settings::default());
        caffeine.set_mode(CaffeineMode::Disabled);

        assert!(caffeine.enable_caffeine());

        assert_eq!(caffeine.committed(), Assertion::INACTIVE);
        assert!(recorder.calls.lock().is_empty());
    }

    #[test]
    fn disable_caffeine_keeps_the_mode() {
        let (mut caffeine, _recorder) = caffeine(Settings::default());
        caffeine.set_mode(CaffeineMode::Enabled);

        assert!(caffeine.disable_caffeine());

        assert_eq!(caffeine.mode(), CaffeineMode::Enabled);
        assert_eq!(caffeine.committed().state, CaffeineState::Inactive);
    }

    #[test]
    fn failed_commit_is_reported_and_retried_by_next_event() {
        let (mut caffeine, recorder) = caffeine(Settings::default());
        *recorder.fail.lock() = true;

        caffeine.set_mode(CaffeineMode::Enabled);
        assert_eq!(caffeine.committed(), Assertion::INACTIVE);
        assert!(!caffeine.enable_caffeine());

        *recorder.fail.lock() = false;
        assert!(caffeine.refresh_execution_state());
        assert_eq!(caffeine.committed().state, CaffeineState::Active);
    }

    #[test]
    fn observers_fire_once_per_change() {
        let (mut caffeine, _recorder) = caffeine(Settings::default());
        let notifications = Notifications::default();
        caffeine.add_observer(Box::new(notifications.clone()));

        caffeine.set_mode(CaffeineMode::Enabled);
        caffeine.set_mode(CaffeineMode::Enabled);
        caffeine.refresh_execution_state();
        caffeine.refresh_execution_state();

        assert_eq!(*notifications.modes.lock(), vec![CaffeineMode::Enabled]);
        assert_eq!(
            *notifications.states.lock(),
            vec![Assertion::new(CaffeineState::Active, false)]
        );
    }

    #[test]
    fn reselecting_auto_mode_does_not_flicker() {
        struct AlwaysActive;

        impl ActivityProbe for AlwaysActive {
            fn is_active(&self) -> bool {
                true
            }
        }

        let mut settings = Settings::default();
        settings.auto.scan_interval = 10;
        let (caffeine, recorder) = caffeine(settings);
        let shared = caffeine.settings().clone();
        let mut caffeine = caffeine.with_strategy(Box::new(AutoMode::with_probe(
            shared,
            Arc::new(AlwaysActive),
        )));

        caffeine.set_mode(CaffeineMode::Auto);
        std::thread::sleep(Duration::from_millis(100));
        caffeine.drain();
        assert_eq!(
            *recorder.calls.lock(),
            vec![Assertion::new(CaffeineState::Active, false)]
        );

        caffeine.set_mode(CaffeineMode::Auto);
        std::thread::sleep(Duration::from_millis(100));
        caffeine.drain();

        assert_eq!(caffeine.committed().state, CaffeineState::Active);
        assert_eq!(recorder.calls.lock().len(), 1);
    }

    #[test]
    fn unavailable_settings_keep_previous_mode() {
        struct NoTimer(SharedSettings);

        impl SettingsProvider for NoTimer {
            fn mode_settings(&self, mode: CaffeineMode) -> Result<ModeSettings, Error> {
                if mode == CaffeineMode::Timer {
                    return Err(Error::SettingsUnavailable(mode));
                }
                self.0.mode_settings(mode)
            }
        }

        let (caffeine, _recorder) = caffeine(Settings::default());
        let shared = caffeine.settings().clone();
        let mut caffeine = caffeine.with_settings_provider(Arc::new(NoTimer(shared)));

        caffeine.set_mode(CaffeineMode::Enabled);
        assert!(!caffeine.set_mode(CaffeineMode::Timer));

        assert_eq!(caffeine.mode(), CaffeineMode::Enabled);
        assert_eq!(caffeine.committed().state, CaffeineState::Active);
    }

    #[test]
    fn reload_picks_up_new_display_setting() {
        let (mut caffeine, _recorder) = caffeine(Settings::default());
        caffeine.set_mode(CaffeineMode::Enabled);
        assert!(!caffeine.committed().keep_display_on);

        let mut next = Settings::default();
        next.standard.keep_display_on = true;
        caffeine.settings().replace(next);
        caffeine.reload_settings();

        assert!(caffeine.committed().keep_display_on);
    }

    #[test]
    fn start_enters_the_remembered_mode() {
        let mut settings = Settings::default();
        settings.last_mode = CaffeineMode::Enabled;
        let (mut caffeine, _recorder) = caffeine(settings);

        caffeine.start();

        assert_eq!(caffeine.mode(), CaffeineMode::Enabled);
        assert_eq!(caffeine.committed().state, CaffeineState::Active);
    }

    #[test]
    fn shutdown_clears_and_ignores_later_events() {
        let (mut caffeine, recorder) = caffeine(Settings::default());
        caffeine.set_mode(CaffeineMode::Enabled);

        caffeine.shutdown();
        assert_eq!(recorder.calls.lock().last(), Some(&Assertion::INACTIVE));

        assert!(!caffeine.set_mode(CaffeineMode::Enabled));
        assert_eq!(caffeine.committed(), Assertion::INACTIVE);
    }

    #[test]
    fn drop_clears_the_assertion() {
        let (mut caffeine, recorder) = caffeine(Settings::default());
        caffeine.set_mode(CaffeineMode::Enabled);
        drop(caffeine);

        assert_eq!(recorder.calls.lock().last(), Some(&Assertion::INACTIVE));
    }
}
