//! Decides the OS assertion and commits it only when it changes.

use crate::Error;
use crate::mode::{Assertion, CaffeineMode, CaffeineState, SessionState};
use crate::power::PowerBackend;
use crate::settings::ModeSettings;

/// Computes the assertion the OS should hold for the given inputs.
///
/// Disabled always resolves to [`Assertion::INACTIVE`]. Otherwise a locked
/// session turns "keep display on" off unless the mode opts out of
/// `disable_on_lock_screen`.
pub fn desired_assertion(
    mode: CaffeineMode,
    reported: CaffeineState,
    session: SessionState,
    settings: &ModeSettings,
) -> Assertion {
    if mode == CaffeineMode::Disabled {
        return Assertion::INACTIVE;
    }

    let mut keep_display_on = settings.keep_display_on;
    if session == SessionState::Locked && keep_display_on {
        keep_display_on = !settings.disable_on_lock_screen;
    }

    Assertion::new(reported, keep_display_on)
}

/// Outcome of [`ExecutionStateController::update`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Commit {
    /// Desired assertion already matches the committed one; no OS call made.
    Unchanged,
    /// The OS accepted the new assertion.
    Committed(Assertion),
}

/// Owns the committed assertion and the backend it mirrors.
pub struct ExecutionStateController<P> {
    backend: P,
    committed: Assertion,
    reported: CaffeineState,
}

impl<P: PowerBackend> ExecutionStateController<P> {
    pub fn new(backend: P) -> Self {
        Self {
            backend,
            committed: Assertion::INACTIVE,
            reported: CaffeineState::Inactive,
        }
    }

    /// Last value the OS accepted.
    pub fn committed(&self) -> Assertion {
        self.committed
    }

    /// Last state reported for the current mode.
    pub fn reported(&self) -> CaffeineState {
        self.reported
    }

    /// Forgets the reported state, used when the mode changes.
    pub fn reset_reported(&mut self) {
        self.reported = CaffeineState::Inactive;
    }

    pub fn backend(&self) -> &P {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut P {
        &mut self.backend
    }

    /// Records `reported` and commits the resulting assertion if it differs
    /// from the committed one.
    ///
    /// Disabled compares the state alone; every other mode compares the
    /// state and the display flag. On OS failure the committed value is
    /// left as it was.
    pub fn update(
        &mut self,
        mode: CaffeineMode,
        reported: CaffeineState,
        session: SessionState,
        settings: &ModeSettings,
    ) -> Result<Commit, Error> {
        let reported = if mode == CaffeineMode::Disabled {
            CaffeineState::Inactive
        } else {
            reported
        };
        self.reported = reported;

        let desired = desired_assertion(mode, reported, session, settings);

        let unchanged = if mode == CaffeineMode::Disabled {
            self.committed.state == desired.state
        } else {
            self.committed == desired
        };
        if unchanged {
            tracing::debug!(%mode, state = %desired.state, "no need to update execution state");
            return Ok(Commit::Unchanged);
        }

        self.commit(desired)?;
        tracing::info!(
            %mode,
            state = %desired.state,
            keep_display_on = desired.keep_display_on,
            "updated execution state"
        );
        Ok(Commit::Committed(desired))
    }

    /// Re-runs [`update`](Self::update) with the last reported state.
    pub fn refresh(
        &mut self,
        mode: CaffeineMode,
        session: SessionState,
        settings: &ModeSettings,
    ) -> Result<Commit, Error> {
        self.update(mode, self.reported, session, settings)
    }

    /// Clears the assertion regardless of the committed value.
    pub fn clear(&mut self) -> Result<(), Error> {
        self.reported = CaffeineState::Inactive;
        self.commit(Assertion::INACTIVE)?;
        tracing::info!("cleared execution state");
        Ok(())
    }

    fn commit(&mut self, desired: Assertion) -> Result<(), Error> {
        if let Err(e) = self.backend.set_execution_state(desired) {
            tracing::error!(error = %e, "failed to update execution state");
            return Err(e);
        }
        self.committed = desired;
        Ok(())
    }
}
