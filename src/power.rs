//! The OS power-state primitive.

use crate::mode::Assertion;
use crate::{Error, sys};

/// Sole channel for suppressing the OS idle/display timers.
///
/// Implementations use continuous semantics: an assertion stays in effect
/// until the next call replaces it or the process exits.
pub trait PowerBackend {
    fn set_execution_state(&mut self, assertion: Assertion) -> Result<(), Error>;
}

impl<P: PowerBackend + ?Sized> PowerBackend for Box<P> {
    fn set_execution_state(&mut self, assertion: Assertion) -> Result<(), Error> {
        (**self).set_execution_state(assertion)
    }
}

/// Platform implementation of [`PowerBackend`].
///
/// On Windows the execution state is bound to the calling thread, so this
/// must live on the control thread.
pub struct SystemPower {
    inner: sys::Inner,
}

impl SystemPower {
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            inner: sys::Inner::new()?,
        })
    }

    /// Best-effort check (Linux: checks for a usable inhibitor service).
    pub fn is_supported() -> bool {
        sys::is_supported()
    }
}

impl PowerBackend for SystemPower {
    fn set_execution_state(&mut self, assertion: Assertion) -> Result<(), Error> {
        sys::apply(&mut self.inner, assertion)
    }
}

impl Drop for SystemPower {
    fn drop(&mut self) {
        if let Err(e) = sys::apply(&mut self.inner, Assertion::INACTIVE) {
            tracing::warn!(error = %e, "failed to clear execution state on drop");
        }
    }
}
