//! Pluggable mode strategies.
//!
//! A strategy decides on its own schedule whether the machine should be kept
//! awake and says so through an [`ActivityReporter`]. Reports are tagged with
//! the generation the strategy was started under so the controller can drop
//! anything that arrives after the strategy was stopped.

use std::fmt;
use std::sync::Arc;

use crate::Error;
use crate::mode::CaffeineMode;

mod auto;
mod timer;

pub use auto::{ActivityProbe, AutoMode, ProcessProbe};
pub use timer::TimerMode;

/// One "I am now active / inactive" message from a strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActivityReport {
    pub mode: CaffeineMode,
    pub generation: u64,
    pub active: bool,
}

/// Receives reports and marshals them onto the control thread.
pub type ActivitySink = Arc<dyn Fn(ActivityReport) + Send + Sync + 'static>;

/// Narrow callback handed to a strategy on start.
#[derive(Clone)]
pub struct ActivityReporter {
    mode: CaffeineMode,
    generation: u64,
    sink: ActivitySink,
}

impl ActivityReporter {
    pub fn new(mode: CaffeineMode, generation: u64, sink: ActivitySink) -> Self {
        Self {
            mode,
            generation,
            sink,
        }
    }

    pub fn report(&self, active: bool) {
        tracing::trace!(mode = %self.mode, generation = self.generation, active, "activity report");
        (self.sink)(ActivityReport {
            mode: self.mode,
            generation: self.generation,
            active,
        });
    }

    pub fn mode(&self) -> CaffeineMode {
        self.mode
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Debug for ActivityReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityReporter")
            .field("mode", &self.mode)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// A mode's activity detection.
///
/// `stop` must halt any background work before it returns; no report may be
/// issued afterwards.
pub trait ModeStrategy {
    fn mode(&self) -> CaffeineMode;

    fn start(&mut self, reporter: ActivityReporter) -> Result<(), Error>;

    fn stop(&mut self);
}

/// Never reports anything.
#[derive(Debug, Default)]
pub struct DisabledMode;

impl ModeStrategy for DisabledMode {
    fn mode(&self) -> CaffeineMode {
        CaffeineMode::Disabled
    }

    fn start(&mut self, _reporter: ActivityReporter) -> Result<(), Error> {
        Ok(())
    }

    fn stop(&mut self) {}
}

/// Reports active once on start.
#[derive(Debug, Default)]
pub struct EnabledMode;

impl ModeStrategy for EnabledMode {
    fn mode(&self) -> CaffeineMode {
        CaffeineMode::Enabled
    }

    fn start(&mut self, reporter: ActivityReporter) -> Result<(), Error> {
        reporter.report(true);
        Ok(())
    }

    fn stop(&mut self) {}
}
