//! Timer mode - active for a fixed duration, then inactive.

use std::thread::JoinHandle;

use crossbeam_channel::{RecvTimeoutError, Sender};

use super::{ActivityReporter, ModeStrategy};
use crate::Error;
use crate::mode::CaffeineMode;
use crate::settings::SharedSettings;

struct Countdown {
    cancel_tx: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct TimerMode {
    settings: SharedSettings,
    countdown: Option<Countdown>,
}

impl TimerMode {
    pub fn new(settings: SharedSettings) -> Self {
        Self {
            settings,
            countdown: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.countdown.is_some()
    }
}

impl ModeStrategy for TimerMode {
    fn mode(&self) -> CaffeineMode {
        CaffeineMode::Timer
    }

    fn start(&mut self, reporter: ActivityReporter) -> Result<(), Error> {
        if self.countdown.is_some() {
            tracing::warn!("timer already running, restarting");
            self.stop();
        }

        let duration = self.settings.timer().duration();
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(1);

        reporter.report(true);
        let handle = std::thread::Builder::new()
            .name("caffeine-timer".to_string())
            .spawn(move || match cancel_rx.recv_timeout(duration) {
                Err(RecvTimeoutError::Timeout) => {
                    tracing::info!(?duration, "timer elapsed");
                    reporter.report(false);
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    tracing::debug!("timer cancelled");
                }
            })
            .map_err(|e| Error::Strategy {
                mode: CaffeineMode::Timer,
                details: e.to_string(),
            })?;

        self.countdown = Some(Countdown { cancel_tx, handle });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            let _ = countdown.cancel_tx.send(());
            if countdown.handle.join().is_err() {
                tracing::error!("timer thread panicked");
            }
        }
    }
}

impl Drop for TimerMode {
    fn drop(&mut self) {
        self.stop();
    }
}
