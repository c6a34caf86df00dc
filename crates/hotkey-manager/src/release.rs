//! Synthesized key-up notifications.
//!
//! Global hotkey APIs generally report only the press. The detector samples
//! the physical state of every pressed hotkey's keys on a fixed cadence and
//! releases those that are no longer fully held, so release latency is
//! bounded by one interval.

use crate::platform::KeyStateSource;
use crate::registry::RegistryHandle;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shortest interval the detector thread will poll at
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for the release detector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Time between polls of the physical key state
    pub interval: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl DetectorConfig {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Polls physical key state and releases hotkeys whose keys were let go
pub struct ReleaseDetector {
    handle: RegistryHandle,
    keyboard: Arc<dyn KeyStateSource>,
}

impl ReleaseDetector {
    pub fn new(handle: RegistryHandle, keyboard: Arc<dyn KeyStateSource>) -> Self {
        Self { handle, keyboard }
    }

    /// Poll once. Every pressed hotkey with any required key no longer down
    /// is marked released and its `on_up` callback dispatched, if it has one.
    /// Returns how many hotkeys were released.
    pub fn tick(&self) -> usize {
        let keyboard = &self.keyboard;
        self.handle.release_unheld(|key| {
            key.physical_keys()
                .into_iter()
                .all(|physical| keyboard.is_down(physical))
        })
    }

    /// Run [`tick`](Self::tick) on a dedicated thread every `config.interval`
    /// (at least [`MIN_POLL_INTERVAL`]).
    ///
    /// If reading key state panics, every pressed hotkey is released and the
    /// thread exits.
    pub fn spawn(self, config: DetectorConfig) -> DetectorThread {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let interval = config.interval.max(MIN_POLL_INTERVAL);

        let thread = thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if panic::catch_unwind(AssertUnwindSafe(|| self.tick())).is_err() {
                            let released = self.handle.release_unheld(|_| false);
                            error!(released, "key state polling failed; hotkeys released");
                            break;
                        }
                    }
                    // A message or a dropped sender both mean stop.
                    _ => break,
                }
            }
            debug!("release detector exiting");
        });
        info!(?interval, "release detector started");

        DetectorThread {
            stop: Some(stop_tx),
            thread: Some(thread),
        }
    }
}

/// A running release detector
pub struct DetectorThread {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DetectorThread {
    /// Stop polling and wait for the thread. Safe to call more than once.
    pub fn stop(&mut self) {
        // Dropping the sender wakes the thread immediately.
        drop(self.stop.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("release detector panicked");
            }
            info!("release detector stopped");
        }
    }

    /// False once stopped, or if the thread exited on its own
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for DetectorThread {
    fn drop(&mut self) {
        self.stop();
    }
}
