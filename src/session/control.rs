//! Cooperative session cancellation.

use crossbeam_channel::{after, bounded, select, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Shared stop flag, checked once per control-loop iteration.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    stopped: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Returns `true` only for the first request.
    pub fn request_stop(&self) -> bool {
        !self.stopped.swap(true, Ordering::SeqCst)
    }

    /// True once any holder has requested a stop.
    pub fn is_stop_requested(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Requests a stop once a session has run for a fixed duration.
///
/// The watchdog only raises the flag; in-flight work finishes first.
pub struct Watchdog {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Arm a watchdog that requests a stop after `limit`.
    pub fn spawn(limit: Duration, stop: StopToken) -> Self {
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let timeout = after(limit);

        let handle = std::thread::spawn(move || {
            select! {
                recv(timeout) -> _ => {
                    if stop.request_stop() {
                        tracing::info!(secs = limit.as_secs_f64(), "Session duration reached, stopping");
                    }
                }
                recv(cancel_rx) -> _ => {}
            }
        });

        Self {
            cancel: Some(cancel_tx),
            handle: Some(handle),
        }
    }

    /// Disarm the watchdog without raising the flag.
    pub fn cancel(&mut self) {
        // Dropping the sender wakes the watchdog thread.
        self.cancel.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}
