//! Dedicated drain thread
//!
//! Runs [`ManualCleaner::cleanup_unreachable`] on one named thread at a
//! fixed interval, so every foreign release happens on that thread.

use std::io;
use std::thread::JoinHandle;
use std::time::Duration;

use flume::{RecvTimeoutError, Sender};

use super::cleaner::ManualCleaner;

/// Handle to a running drain thread.
///
/// Dropping the handle stops the thread as well; [`shutdown`](Self::shutdown)
/// additionally waits for it.
#[derive(Debug)]
pub struct MaintenanceWorker {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MaintenanceWorker {
    /// Spawn a thread draining `cleaner` every `interval`.
    pub fn spawn(cleaner: ManualCleaner, interval: Duration) -> io::Result<Self> {
        let (shutdown_sender, shutdown_receiver) = flume::bounded::<()>(1);
        let name = format!("tether-cleaner-{}", cleaner.name());

        let thread = std::thread::Builder::new().name(name).spawn(move || {
            loop {
                match shutdown_receiver.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => drain(&cleaner),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            drain(&cleaner);
            tracing::debug!(cleaner = %cleaner.name(), "maintenance worker stopped");
        })?;

        Ok(Self {
            shutdown: Some(shutdown_sender),
            thread: Some(thread),
        })
    }

    /// Stop the thread after one final drain and wait for it.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(sender) = self.shutdown.take() {
            let _ = sender.try_send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("maintenance worker panicked");
            }
        }
    }
}

impl Drop for MaintenanceWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn drain(cleaner: &ManualCleaner) {
    if let Err(err) = cleaner.cleanup_unreachable() {
        tracing::warn!(cleaner = %cleaner.name(), error = %err, "maintenance drain reported failures");
    }
}
