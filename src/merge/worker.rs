//! Merge Worker
//!
//! Background thread that runs a merge on every tick until stopped.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender};

use crate::error::Result;

use super::Merger;

/// Periodic merge thread
///
/// Foreground operations never wait on it; a failed run is logged and simply
/// tried again on the next tick.
pub struct MergeWorker {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MergeWorker {
    /// Spawn the worker, merging every `interval`
    pub fn spawn(merger: Merger, interval: Duration) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(1);
        let ticker = channel::tick(interval);

        let handle = thread::Builder::new()
            .name("logkv-merge".to_string())
            .spawn(move || {
                let mut run_id = 0u64;
                loop {
                    crossbeam::select! {
                        recv(ticker) -> _ => {
                            run_id += 1;
                            match merger.run() {
                                Ok(Some(stats)) => tracing::debug!(
                                    run_id,
                                    output = %stats.output,
                                    inputs = stats.inputs.len(),
                                    "Background merge finished"
                                ),
                                Ok(None) => tracing::trace!(run_id, "Nothing to merge"),
                                Err(e) => tracing::error!(
                                    run_id,
                                    error = %e,
                                    "Background merge failed"
                                ),
                            }
                        }
                        recv(shutdown_rx) -> _ => {
                            tracing::debug!("Merge worker shutting down");
                            break;
                        }
                    }
                }
            })?;

        tracing::debug!(interval_ms = interval.as_millis() as u64, "Merge worker started");

        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Signal the thread and wait for it (finishes a merge in progress)
    pub fn stop(&mut self) {
        // Dropping the sender wakes the select
        self.shutdown.take();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Merge worker panicked");
            }
        }
    }
}

impl Drop for MergeWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
