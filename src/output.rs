//! Bounded diagnostic output channel.
//!
//! Dispatch appends one line per request; a surrounding process drains the
//! backlog periodically. Draining swaps the queue out under the lock and
//! feeds the sink afterwards, so a slow sink never blocks dispatch.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Default number of buffered lines.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Bounded queue of diagnostic lines. The oldest line is dropped when full.
#[derive(Debug)]
pub struct OutputLog {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl Default for OutputLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl OutputLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            capacity,
        }
    }

    /// Append a line.
    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// Hand every buffered line to `sink`, oldest first, and clear the backlog.
    ///
    /// Returns the number of lines drained.
    pub fn drain(&self, mut sink: impl FnMut(&str)) -> usize {
        let backlog = {
            let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *lines)
        };
        for line in &backlog {
            sink(line);
        }
        backlog.len()
    }

    pub fn len(&self) -> usize {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Background task that drains an [`OutputLog`] into `tracing` on an interval.
pub struct LogSubscriber {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl LogSubscriber {
    /// Start draining `output` every `interval`.
    pub fn start(output: Arc<OutputLog>, interval: Duration) -> Self {
        let (tx, mut rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        output.drain(|line| info!(target: "http_mock_api::output", "{}", line));
                    }
                    _ = &mut rx => break,
                }
            }
            // Flush whatever arrived since the last tick.
            output.drain(|line| info!(target: "http_mock_api::output", "{}", line));
            debug!("Log subscriber stopped");
        });

        Self {
            shutdown: Some(tx),
            task,
        }
    }

    /// Stop draining and wait for the final flush.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}
