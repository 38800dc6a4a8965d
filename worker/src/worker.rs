//! Worker lifecycle shared by producers and consumers.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, WorkerError};
use crate::stop::StopFlag;

/// Lifecycle state of a worker.
///
/// Transitions only move forward: `Created → Running → Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Constructed but not yet started.
    Created,
    /// The worker thread is running its loop.
    Running,
    /// The worker thread has exited.
    Terminated,
}

/// Why a worker left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The producer pulled every item from its source.
    SourceExhausted,
    /// The buffer was closed: rejected a producer's put, or was drained by a
    /// consumer.
    BufferClosed,
    /// The stop flag was observed.
    Stopped,
}

/// Summary of a worker run that ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    /// Worker name.
    pub name: String,
    /// Items put (producer) or appended to the destination (consumer).
    pub items: usize,
    /// Why the loop ended.
    pub exit: ExitReason,
}

struct Shared {
    state: Mutex<WorkerState>,
    changed: Condvar,
}

/// Marks the worker terminated when the thread body returns or unwinds.
struct TerminateGuard(Arc<Shared>);

impl Drop for TerminateGuard {
    fn drop(&mut self) {
        *self.0.state.lock() = WorkerState::Terminated;
        self.0.changed.notify_all();
    }
}

/// A named OS thread with a stop flag and a joinable outcome.
pub(crate) struct Worker {
    name: String,
    stop: StopFlag,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<Result<WorkerReport>>>,
    outcome: Option<Result<WorkerReport>>,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("stopped", &self.stop.is_stopped())
            .finish()
    }
}

impl Worker {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Worker {
            name: name.into(),
            stop: StopFlag::new(),
            shared: Arc::new(Shared {
                state: Mutex::new(WorkerState::Created),
                changed: Condvar::new(),
            }),
            thread: None,
            outcome: None,
        }
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn stop(&self) {
        self.stop.stop();
    }

    pub(crate) fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub(crate) fn state(&self) -> WorkerState {
        *self.shared.state.lock()
    }

    /// Runs `body` on a new thread named after the worker.
    pub(crate) fn spawn<F>(&mut self, body: F) -> Result<()>
    where
        F: FnOnce(StopFlag) -> Result<WorkerReport> + Send + 'static,
    {
        {
            let mut state = self.shared.state.lock();
            if *state != WorkerState::Created {
                return Err(WorkerError::AlreadyStarted(self.name.clone()));
            }
            // Set before spawning so a fast body cannot be overwritten.
            *state = WorkerState::Running;
        }

        let shared = Arc::clone(&self.shared);
        let stop = self.stop.clone();
        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let _terminate = TerminateGuard(shared);
                body(stop)
            });

        match spawned {
            Ok(handle) => {
                tracing::debug!(worker = %self.name, "worker started");
                self.thread = Some(handle);
                Ok(())
            }
            Err(source) => {
                *self.shared.state.lock() = WorkerState::Created;
                Err(WorkerError::Spawn {
                    name: self.name.clone(),
                    source,
                })
            }
        }
    }

    /// Waits for the thread to terminate and collects its outcome.
    ///
    /// Returns false if the worker was never started or is still running
    /// when `timeout` elapses.
    pub(crate) fn join(&mut self, timeout: Option<Duration>) -> bool {
        if self.outcome.is_some() {
            return true;
        }

        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        {
            let mut state = self.shared.state.lock();
            loop {
                match *state {
                    WorkerState::Created => return false,
                    WorkerState::Terminated => break,
                    WorkerState::Running => {}
                }
                match deadline {
                    Some(deadline) => {
                        if Instant::now() >= deadline {
                            return false;
                        }
                        let _ = self.shared.changed.wait_until(&mut state, deadline);
                    }
                    None => self.shared.changed.wait(&mut state),
                }
            }
        }

        if let Some(handle) = self.thread.take() {
            let outcome = match handle.join() {
                Ok(result) => result,
                Err(payload) => Err(WorkerError::Panicked {
                    name: self.name.clone(),
                    message: panic_message(payload.as_ref()),
                }),
            };
            match &outcome {
                Ok(report) => tracing::debug!(
                    worker = %self.name,
                    items = report.items,
                    exit = ?report.exit,
                    "worker finished"
                ),
                Err(err) => tracing::debug!(worker = %self.name, error = %err, "worker failed"),
            }
            self.outcome = Some(outcome);
        }
        true
    }

    pub(crate) fn outcome(&self) -> Option<&Result<WorkerReport>> {
        self.outcome.as_ref()
    }

    pub(crate) fn into_outcome(self) -> Option<Result<WorkerReport>> {
        self.outcome
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
