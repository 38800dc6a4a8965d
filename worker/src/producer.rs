//! Producer worker: moves items from a source into a buffer.

use std::fmt;
use std::time::Duration;

use conveyor_buffer::{BoundedBuffer, Source};

use crate::error::{Result, WorkerError};
use crate::stop::StopFlag;
use crate::worker::{ExitReason, Worker, WorkerReport, WorkerState};

/// Default producer name.
pub const DEFAULT_PRODUCER_NAME: &str = "producer";

/// A worker thread that feeds a [`Source`] into a [`BoundedBuffer`].
///
/// Items are offered in source order with an unbounded `put`, so a producer
/// facing a full buffer waits until a consumer frees space or the buffer is
/// closed. The stop flag is checked before each item is pulled.
///
/// With `close_on_complete` (the default) the producer closes the buffer
/// when it exits, whether it ran out of items, was stopped, or failed.
/// Disable it when several producers share one buffer and the caller closes
/// it after all of them finish.
///
/// # Example
///
/// ```
/// use conveyor_buffer::{BoundedBuffer, Source};
/// use conveyor_worker::Producer;
///
/// let buffer = BoundedBuffer::new(8).unwrap();
/// let mut producer = Producer::new(Source::new(0..5), buffer.clone());
/// producer.start().unwrap();
/// assert!(producer.join(None));
///
/// let items: Vec<i32> = buffer.iter().collect();
/// assert_eq!(items, vec![0, 1, 2, 3, 4]);
/// ```
pub struct Producer<T> {
    worker: Worker,
    buffer: BoundedBuffer<T>,
    source: Option<Source<T>>,
    close_on_complete: bool,
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("worker", &self.worker)
            .field("buffer", &self.buffer)
            .field("close_on_complete", &self.close_on_complete)
            .finish()
    }
}

impl<T: Send + 'static> Producer<T> {
    /// Creates a producer for `source` writing into `buffer`.
    pub fn new(source: Source<T>, buffer: BoundedBuffer<T>) -> Self {
        Producer {
            worker: Worker::new(DEFAULT_PRODUCER_NAME),
            buffer,
            source: Some(source),
            close_on_complete: true,
        }
    }

    /// Sets the worker name, used for the thread name and log records.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.worker.set_name(name);
        self
    }

    /// Sets whether the buffer is closed when the producer exits.
    pub fn close_on_complete(mut self, enabled: bool) -> Self {
        self.close_on_complete = enabled;
        self
    }

    /// Spawns the producer thread.
    pub fn start(&mut self) -> Result<()> {
        let source = self
            .source
            .take()
            .ok_or_else(|| WorkerError::AlreadyStarted(self.worker.name().to_string()))?;
        let buffer = self.buffer.clone();
        let close_on_complete = self.close_on_complete;
        let name = self.worker.name().to_string();

        let result = self
            .worker
            .spawn(move |stop| produce(name, source, buffer, close_on_complete, stop));
        if let Err(WorkerError::Spawn { .. }) = &result {
            // Nothing ran, so the finalizer never fired.
            if self.close_on_complete {
                self.buffer.close();
            }
        }
        result
    }
}

impl<T> Producer<T> {
    /// Requests termination at the next per-item checkpoint.
    ///
    /// A producer blocked in `put` observes the request only after that put
    /// completes or the buffer is closed.
    pub fn stop(&self) {
        self.worker.stop();
    }

    /// Returns a clone of the stop flag, for stopping from another thread.
    pub fn stop_flag(&self) -> StopFlag {
        self.worker.stop_flag()
    }

    /// Waits for the producer to terminate.
    ///
    /// Returns true if it terminated within `timeout` (`None` waits
    /// indefinitely). Returns false immediately if it was never started.
    pub fn join(&mut self, timeout: Option<Duration>) -> bool {
        self.worker.join(timeout)
    }

    /// Returns the worker name.
    pub fn name(&self) -> &str {
        self.worker.name()
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.worker.state()
    }

    /// Returns true once the producer thread has exited.
    pub fn is_finished(&self) -> bool {
        self.state() == WorkerState::Terminated
    }

    /// Returns the outcome collected by a successful [`join`](Producer::join).
    pub fn outcome(&self) -> Option<&Result<WorkerReport>> {
        self.worker.outcome()
    }

    /// Consumes the producer, returning its outcome if it was joined.
    pub fn into_outcome(self) -> Option<Result<WorkerReport>> {
        self.worker.into_outcome()
    }
}

/// Closes the buffer on drop, covering every exit path including unwinding.
struct CloseOnExit<'a, T>(Option<&'a BoundedBuffer<T>>);

impl<T> Drop for CloseOnExit<'_, T> {
    fn drop(&mut self) {
        if let Some(buffer) = self.0 {
            buffer.close();
        }
    }
}

fn produce<T>(
    name: String,
    mut source: Source<T>,
    buffer: BoundedBuffer<T>,
    close_on_complete: bool,
    stop: StopFlag,
) -> Result<WorkerReport> {
    let _close = CloseOnExit(close_on_complete.then_some(&buffer));
    let mut produced = 0;

    let exit = loop {
        if stop.is_stopped() {
            break ExitReason::Stopped;
        }
        let Some(item) = source.next() else {
            break ExitReason::SourceExhausted;
        };
        match buffer.put(item, None) {
            Ok(()) => produced += 1,
            // An unbounded put only fails once the buffer is closed.
            Err(_) => {
                tracing::debug!(worker = %name, produced, "buffer closed under producer");
                break ExitReason::BufferClosed;
            }
        }
    };

    Ok(WorkerReport {
        name,
        items: produced,
        exit,
    })
}
