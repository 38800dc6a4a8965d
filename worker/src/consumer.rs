//! Consumer worker: drains a buffer into a destination.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use conveyor_buffer::{BoundedBuffer, BufferError, Destination};

use crate::error::{BoxError, Result, WorkerError};
use crate::stop::StopFlag;
use crate::worker::{ExitReason, Worker, WorkerReport, WorkerState};

/// Default consumer name.
pub const DEFAULT_CONSUMER_NAME: &str = "consumer";

/// Default wait per `get` before the stop flag is re-checked.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Longest accepted polling interval; longer values are clamped to it.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Per-item transform applied by consumers before appending.
pub type Transform<T> = Arc<dyn Fn(T) -> std::result::Result<T, BoxError> + Send + Sync>;

/// A worker thread that moves items from a [`BoundedBuffer`] into a
/// [`Destination`].
///
/// Each iteration checks the stop flag, then waits up to the polling
/// interval for an item. A timed-out wait just loops, so a stop request is
/// honoured within one polling interval even when no data arrives. The
/// consumer exits once the buffer is closed and drained.
///
/// # Example
///
/// ```
/// use conveyor_buffer::{BoundedBuffer, Destination};
/// use conveyor_worker::Consumer;
///
/// let buffer = BoundedBuffer::new(4).unwrap();
/// let destination = Destination::new();
/// for i in 1..=3 {
///     buffer.put(i, None).unwrap();
/// }
/// buffer.close();
///
/// let mut consumer = Consumer::new(buffer, destination.clone()).transform(|x| x * 10);
/// consumer.start().unwrap();
/// assert!(consumer.join(None));
/// assert_eq!(destination.snapshot(), vec![10, 20, 30]);
/// ```
pub struct Consumer<T> {
    worker: Worker,
    buffer: BoundedBuffer<T>,
    destination: Destination<T>,
    transform: Option<Transform<T>>,
    poll_interval: Duration,
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("worker", &self.worker)
            .field("buffer", &self.buffer)
            .field("transform", &self.transform.is_some())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl<T: Send + 'static> Consumer<T> {
    /// Creates a consumer reading from `buffer` and appending to `destination`.
    pub fn new(buffer: BoundedBuffer<T>, destination: Destination<T>) -> Self {
        Consumer {
            worker: Worker::new(DEFAULT_CONSUMER_NAME),
            buffer,
            destination,
            transform: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the worker name, used for the thread name and log records.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.worker.set_name(name);
        self
    }

    /// Sets how long each `get` waits before the stop flag is checked again.
    ///
    /// Clamped to [`MAX_POLL_INTERVAL`], which bounds stop latency.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.min(MAX_POLL_INTERVAL);
        self
    }

    /// Applies `f` to every item before it is appended.
    pub fn transform<F>(self, f: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        self.with_transform(Arc::new(move |item: T| -> std::result::Result<T, BoxError> {
            Ok(f(item))
        }))
    }

    /// Applies a fallible `f` to every item before it is appended.
    ///
    /// The first error stops this consumer: the failing item is discarded
    /// and the error becomes the worker's outcome. Other consumers on the
    /// same buffer are unaffected.
    pub fn try_transform<F, E>(self, f: F) -> Self
    where
        F: Fn(T) -> std::result::Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.with_transform(Arc::new(move |item: T| -> std::result::Result<T, BoxError> {
            f(item).map_err(Into::into)
        }))
    }

    /// Installs a prepared transform, which may be shared between consumers.
    pub fn with_transform(mut self, transform: Transform<T>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Spawns the consumer thread.
    pub fn start(&mut self) -> Result<()> {
        let name = self.worker.name().to_string();
        let buffer = self.buffer.clone();
        let destination = self.destination.clone();
        let transform = self.transform.clone();
        let poll_interval = self.poll_interval;

        self.worker.spawn(move |stop| {
            consume(name, buffer, destination, transform, poll_interval, stop)
        })
    }
}

impl<T> Consumer<T> {
    /// Requests termination; honoured within one polling interval.
    pub fn stop(&self) {
        self.worker.stop();
    }

    /// Returns a clone of the stop flag, for stopping from another thread.
    pub fn stop_flag(&self) -> StopFlag {
        self.worker.stop_flag()
    }

    /// Waits for the consumer to terminate.
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

    /// Returns true once the consumer thread has exited.
    pub fn is_finished(&self) -> bool {
        self.state() == WorkerState::Terminated
    }

    /// Returns the outcome collected by a successful [`join`](Consumer::join).
    pub fn outcome(&self) -> Option<&Result<WorkerReport>> {
        self.worker.outcome()
    }

    /// Consumes the consumer, returning its outcome if it was joined.
    pub fn into_outcome(self) -> Option<Result<WorkerReport>> {
        self.worker.into_outcome()
    }
}

fn consume<T>(
    name: String,
    buffer: BoundedBuffer<T>,
    destination: Destination<T>,
    transform: Option<Transform<T>>,
    poll_interval: Duration,
    stop: StopFlag,
) -> Result<WorkerReport> {
    let mut consumed = 0;

    let exit = loop {
        if stop.is_stopped() {
            break ExitReason::Stopped;
        }

        let item = match buffer.get(Some(poll_interval)) {
            Ok(item) => item,
            Err(BufferError::TimedOut) => continue,
            Err(_) => break ExitReason::BufferClosed,
        };

        let item = match &transform {
            Some(transform) => match transform(item) {
                Ok(item) => item,
                Err(source) => {
                    tracing::warn!(
                        worker = %name,
                        error = %source,
                        consumed,
                        "transform failed, stopping consumer"
                    );
                    return Err(WorkerError::Transform { name, source });
                }
            },
            None => item,
        };

        destination.add(item);
        consumed += 1;
    };

    Ok(WorkerReport {
        name,
        items: consumed,
        exit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    fn filled(items: &[i32]) -> BoundedBuffer<i32> {
        let buffer = BoundedBuffer::new(items.len().max(1)).unwrap();
        for &item in items {
            buffer.put(item, None).unwrap();
        }
        buffer
    }

    #[test]
    fn test_drains_closed_buffer() {
        let buffer = filled(&[1, 2, 3]);
        buffer.close();
        let destination = Destination::new();

        let mut consumer = Consumer::new(buffer, destination.clone()).with_name("c");
        consumer.start().unwrap();

        assert!(consumer.join(Some(Duration::from_secs(1))));
        assert_eq!(destination.snapshot(), vec![1, 2, 3]);
        let report = consumer.outcome().unwrap().as_ref().unwrap();
        assert_eq!(report.name, "c");
        assert_eq!(report.items, 3);
        assert_eq!(report.exit, ExitReason::BufferClosed);
    }

    #[test]
    fn test_transform_applied() {
        let buffer = filled(&[1, 2, 3]);
        buffer.close();
        let destination = Destination::new();

        let mut consumer = Consumer::new(buffer, destination.clone()).transform(|x| x * 2);
        consumer.start().unwrap();

        assert!(consumer.join(Some(Duration::from_secs(1))));
        assert_eq!(destination.snapshot(), vec![2, 4, 6]);
    }

    #[test]
    fn test_stop_while_waiting_on_empty_buffer() {
        let buffer = BoundedBuffer::<i32>::new(1).unwrap();
        let destination = Destination::new();

        let mut consumer = Consumer::new(buffer.clone(), destination.clone())
            .poll_interval(Duration::from_millis(100));
        consumer.start().unwrap();

        thread::sleep(Duration::from_millis(30));
        let stopped_at = Instant::now();
        consumer.stop();

        assert!(consumer.join(Some(Duration::from_secs(1))));
        assert!(stopped_at.elapsed() < Duration::from_millis(300));
        assert!(destination.is_empty());
        assert!(!buffer.is_closed());
        let report = consumer.outcome().unwrap().as_ref().unwrap();
        assert_eq!(report.exit, ExitReason::Stopped);
        assert_eq!(report.items, 0);
    }

    #[test]
    fn test_huge_poll_interval_still_stops() {
        let buffer = BoundedBuffer::<i32>::new(1).unwrap();
        let mut consumer =
            Consumer::new(buffer, Destination::new()).poll_interval(Duration::MAX);
        assert_eq!(consumer.poll_interval, MAX_POLL_INTERVAL);
        consumer.start().unwrap();

        thread::sleep(Duration::from_millis(20));
        consumer.stop();

        assert!(consumer.join(Some(MAX_POLL_INTERVAL * 3)));
        let report = consumer.outcome().unwrap().as_ref().unwrap();
        assert_eq!(report.exit, ExitReason::Stopped);
    }

    #[test]
    fn test_waits_for_late_items() {
        let buffer = BoundedBuffer::new(2).unwrap();
        let destination = Destination::new();

        let mut consumer = Consumer::new(buffer.clone(), destination.clone())
            .poll_interval(Duration::from_millis(10));
        consumer.start().unwrap();

        // Several poll intervals pass with nothing to read.
        thread::sleep(Duration::from_millis(50));
        buffer.put("late", None).unwrap();
        buffer.close();

        assert!(consumer.join(Some(Duration::from_secs(1))));
        assert_eq!(destination.snapshot(), vec!["late"]);
    }

    #[test]
    fn test_transform_failure_stops_only_this_consumer() {
        let buffer = filled(&[1, 2, 3, 4]);
        buffer.close();
        let destination = Destination::new();

        let mut consumer = Consumer::new(buffer.clone(), destination.clone())
            .with_name("picky")
            .try_transform(|x| if x == 3 { Err(format!("rejected {x}")) } else { Ok(x) });
        consumer.start().unwrap();

        assert!(consumer.join(Some(Duration::from_secs(1))));
        assert_eq!(destination.snapshot(), vec![1, 2]);
        match consumer.outcome() {
            Some(Err(WorkerError::Transform { name, source })) => {
                assert_eq!(name, "picky");
                assert_eq!(source.to_string(), "rejected 3");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        // The remaining item is still available to others.
        assert_eq!(buffer.get(None), Ok(4));
    }

    #[test]
    fn test_shared_transform() {
        let transform: Transform<i32> =
            Arc::new(|x: i32| -> std::result::Result<i32, BoxError> { Ok(x + 1) });
        let buffer = filled(&[1, 2]);
        buffer.close();
        let destination = Destination::new();

        let mut consumer =
            Consumer::new(buffer, destination.clone()).with_transform(Arc::clone(&transform));
        consumer.start().unwrap();

        assert!(consumer.join(None));
        assert_eq!(destination.snapshot(), vec![2, 3]);
    }
}
