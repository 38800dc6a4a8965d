//! Orchestration of many producers and consumers over one buffer.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use conveyor_buffer::{BoundedBuffer, BufferError, Destination, Source};

use crate::consumer::{Consumer, DEFAULT_POLL_INTERVAL, MAX_POLL_INTERVAL, Transform};
use crate::error::{BoxError, Result, WorkerError};
use crate::producer::Producer;
use crate::stop::StopFlag;
use crate::worker::WorkerReport;

/// Builder for a fan-in/fan-out run over a single [`BoundedBuffer`].
///
/// Every source gets its own producer; all producers share the buffer and
/// never close it themselves. Consumers share the buffer, the destination
/// and the optional transform. The pipeline closes the buffer exactly once,
/// after every producer has finished, so consumers drain everything and then
/// terminate.
///
/// # Example
///
/// ```
/// use conveyor_buffer::Source;
/// use conveyor_worker::Pipeline;
///
/// let report = Pipeline::new(2)
///     .unwrap()
///     .source(Source::new(0..5))
///     .source(Source::new(5..10))
///     .consumers(3)
///     .run()
///     .unwrap();
///
/// let mut items = report.items.clone();
/// items.sort();
/// assert_eq!(items, (0..10).collect::<Vec<_>>());
/// assert!(report.is_success());
/// ```
pub struct Pipeline<T> {
    buffer: BoundedBuffer<T>,
    destination: Destination<T>,
    sources: Vec<Source<T>>,
    consumers: usize,
    transform: Option<Transform<T>>,
    poll_interval: Duration,
}

impl<T> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("buffer", &self.buffer)
            .field("sources", &self.sources.len())
            .field("consumers", &self.consumers)
            .field("transform", &self.transform.is_some())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl<T: Send + 'static> Pipeline<T> {
    /// Creates a pipeline over a fresh buffer of `capacity` with one consumer.
    pub fn new(capacity: usize) -> std::result::Result<Self, BufferError> {
        Ok(Self::with_buffer(BoundedBuffer::new(capacity)?, Destination::new()))
    }

    /// Creates a pipeline over an existing buffer and destination.
    pub fn with_buffer(buffer: BoundedBuffer<T>, destination: Destination<T>) -> Self {
        Pipeline {
            buffer,
            destination,
            sources: Vec::new(),
            consumers: 1,
            transform: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Adds a source, served by its own producer.
    pub fn source(mut self, source: Source<T>) -> Self {
        self.sources.push(source);
        self
    }

    /// Sets the number of consumers.
    pub fn consumers(mut self, count: usize) -> Self {
        self.consumers = count;
        self
    }

    /// Sets the consumer polling interval, clamped to [`MAX_POLL_INTERVAL`].
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.min(MAX_POLL_INTERVAL);
        self
    }

    /// Applies `f` to every item in every consumer.
    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(move |item: T| -> std::result::Result<T, BoxError> {
            Ok(f(item))
        }));
        self
    }

    /// Applies a fallible `f` to every item in every consumer.
    ///
    /// A failure stops only the consumer that hit it.
    pub fn try_transform<F, E>(mut self, f: F) -> Self
    where
        F: Fn(T) -> std::result::Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.transform = Some(Arc::new(move |item: T| -> std::result::Result<T, BoxError> {
            f(item).map_err(Into::into)
        }));
        self
    }

    /// Returns the shared buffer.
    pub fn buffer(&self) -> &BoundedBuffer<T> {
        &self.buffer
    }

    /// Returns the shared destination.
    pub fn destination(&self) -> &Destination<T> {
        &self.destination
    }

    /// Starts every consumer, then every producer.
    ///
    /// If any worker fails to spawn, the ones already running are stopped
    /// and joined before the error is returned.
    pub fn start(self) -> Result<RunningPipeline<T>> {
        if self.sources.is_empty() {
            return Err(WorkerError::InvalidConfig(
                "pipeline needs at least one source".into(),
            ));
        }
        if self.consumers == 0 {
            return Err(WorkerError::InvalidConfig(
                "pipeline needs at least one consumer".into(),
            ));
        }

        let mut running = RunningPipeline {
            buffer: self.buffer,
            destination: self.destination,
            producers: Vec::with_capacity(self.sources.len()),
            consumers: Vec::with_capacity(self.consumers),
            poll_interval: self.poll_interval,
        };

        for i in 0..self.consumers {
            let mut consumer = Consumer::new(running.buffer.clone(), running.destination.clone())
                .with_name(format!("consumer-{i}"))
                .poll_interval(self.poll_interval);
            if let Some(transform) = &self.transform {
                consumer = consumer.with_transform(Arc::clone(transform));
            }
            if let Err(err) = consumer.start() {
                running.abort();
                return Err(err);
            }
            running.consumers.push(consumer);
        }

        for (i, source) in self.sources.into_iter().enumerate() {
            let mut producer = Producer::new(source, running.buffer.clone())
                .with_name(format!("producer-{i}"))
                .close_on_complete(false);
            if let Err(err) = producer.start() {
                running.abort();
                return Err(err);
            }
            running.producers.push(producer);
        }

        tracing::debug!(
            producers = running.producers.len(),
            consumers = running.consumers.len(),
            capacity = running.buffer.capacity(),
            "pipeline started"
        );
        Ok(running)
    }
}

impl<T: Clone + Send + 'static> Pipeline<T> {
    /// Starts the pipeline and waits for it to finish.
    pub fn run(self) -> Result<PipelineReport<T>> {
        Ok(self.start()?.wait())
    }
}

/// A started pipeline. Obtain the results with [`wait`](RunningPipeline::wait).
pub struct RunningPipeline<T> {
    buffer: BoundedBuffer<T>,
    destination: Destination<T>,
    producers: Vec<Producer<T>>,
    consumers: Vec<Consumer<T>>,
    poll_interval: Duration,
}

impl<T> fmt::Debug for RunningPipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningPipeline")
            .field("buffer", &self.buffer)
            .field("producers", &self.producers)
            .field("consumers", &self.consumers)
            .finish()
    }
}

impl<T> RunningPipeline<T> {
    /// Returns the shared buffer.
    pub fn buffer(&self) -> &BoundedBuffer<T> {
        &self.buffer
    }

    /// Returns the shared destination.
    pub fn destination(&self) -> &Destination<T> {
        &self.destination
    }

    /// Stops every worker.
    ///
    /// The buffer is closed as well, so producers blocked on a full buffer
    /// wake up. Items still buffered are left undelivered.
    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    /// Returns a handle that stops this pipeline from another thread, for
    /// example while [`wait`](RunningPipeline::wait) is blocked.
    pub fn stop_handle(&self) -> StopHandle<T> {
        let flags = self
            .producers
            .iter()
            .map(Producer::stop_flag)
            .chain(self.consumers.iter().map(Consumer::stop_flag))
            .collect();
        StopHandle {
            flags: Arc::new(flags),
            buffer: self.buffer.clone(),
        }
    }

    fn abort(&mut self) {
        self.stop();
        for producer in &mut self.producers {
            producer.join(None);
        }
        for consumer in &mut self.consumers {
            consumer.join(None);
        }
    }

    fn consumers_finished(&self) -> bool {
        self.consumers.iter().all(|c| c.is_finished())
    }
}

impl<T: Clone> RunningPipeline<T> {
    /// Waits for all producers, closes the buffer, then waits for all
    /// consumers.
    ///
    /// If every consumer exits while producers are still pending, the
    /// buffer is closed early so those producers stop waiting for space.
    pub fn wait(mut self) -> PipelineReport<T> {
        let poll = Some(self.poll_interval);
        loop {
            let pending = self
                .producers
                .iter_mut()
                .map(|p| p.join(poll))
                .filter(|done| !done)
                .count();
            if pending == 0 {
                break;
            }
            if self.consumers_finished() && !self.buffer.is_closed() {
                tracing::warn!(
                    pending_producers = pending,
                    buffered = self.buffer.size(),
                    "all consumers exited before producers, closing buffer"
                );
                self.buffer.close();
            }
        }

        self.buffer.close();

        for consumer in &mut self.consumers {
            consumer.join(None);
        }

        // Every worker has been joined, so each one has an outcome.
        PipelineReport {
            items: self.destination.snapshot(),
            producers: self.producers.into_iter().filter_map(Producer::into_outcome).collect(),
            consumers: self.consumers.into_iter().filter_map(Consumer::into_outcome).collect(),
        }
    }
}

/// Cloneable stop request for a [`RunningPipeline`].
///
/// Raises the stop flag of every worker and closes the shared buffer.
pub struct StopHandle<T> {
    flags: Arc<Vec<StopFlag>>,
    buffer: BoundedBuffer<T>,
}

impl<T> Clone for StopHandle<T> {
    fn clone(&self) -> Self {
        StopHandle {
            flags: Arc::clone(&self.flags),
            buffer: self.buffer.clone(),
        }
    }
}

impl<T> fmt::Debug for StopHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopHandle")
            .field("workers", &self.flags.len())
            .field("buffer", &self.buffer)
            .finish()
    }
}

impl<T> StopHandle<T> {
    /// Stops every worker and closes the buffer. Safe to call repeatedly.
    pub fn stop(&self) {
        for flag in self.flags.iter() {
            flag.stop();
        }
        self.buffer.close();
    }

    /// Returns true once the pipeline buffer is closed.
    pub fn is_stopped(&self) -> bool {
        self.buffer.is_closed()
    }
}

/// Results of a finished pipeline.
#[derive(Debug)]
pub struct PipelineReport<T> {
    /// Destination contents after all workers terminated.
    pub items: Vec<T>,
    /// Outcome of each producer, in source order.
    pub producers: Vec<Result<WorkerReport>>,
    /// Outcome of each consumer.
    pub consumers: Vec<Result<WorkerReport>>,
}

impl<T> PipelineReport<T> {
    /// Total items put into the buffer by successful producers.
    pub fn produced(&self) -> usize {
        sum_items(&self.producers)
    }

    /// Total items appended by successful consumers.
    pub fn consumed(&self) -> usize {
        sum_items(&self.consumers)
    }

    /// Iterates over every worker failure.
    pub fn errors(&self) -> impl Iterator<Item = &WorkerError> {
        self.producers
            .iter()
            .chain(&self.consumers)
            .filter_map(|outcome| outcome.as_ref().err())
    }

    /// Returns true if no worker failed.
    pub fn is_success(&self) -> bool {
        self.errors().next().is_none()
    }
}

fn sum_items(outcomes: &[Result<WorkerReport>]) -> usize {
    outcomes
        .iter()
        .filter_map(|outcome| outcome.as_ref().ok())
        .map(|report| report.items)
        .sum()
}
