//! Producer and consumer worker threads over a bounded buffer.
//!
//! This crate drives a [`conveyor_buffer::BoundedBuffer`] from OS threads:
//!
//! - [`Producer<T>`]: Pulls items from a [`Source`] and puts them into the
//!   buffer, optionally closing it when done
//! - [`Consumer<T>`]: Takes items from the buffer, optionally transforms
//!   them, and appends them to a [`Destination`]
//! - [`Pipeline<T>`]: Wires N producers and M consumers onto one buffer and
//!   closes it exactly once after every producer has finished
//!
//! ## Lifecycle
//!
//! Every worker moves through [`WorkerState::Created`],
//! [`WorkerState::Running`] and [`WorkerState::Terminated`]. Stopping is
//! cooperative: [`Producer::stop`] is observed before the next item is
//! pulled, [`Consumer::stop`] within one polling interval. `join` takes an
//! optional timeout and reports whether the worker terminated in time; the
//! worker's [`WorkerReport`] (or [`WorkerError`]) is then available from
//! `outcome()`.
//!
//! ## Example
//!
//! ```
//! use conveyor_buffer::{BoundedBuffer, Destination, Source};
//! use conveyor_worker::{Consumer, Producer};
//!
//! let buffer = BoundedBuffer::new(2).unwrap();
//! let destination = Destination::new();
//!
//! let mut producer = Producer::new(Source::new(vec![1, 2, 3]), buffer.clone());
//! let mut consumer = Consumer::new(buffer, destination.clone()).transform(|x| x * 2);
//!
//! consumer.start().unwrap();
//! producer.start().unwrap();
//!
//! assert!(producer.join(None));
//! assert!(consumer.join(None));
//! assert_eq!(destination.snapshot(), vec![2, 4, 6]);
//! ```
//!
//! [`Source`]: conveyor_buffer::Source
//! [`Destination`]: conveyor_buffer::Destination

mod consumer;
mod error;
mod pipeline;
mod producer;
mod stop;
mod worker;

pub use consumer::{
    Consumer, DEFAULT_CONSUMER_NAME, DEFAULT_POLL_INTERVAL, MAX_POLL_INTERVAL, Transform,
};
pub use error::{BoxError, Result, WorkerError};
pub use pipeline::{Pipeline, PipelineReport, RunningPipeline, StopHandle};
pub use producer::{DEFAULT_PRODUCER_NAME, Producer};
pub use stop::StopFlag;
pub use worker::{ExitReason, WorkerReport, WorkerState};
