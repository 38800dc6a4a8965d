//! Thread-safe bounded buffer for producer/consumer hand-off.
//!
//! This crate provides the shared data structures of a producer/consumer
//! pipeline:
//!
//! - [`BoundedBuffer<T>`]: A fixed-capacity FIFO that blocks writers when
//!   full and readers when empty, with optional timeouts
//! - [`Source<T>`]: An owned, lazily consumed sequence of items to produce
//! - [`Destination<T>`]: An append-only sink that consumers write into
//!
//! # Closing
//!
//! [`BoundedBuffer::close`] is a half-close: it rejects further puts but
//! lets readers drain what is already buffered. Once the buffer is closed
//! and empty, `get` fails with [`BufferError::Closed`], which is the normal
//! end-of-stream signal rather than a fault.
//!
//! ```
//! use conveyor_buffer::{BoundedBuffer, BufferError};
//!
//! let buf = BoundedBuffer::new(3).unwrap();
//! buf.put("a", None).unwrap();
//! buf.put("b", None).unwrap();
//! buf.close();
//!
//! assert_eq!(buf.put("c", None), Err(BufferError::Closed));
//! assert_eq!(buf.get(None), Ok("a"));
//! assert_eq!(buf.get(None), Ok("b"));
//! assert_eq!(buf.get(None), Err(BufferError::Closed));
//! ```
//!
//! # Timeouts
//!
//! Both `put` and `get` take an optional timeout measured from the call.
//! `None` waits indefinitely.
//!
//! ```
//! use conveyor_buffer::{BoundedBuffer, BufferError};
//! use std::time::Duration;
//!
//! let buf = BoundedBuffer::<u32>::new(1).unwrap();
//! let err = buf.get(Some(Duration::from_millis(10))).unwrap_err();
//! assert_eq!(err, BufferError::TimedOut);
//! ```
//!
//! # Thread Safety
//!
//! All types are `Send + Sync` for `T: Send` and are shared between threads
//! by cloning the handle (which shares the underlying storage via `Arc`).

mod bounded;
mod container;
mod error;

pub use bounded::{BoundedBuffer, Iter};
pub use container::{Destination, Source};
pub use error::BufferError;
