//! Error types for buffer operations.

/// Buffer operation error.
///
/// `TimedOut` and `Closed` are expected outcomes of blocking calls rather
/// than faults: callers decide whether to retry (`TimedOut`) or wind down
/// (`Closed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// Buffer was constructed with a zero capacity.
    #[error("buffer: capacity must be positive, got {0}")]
    InvalidCapacity(usize),

    /// The wait deadline passed before the operation could proceed.
    #[error("buffer: timed out")]
    TimedOut,

    /// The buffer is closed: no more puts, or closed and fully drained.
    #[error("buffer: closed")]
    Closed,
}

impl BufferError {
    /// Returns true for [`BufferError::TimedOut`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, BufferError::TimedOut)
    }

    /// Returns true for [`BufferError::Closed`].
    pub fn is_closed(&self) -> bool {
        matches!(self, BufferError::Closed)
    }
}
