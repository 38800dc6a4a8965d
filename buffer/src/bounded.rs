//! Fixed-capacity blocking buffer with half-close semantics.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::BufferError;

/// A thread-safe fixed-capacity FIFO buffer.
///
/// `BoundedBuffer<T>` blocks `put` while full and `get` while empty. After
/// [`close`](BoundedBuffer::close) no new items are accepted, but everything
/// already buffered can still be drained; `get` reports
/// [`BufferError::Closed`] only once the buffer is closed *and* empty.
///
/// All state lives behind a single mutex paired with one condition variable.
/// Every state change wakes all waiters, and each waiter re-checks its own
/// condition.
///
/// Cloning the handle shares the underlying buffer.
///
/// # Example
///
/// ```
/// use conveyor_buffer::{BoundedBuffer, BufferError};
/// use std::thread;
///
/// let buf = BoundedBuffer::<i32>::new(2).unwrap();
/// let producer_buf = buf.clone();
///
/// let producer = thread::spawn(move || {
///     for i in 0..5 {
///         producer_buf.put(i, None).unwrap();
///     }
///     producer_buf.close();
/// });
///
/// let mut items = Vec::new();
/// loop {
///     match buf.get(None) {
///         Ok(item) => items.push(item),
///         Err(BufferError::Closed) => break,
///         Err(e) => panic!("unexpected: {e}"),
///     }
/// }
///
/// producer.join().unwrap();
/// assert_eq!(items, vec![0, 1, 2, 3, 4]);
/// ```
pub struct BoundedBuffer<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    changed: Condvar,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> Clone for BoundedBuffer<T> {
    fn clone(&self) -> Self {
        BoundedBuffer {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for BoundedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("BoundedBuffer")
            .field("capacity", &self.inner.capacity)
            .field("len", &state.items.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl<T> BoundedBuffer<T> {
    /// Creates a new buffer holding at most `capacity` items.
    ///
    /// Returns [`BufferError::InvalidCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::InvalidCapacity(capacity));
        }

        Ok(BoundedBuffer {
            inner: Arc::new(Inner {
                capacity,
                state: Mutex::new(State {
                    items: VecDeque::new(),
                    closed: false,
                }),
                changed: Condvar::new(),
            }),
        })
    }

    /// Appends an item to the tail of the buffer.
    ///
    /// Blocks while the buffer is full. With `timeout` set, gives up with
    /// [`BufferError::TimedOut`] once that much time has passed since the
    /// call began; `None` waits indefinitely.
    ///
    /// Fails with [`BufferError::Closed`] if the buffer is closed on entry or
    /// becomes closed while waiting, regardless of free space. The item is
    /// dropped when `put` fails.
    pub fn put(&self, item: T, timeout: Option<Duration>) -> Result<(), BufferError> {
        let deadline = deadline_after(timeout);
        let mut state = self.inner.state.lock();

        if state.closed {
            return Err(BufferError::Closed);
        }

        while state.items.len() >= self.inner.capacity && !state.closed {
            self.wait(&mut state, deadline)?;
        }

        if state.closed {
            return Err(BufferError::Closed);
        }

        state.items.push_back(item);
        self.inner.changed.notify_all();
        Ok(())
    }

    /// Removes and returns the item at the head of the buffer.
    ///
    /// Blocks while the buffer is empty and open. Buffered items are always
    /// returned, even after close. Fails with [`BufferError::Closed`] only
    /// when the buffer is closed and empty, and with
    /// [`BufferError::TimedOut`] if `timeout` elapses first.
    pub fn get(&self, timeout: Option<Duration>) -> Result<T, BufferError> {
        let deadline = deadline_after(timeout);
        let mut state = self.inner.state.lock();

        while state.items.is_empty() && !state.closed {
            self.wait(&mut state, deadline)?;
        }

        // Empty here implies closed.
        let item = state.items.pop_front().ok_or(BufferError::Closed)?;
        self.inner.changed.notify_all();
        Ok(item)
    }

    /// Closes the buffer.
    ///
    /// New puts are rejected; buffered items remain available to `get`.
    /// Every blocked caller is woken. Calling `close` again has no effect.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        tracing::debug!(
            capacity = self.inner.capacity,
            buffered = state.items.len(),
            "buffer closed"
        );
        self.inner.changed.notify_all();
    }

    /// Returns true once [`close`](BoundedBuffer::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Returns the number of items currently buffered.
    pub fn size(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    /// Alias for [`size`](BoundedBuffer::size).
    pub fn len(&self) -> usize {
        self.size()
    }

    /// Returns true if no items are buffered.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns the fixed capacity.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Returns a blocking iterator that drains the buffer until it is
    /// closed and empty.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { buffer: self }
    }

    /// Waits for the next state change, or fails once `deadline` has passed.
    ///
    /// The deadline is fixed at call entry so unrelated wakeups never extend
    /// the total wait.
    fn wait(
        &self,
        state: &mut MutexGuard<'_, State<T>>,
        deadline: Option<Instant>,
    ) -> Result<(), BufferError> {
        match deadline {
            Some(deadline) => {
                if Instant::now() >= deadline {
                    return Err(BufferError::TimedOut);
                }
                let _ = self.inner.changed.wait_until(state, deadline);
            }
            None => self.inner.changed.wait(state),
        }
        Ok(())
    }
}

/// Converts a relative timeout into an absolute deadline.
///
/// Timeouts too large to represent are treated as "wait forever".
fn deadline_after(timeout: Option<Duration>) -> Option<Instant> {
    timeout.and_then(|t| Instant::now().checked_add(t))
}

/// Blocking draining iterator returned by [`BoundedBuffer::iter`].
pub struct Iter<'a, T> {
    buffer: &'a BoundedBuffer<T>,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.buffer.get(None).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn test_put_get_order_preserved() {
        let buf = BoundedBuffer::<i32>::new(3).unwrap();
        buf.put(1, None).unwrap();
        buf.put(2, None).unwrap();
        buf.put(3, None).unwrap();

        assert_eq!(buf.get(None).unwrap(), 1);
        assert_eq!(buf.get(None).unwrap(), 2);
        assert_eq!(buf.get(None).unwrap(), 3);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = BoundedBuffer::<i32>::new(0).unwrap_err();
        assert_eq!(err, BufferError::InvalidCapacity(0));
    }

    #[test]
    fn test_huge_capacity_allocates_lazily() {
        let buf = BoundedBuffer::<u8>::new(usize::MAX).unwrap();
        assert_eq!(buf.capacity(), usize::MAX);

        buf.put(1, None).unwrap();
        buf.put(2, Some(Duration::ZERO)).unwrap();
        assert_eq!(buf.get(None), Ok(1));
        assert_eq!(buf.get(None), Ok(2));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_capacity_and_len() {
        let buf = BoundedBuffer::<i32>::new(2).unwrap();
        assert_eq!(buf.capacity(), 2);
        assert!(buf.is_empty());

        buf.put(1, None).unwrap();
        buf.put(2, None).unwrap();
        assert_eq!(buf.size(), 2);
        assert_eq!(buf.len(), 2);
        assert!(!buf.is_empty());
    }

    #[test]
    fn test_put_times_out_when_full() {
        let buf = BoundedBuffer::<i32>::new(1).unwrap();
        buf.put(10, None).unwrap();

        let start = Instant::now();
        let err = buf.put(20, Some(Duration::from_millis(50))).unwrap_err();
        assert_eq!(err, BufferError::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(45));

        // The rejected item never entered the buffer.
        assert_eq!(buf.size(), 1);
        assert_eq!(buf.get(None).unwrap(), 10);
    }

    #[test]
    fn test_get_times_out_when_empty() {
        let buf = BoundedBuffer::<i32>::new(1).unwrap();

        let start = Instant::now();
        let err = buf.get(Some(Duration::from_millis(50))).unwrap_err();
        let elapsed = start.elapsed();

        assert_eq!(err, BufferError::TimedOut);
        assert!(elapsed >= Duration::from_millis(45), "returned too early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(1), "returned too late: {elapsed:?}");
    }

    #[test]
    fn test_wakeups_do_not_extend_timeout() {
        let buf = BoundedBuffer::<i32>::new(1).unwrap();
        let done = Arc::new(AtomicBool::new(false));

        let noise = {
            let buf = buf.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    buf.inner.changed.notify_all();
                }
            })
        };

        let start = Instant::now();
        let result = buf.get(Some(Duration::from_millis(50)));
        let elapsed = start.elapsed();
        done.store(true, Ordering::Release);
        noise.join().unwrap();

        assert_eq!(result, Err(BufferError::TimedOut));
        assert!(elapsed >= Duration::from_millis(45), "returned too early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(250), "returned too late: {elapsed:?}");
    }

    #[test]
    fn test_zero_timeout_does_not_block() {
        let buf = BoundedBuffer::<i32>::new(1).unwrap();
        assert_eq!(buf.get(Some(Duration::ZERO)), Err(BufferError::TimedOut));

        buf.put(1, Some(Duration::ZERO)).unwrap();
        assert_eq!(buf.put(2, Some(Duration::ZERO)), Err(BufferError::TimedOut));
        assert_eq!(buf.get(Some(Duration::ZERO)), Ok(1));
    }

    #[test]
    fn test_get_fails_after_close_and_empty() {
        let buf = BoundedBuffer::<i32>::new(1).unwrap();
        buf.close();
        assert_eq!(buf.get(Some(Duration::from_millis(50))), Err(BufferError::Closed));
        assert_eq!(buf.get(None), Err(BufferError::Closed));
    }

    #[test]
    fn test_put_fails_when_closed() {
        let buf = BoundedBuffer::<i32>::new(4).unwrap();
        buf.close();

        let start = Instant::now();
        assert_eq!(buf.put(1, Some(Duration::from_secs(5))), Err(BufferError::Closed));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(buf.size(), 0);
    }

    #[test]
    fn test_close_allows_drain() {
        let buf = BoundedBuffer::<i32>::new(3).unwrap();
        buf.put(1, None).unwrap();
        buf.put(2, None).unwrap();
        buf.close();

        assert!(buf.is_closed());
        assert_eq!(buf.get(None).unwrap(), 1);
        assert_eq!(buf.get(None).unwrap(), 2);
        assert_eq!(buf.get(None), Err(BufferError::Closed));
    }

    #[test]
    fn test_close_is_idempotent() {
        let buf = BoundedBuffer::<i32>::new(2).unwrap();
        buf.put(7, None).unwrap();
        buf.close();
        buf.close();

        assert!(buf.is_closed());
        assert_eq!(buf.size(), 1);
        assert_eq!(buf.get(None).unwrap(), 7);
    }

    #[test]
    fn test_blocking_put_waits_for_space() {
        let buf = BoundedBuffer::<i32>::new(1).unwrap();
        buf.put(1, None).unwrap();

        let reader_buf = buf.clone();
        let reader = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            reader_buf.get(None).unwrap()
        });

        let start = Instant::now();
        buf.put(2, None).unwrap();
        let elapsed = start.elapsed();

        assert_eq!(reader.join().unwrap(), 1);
        assert!(elapsed >= Duration::from_millis(40), "put returned after {elapsed:?}");
        assert_eq!(buf.get(None).unwrap(), 2);
    }

    #[test]
    fn test_close_wakes_blocked_get() {
        let buf = BoundedBuffer::<i32>::new(1).unwrap();
        let reader_buf = buf.clone();
        let reader = thread::spawn(move || reader_buf.get(None));

        thread::sleep(Duration::from_millis(30));
        buf.close();

        assert_eq!(reader.join().unwrap(), Err(BufferError::Closed));
    }

    #[test]
    fn test_close_wakes_blocked_put() {
        let buf = BoundedBuffer::<i32>::new(1).unwrap();
        buf.put(1, None).unwrap();

        let writer_buf = buf.clone();
        let writer = thread::spawn(move || writer_buf.put(2, None));

        thread::sleep(Duration::from_millis(30));
        buf.close();

        assert_eq!(writer.join().unwrap(), Err(BufferError::Closed));
        // The item buffered before close is still there.
        assert_eq!(buf.get(None).unwrap(), 1);
        assert_eq!(buf.get(None), Err(BufferError::Closed));
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        const CAPACITY: usize = 3;
        let buf = BoundedBuffer::<usize>::new(CAPACITY).unwrap();
        let done = Arc::new(AtomicBool::new(false));

        let monitor = {
            let buf = buf.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut max_seen = 0;
                while !done.load(Ordering::Acquire) {
                    max_seen = max_seen.max(buf.size());
                }
                max_seen
            })
        };

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let buf = buf.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        buf.put(p * 1000 + i, None).unwrap();
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let buf = buf.clone();
                thread::spawn(move || buf.iter().count())
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }
        buf.close();

        let total: usize = consumers.into_iter().map(|c| c.join().unwrap()).sum();
        done.store(true, Ordering::Release);

        assert_eq!(total, 800);
        assert!(monitor.join().unwrap() <= CAPACITY);
    }

    #[test]
    fn test_iter_drains_until_closed() {
        let buf = BoundedBuffer::<i32>::new(4).unwrap();
        buf.put(1, None).unwrap();
        buf.put(2, None).unwrap();
        buf.close();

        let items: Vec<_> = buf.iter().collect();
        assert_eq!(items, vec![1, 2]);
    }

    #[test]
    fn test_wrap_around() {
        let buf = BoundedBuffer::<i32>::new(3).unwrap();
        for i in 1..=3 {
            buf.put(i, None).unwrap();
        }

        assert_eq!(buf.get(None).unwrap(), 1);
        assert_eq!(buf.get(None).unwrap(), 2);

        buf.put(4, None).unwrap();
        buf.put(5, None).unwrap();

        assert_eq!(buf.get(None).unwrap(), 3);
        assert_eq!(buf.get(None).unwrap(), 4);
        assert_eq!(buf.get(None).unwrap(), 5);
    }

    #[test]
    fn test_debug_shows_state() {
        let buf = BoundedBuffer::<i32>::new(2).unwrap();
        buf.put(1, None).unwrap();
        let out = format!("{:?}", buf);
        assert!(out.contains("capacity: 2"));
        assert!(out.contains("len: 1"));
        assert!(out.contains("closed: false"));
    }
}
