//! Item sources and result destinations.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// An ordered, possibly infinite sequence of items for a producer.
///
/// A source is consumed lazily and exactly once: whoever owns it pulls from
/// it, so handing a `Source` to a producer transfers the whole sequence.
pub struct Source<T> {
    items: Box<dyn Iterator<Item = T> + Send>,
}

impl<T> Source<T> {
    /// Creates a source from anything iterable.
    pub fn new<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Source {
            items: Box::new(items.into_iter()),
        }
    }
}

impl<T> Iterator for Source<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.items.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl<T: Send + 'static> From<Vec<T>> for Source<T> {
    fn from(items: Vec<T>) -> Self {
        Source::new(items)
    }
}

impl<T> fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("size_hint", &self.items.size_hint())
            .finish()
    }
}

/// An append-only collection shared by consumers.
///
/// Appends from any number of threads are serialized; [`snapshot`] returns a
/// copy that reflects only completed appends. Cloning the handle shares the
/// underlying storage.
///
/// [`snapshot`]: Destination::snapshot
pub struct Destination<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for Destination<T> {
    fn clone(&self) -> Self {
        Destination {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> Default for Destination<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Destination<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("len", &self.len())
            .finish()
    }
}

impl<T> Destination<T> {
    /// Creates an empty destination.
    pub fn new() -> Self {
        Destination {
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Appends an item.
    pub fn add(&self, item: T) {
        self.items.lock().push(item);
    }

    /// Returns the number of items appended so far.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns true if nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Destination<T> {
    /// Returns a copy of the items appended so far, in append order.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.lock().clone()
    }
}
