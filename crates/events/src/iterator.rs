//! Forward-only event cursor.

use esdoc_core::{StoreError, StoreResult};

use crate::Event;

/// Single-pass cursor over a read result.
///
/// Starts positioned *before* the first event: call `advance` first.
/// Not restartable; `release` drops the buffered result set and every later
/// `advance` returns `false`.
pub trait EventIterator: Send {
    /// Move to the next event. `false` once exhausted.
    fn advance(&mut self) -> bool;

    /// Decode the event at the current position.
    fn current(&self) -> StoreResult<Event>;

    fn release(&mut self);

    /// Consume the cursor as a standard `Iterator`.
    fn into_events(self) -> Events<Self>
    where
        Self: Sized,
    {
        Events::new(self)
    }
}

impl<I: EventIterator + ?Sized> EventIterator for Box<I> {
    fn advance(&mut self) -> bool {
        (**self).advance()
    }

    fn current(&self) -> StoreResult<Event> {
        (**self).current()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// `Iterator` view over an `EventIterator`; releases the cursor when exhausted.
pub struct Events<I: EventIterator> {
    inner: I,
    done: bool,
}

impl<I: EventIterator> Events<I> {
    pub fn new(inner: I) -> Self {
        Self { inner, done: false }
    }
}

impl<I: EventIterator> Iterator for Events<I> {
    type Item = StoreResult<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.inner.advance() {
            Some(self.inner.current())
        } else {
            self.inner.release();
            self.done = true;
            None
        }
    }
}

/// Cursor over already-decoded events.
#[derive(Debug, Default)]
pub struct BufferedEvents {
    events: Vec<Event>,
    position: Option<usize>,
}

impl BufferedEvents {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events,
            position: None,
        }
    }
}

impl EventIterator for BufferedEvents {
    fn advance(&mut self) -> bool {
        let next = self.position.map_or(0, |p| p + 1);
        if next < self.events.len() {
            self.position = Some(next);
            true
        } else {
            self.position = Some(self.events.len());
            false
        }
    }

    fn current(&self) -> StoreResult<Event> {
        self.position
            .and_then(|p| self.events.get(p))
            .cloned()
            .ok_or_else(|| StoreError::not_found("iterator is not positioned on an event"))
    }

    fn release(&mut self) {
        self.events = Vec::new();
        self.position = None;
    }
}
