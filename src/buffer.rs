//! Shared reading buffer between the sampler and the dispatcher.
//!
//! [`SharedBuffer`] is the only piece of state the two loops share. It exposes exactly
//! two operations, [`SharedBuffer::append`] and [`SharedBuffer::drain_all`], both of
//! which run inside the same mutex. The lock only covers moving a `Vec` in or out:
//! no sensor, storage or radio I/O ever happens while it is held.
//!
//! The buffer is cheap to clone; clones share the same underlying queue.

use crate::reading::Reading;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mutually exclusive append/drain queue of readings, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<Reading>>>,
}

impl SharedBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one sampler iteration's readings, preserving their order.
    pub fn append(&self, readings: Vec<Reading>) {
        if readings.is_empty() {
            return;
        }
        let mut guard = self.lock();
        if guard.is_empty() {
            // Hand the allocation over instead of copying into an empty vec.
            *guard = readings;
        } else {
            guard.extend(readings);
        }
    }

    /// Atomically take everything buffered so far, leaving the buffer empty.
    ///
    /// Never blocks beyond the other side's O(1) critical section, and returns an
    /// empty vector when nothing is buffered.
    pub fn drain_all(&self) -> Vec<Reading> {
        std::mem::take(&mut *self.lock())
    }

    /// Number of readings currently buffered.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave a half-appended Vec behind
    // (extend either completes or unwinds before publishing), so keep going.
    fn lock(&self) -> MutexGuard<'_, Vec<Reading>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
