use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::utils::error::{HyperUnetError, Result};

pub struct MemoryTracker {
    maximum: u64,
    current: AtomicU64,
}

// Updates go through a single atomic so a shared reference is enough

impl MemoryTracker {
    pub fn new(maximum: u64) -> Self {
        Self {
            maximum,
            current: AtomicU64::new(0),
        }
    }

    pub fn allocate(&self, size: u64) -> Result<()> {
        self.current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| {
                prev.checked_add(size).filter(|new| *new <= self.maximum)
            })
            .map(|_| ())
            .map_err(|prev| {
                HyperUnetError::Device(format!(
                    "Memory limit exceeded: tried to allocate {} bytes when {} of {} bytes are used",
                    size, prev, self.maximum
                ))
            })
    }

    pub fn deallocate(&self, size: u64) {
        self.current.fetch_sub(size, Ordering::AcqRel);
    }

    pub fn get_current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    pub fn get_available(&self) -> u64 {
        self.maximum.saturating_sub(self.get_current())
    }

    pub fn get_maximum(&self) -> u64 {
        self.maximum
    }
}

/// Bytes held against a tracker until dropped.
pub struct MemoryReservation {
    tracker: Arc<MemoryTracker>,
    size: u64,
}

impl MemoryReservation {
    pub fn new(tracker: Arc<MemoryTracker>, size: u64) -> Result<Self> {
        tracker.allocate(size)?;
        Ok(Self { tracker, size })
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for MemoryReservation {
    fn drop(&mut self) {
        self.tracker.deallocate(self.size);
    }
}
