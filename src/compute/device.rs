use std::sync::Arc;

use tracing::debug;

use crate::compute::memory_tracker::{MemoryReservation, MemoryTracker};
use crate::utils::error::{HyperUnetError, Result};

// Share of physical memory a CPU device budgets for activations
const CPU_MEMORY_FRACTION: f64 = 0.6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceId {
    CPU,
}

/// Compute-device handle. Only host execution exists; the handle carries the
/// memory budget forward calls reserve against.
#[derive(Clone)]
pub struct Device {
    id: DeviceId,
    memory_tracking: Arc<MemoryTracker>,
}

impl Device {
    /// Host device budgeted at a fraction of total system memory.
    pub fn cpu() -> Result<Self> {
        let info = sys_info::mem_info()
            .map_err(|e| HyperUnetError::Device(format!("Failed to query system memory: {}", e)))?;
        let total_bytes = info.total * 1024;
        let limit = (total_bytes as f64 * CPU_MEMORY_FRACTION) as u64;

        debug!(total_bytes, limit, "CPU device memory budget");
        Ok(Self::cpu_with_limit(Some(limit)))
    }

    /// Host device with an explicit budget, or none at all.
    pub fn cpu_with_limit(limit_bytes: Option<u64>) -> Self {
        Self {
            id: DeviceId::CPU,
            memory_tracking: Arc::new(MemoryTracker::new(limit_bytes.unwrap_or(u64::MAX))),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn memory_tracker(&self) -> &MemoryTracker {
        &self.memory_tracking
    }

    pub fn reserve(&self, bytes: u64) -> Result<MemoryReservation> {
        MemoryReservation::new(self.memory_tracking.clone(), bytes)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("used", &self.memory_tracking.get_current())
            .field("maximum", &self.memory_tracking.get_maximum())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_device_accepts_large_reservations() {
        let device = Device::cpu_with_limit(None);
        let r = device.reserve(1 << 40).unwrap();
        assert_eq!(device.memory_tracker().get_current(), 1 << 40);
        drop(r);
        assert_eq!(device.memory_tracker().get_current(), 0);
    }

    #[test]
    fn clones_share_one_budget() {
        let device = Device::cpu_with_limit(Some(100));
        let other = device.clone();
        let _held = device.reserve(80).unwrap();
        assert!(other.reserve(30).is_err());
        assert_eq!(other.id(), DeviceId::CPU);
    }

    #[test]
    fn system_budget_is_positive() {
        let device = Device::cpu().unwrap();
        assert!(device.memory_tracker().get_maximum() > 0);
    }
}
