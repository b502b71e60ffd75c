pub mod device;
pub mod memory_tracker;
