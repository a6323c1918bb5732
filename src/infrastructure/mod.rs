//! Adapters for the printer and payment ports.

pub mod console;
pub mod device_file;
pub mod in_memory;
