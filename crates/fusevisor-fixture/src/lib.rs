//! Fixtures for filesystem tests.
//!
//! Backing devices are sparse files, so a "1 GiB" device costs nothing
//! until the filesystem writes to it.

pub mod device;
pub mod timestamp;

pub use device::{device_1g, format_1g, mountpoint, sparse_file, DEVICE_1G_SIZE};
pub use timestamp::{Timestamp, TimestampRange, SETTLE_DELAY};
