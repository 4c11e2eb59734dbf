//! # mirra-viewer: screen mirroring client
//!
//! Connects to a device through adb (or an already forwarded socket),
//! runs a `mirra-core` session and reports what it sees: the device
//! identity on connect, and every changed frame as a log line and
//! optionally a PPM snapshot on disk.

pub mod config;
pub mod snapshot;
