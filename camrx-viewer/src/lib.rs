//! # camrx-viewer: camera stream consumer
//!
//! Listens for the camrx UDP stream, keeps the latest frame and camera pose,
//! and hands them to local sinks at a fixed cadence: frames to a file on
//! disk, poses to the log. `--demo` feeds a loopback test pattern.

pub mod config;
pub mod demo;
pub mod sinks;
