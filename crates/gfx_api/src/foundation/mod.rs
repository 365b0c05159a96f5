//! Foundation module - small utilities shared by the rest of the crate
//!
//! - Logging initialization for binaries and tests

pub mod logging;
