//! Shared constants and small helpers used across the daemon.

pub mod constants;
pub mod utils;
