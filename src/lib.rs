//! # hyprsunset library
//!
//! Internal library for the hyprsunset daemon binary.
//!
//! This library exists to enable testing of the daemon internals and to keep
//! CLI dispatch (main.rs) separate from application logic.
//!
//! ## Architecture
//!
//! - **Entry Point**: [`Hyprsunset`] acquires resources and runs the daemon
//! - **Core**: `core` holds the coordinator loop, the shared state and the
//!   poller and scheduler threads
//! - **Backend**: `backend` pushes color transform matrices to the compositor
//!   through `hyprland-ctm-control-v1`
//! - **IPC**: `ipc` implements the control socket and the event socket
//! - **Schedule**: `schedule` and `geo` turn configured profiles, including
//!   sunrise and sunset, into a daily timetable
//! - **Infrastructure**: configuration, single-instance arbitration, signal
//!   handling and logging

// Import macros from logger module for use in all submodules
#[macro_use]
pub mod logger;

pub mod args;
pub mod backend;
pub mod color;
pub mod common;
pub mod config;
pub mod core;
pub mod geo;
pub mod io;
pub mod ipc;
pub mod schedule;

mod daemon;

pub use daemon::Hyprsunset;
