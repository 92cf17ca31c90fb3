//! Application-wide constants: value limits, defaults and file names.

// # Color limits

/// Lowest accepted color temperature in Kelvin.
pub const MINIMUM_TEMP: u32 = 1000;
/// Highest accepted color temperature in Kelvin.
pub const MAXIMUM_TEMP: u32 = 20000;

/// Lower bound for the configurable gamma ceiling, as a percentage. The
/// default gamma must always fit under the ceiling.
pub const MINIMUM_GAMMA_CEILING: u32 = 100;
/// Upper bound for the configurable gamma ceiling, as a percentage.
pub const MAXIMUM_GAMMA_CEILING: u32 = 200;

// # Defaults

pub const DEFAULT_TEMP: u32 = 6000;
pub const DEFAULT_GAMMA: f32 = 1.0;
/// Default gamma ceiling as a fraction (100%).
pub const DEFAULT_MAX_GAMMA: f32 = 1.0;
pub const DEFAULT_PROFILE_TIME: &str = "00:00";

// # Configuration

pub const CONFIG_VERSION: u32 = 1;
pub const CONFIG_DIR_NAME: &str = "hypr";
pub const CONFIG_FILE_NAME: &str = "hyprsunset.toml";

// # Runtime files

/// Directory below the runtime dir that holds per-instance records.
pub const INSTANCE_DIR_NAME: &str = "hyprsunset";
/// Gate file used as the cross-process mutex for instance arbitration.
pub const INSTANCE_GATE_NAME: &str = ".lock";
pub const CONTROL_SOCKET_NAME: &str = ".hyprsunset.sock";
pub const EVENT_SOCKET_NAME: &str = ".hyprsunset2.sock";

// # Timing (milliseconds)

/// Bounded wait of the coordinator loop and the poller.
pub const LOOP_WAIT_MS: u64 = 5000;
/// Interval between liveness probes while evicting a previous instance.
pub const EVICTION_POLL_MS: u64 = 100;
/// Delay for the poller unblock timer armed during shutdown.
pub const SHUTDOWN_UNBLOCK_MS: u64 = 100;
/// Poll timeout of the IPC threads; bounds how long they take to notice shutdown.
pub const IPC_POLL_MS: u16 = 250;
/// Longest single sleep of the scheduler thread before it re-reads the clock.
pub const SCHEDULER_MAX_SLEEP_SECS: u64 = 60;

// # IPC

/// Largest control request accepted in one read.
pub const CONTROL_REQUEST_MAX: usize = 1024;
/// Pending messages a stalled event subscriber may accumulate before it is dropped.
pub const MAX_QUEUED_EVENTS: usize = 64;

// # Compositor protocol

pub const CTM_MANAGER_INTERFACE: &str = "hyprland_ctm_control_manager_v1";
pub const CTM_MANAGER_MAX_VERSION: u32 = 2;
pub const WL_OUTPUT_MAX_VERSION: u32 = 3;
