#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

pub mod drift;
pub mod time;

pub use drift::{DriftError, advance_base, estimate_server_second, offset_deadline};
pub use time::{Timespec, TimeError, from_absolute, to_absolute};

/// Local nanoseconds in one remote second when the two oscillators agree
pub const NOMINAL_SECOND_NS: i64 = 1_000_000_000;

/// Remote seconds between the start of a sync epoch and the drift sample
pub const DEFAULT_DRIFT_PERIOD_S: u32 = 61;

/// Remote seconds between the start of a sync epoch and the next full synchronization
pub const DEFAULT_SYNC_PERIOD_S: u32 = 301;

/// Drift and sync deadlines land `server_second / divisor` after a trigger
/// so that they never coincide with one.
pub const DEFAULT_PHASE_OFFSET_DIVISOR: u32 = 2;

/// Result of a full synchronization with the remote time reference.
///
/// Both values are in units of the local monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemoteClockInfo {
    /// Remote minus local time at the moment the sample was taken
    pub skew_ns: i64,

    /// Local monotonic instant of the next remote-second boundary,
    /// where the next trigger period should begin
    pub start_ns: i64,
}
