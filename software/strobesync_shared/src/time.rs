//! Conversion between absolute nanosecond counts and split seconds/nanoseconds.
//!
//! Timers are armed at absolute instants on the local monotonic clock.
//! The scheduler does its arithmetic on plain `i64` nanoseconds, while the
//! timer service consumes the split form, the same as a POSIX `timespec`.

use core::fmt;

use crate::NOMINAL_SECOND_NS;

/// Absolute time or interval split into whole seconds and nanoseconds.
///
/// Invariant: `sec >= 0` and `nsec < 1_000_000_000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timespec {
    sec: i64,
    nsec: u32,
}

impl Timespec {
    /// Zero interval, which marks a timer as one-shot
    pub const ZERO: Self = Self { sec: 0, nsec: 0 };

    /// Build a validated split time.
    pub const fn new(sec: i64, nsec: u32) -> Result<Self, TimeError> {
        if sec < 0 {
            return Err(TimeError::Negative(sec));
        }
        if nsec as i64 >= NOMINAL_SECOND_NS {
            return Err(TimeError::NanosOutOfRange(nsec));
        }
        Ok(Self { sec, nsec })
    }

    pub const fn sec(&self) -> i64 {
        self.sec
    }

    pub const fn nsec(&self) -> u32 {
        self.nsec
    }

    pub const fn is_zero(&self) -> bool {
        self.sec == 0 && self.nsec == 0
    }
}

impl fmt::Display for Timespec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.nsec)
    }
}

/// Errors from time conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeError {
    /// Times before the monotonic epoch are never scheduled
    Negative(i64),

    /// Nanosecond component must be below one second
    NanosOutOfRange(u32),

    /// Result does not fit in an `i64` nanosecond count
    Overflow,
}

impl fmt::Display for TimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeError::Negative(v) => write!(f, "negative time {v} precedes the monotonic epoch"),
            TimeError::NanosOutOfRange(v) => {
                write!(f, "nanosecond component {v} is not below one second")
            }
            TimeError::Overflow => write!(f, "time overflows a 64-bit nanosecond count"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TimeError {}

/// Split an absolute nanosecond count into seconds and nanoseconds.
pub const fn to_absolute(ns: i64) -> Result<Timespec, TimeError> {
    if ns < 0 {
        return Err(TimeError::Negative(ns));
    }
    Ok(Timespec {
        sec: ns / NOMINAL_SECOND_NS,
        nsec: (ns % NOMINAL_SECOND_NS) as u32,
    })
}

/// Join split seconds and nanoseconds back into an absolute nanosecond count.
pub const fn from_absolute(ts: Timespec) -> Result<i64, TimeError> {
    match ts.sec.checked_mul(NOMINAL_SECOND_NS) {
        Some(whole) => match whole.checked_add(ts.nsec as i64) {
            Some(ns) => Ok(ns),
            None => Err(TimeError::Overflow),
        },
        None => Err(TimeError::Overflow),
    }
}
