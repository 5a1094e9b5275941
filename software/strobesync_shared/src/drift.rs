//! Two-point drift estimate and the deadline arithmetic built on it.
//!
//! Over a window of `P` remote seconds the skew (remote minus local) changes
//! by `d` nanoseconds. Distributing `d / P` across one nominal second and
//! inverting gives the number of local nanoseconds per remote second:
//!
//! ```text
//! server_second = round( 1e18 / (d / P + 1e9) )
//!               = round( 1e18 * P / (d + 1e9 * P) )
//! ```
//!
//! The second form is evaluated exactly in 128-bit integers so that repeated
//! re-estimation over long unattended runs accumulates no floating-point error.
//!
//! The per-second drift `d / P` is never truncated to whole nanoseconds.
//! Truncating first gives a different result whenever `P` does not divide `d`:
//! `d = 100, P = 61` yields 999_999_998 here but 999_999_999 from
//! `1e18 / (d / P + 1e9)` in integer arithmetic.

use core::fmt;

use crate::NOMINAL_SECOND_NS;

/// Errors from period estimation and deadline arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftError {
    /// The sampling window must span at least one remote second
    ZeroWindow,

    /// The observed drift implies a remote second of zero or negative length
    NonPositivePeriod { skew_delta_ns: i64, drift_period_s: u32 },

    /// Result does not fit in an `i64` nanosecond count
    Overflow,

    /// Deadline offsets need a nonzero divisor
    ZeroDivisor,
}

impl fmt::Display for DriftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriftError::ZeroWindow => write!(f, "drift window of zero seconds"),
            DriftError::NonPositivePeriod {
                skew_delta_ns,
                drift_period_s,
            } => write!(
                f,
                "skew change of {skew_delta_ns} ns over {drift_period_s} s implies a non-positive server second"
            ),
            DriftError::Overflow => write!(f, "server second estimate overflows"),
            DriftError::ZeroDivisor => write!(f, "phase offset divisor of zero"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DriftError {}

/// Estimate the local nanoseconds per remote second from two skew samples
/// taken `drift_period_s` remote seconds apart.
///
/// Rounds half away from zero. The result is strictly positive.
pub fn estimate_server_second(
    skew_prev_ns: i64,
    skew_now_ns: i64,
    drift_period_s: u32,
) -> Result<i64, DriftError> {
    if drift_period_s == 0 {
        return Err(DriftError::ZeroWindow);
    }

    let p = drift_period_s as i128;
    let nominal = NOMINAL_SECOND_NS as i128;
    let delta = skew_now_ns as i128 - skew_prev_ns as i128;

    let den = delta + nominal * p;
    let non_positive = DriftError::NonPositivePeriod {
        skew_delta_ns: i64::try_from(delta).unwrap_or(if delta < 0 { i64::MIN } else { i64::MAX }),
        drift_period_s,
    };
    if den <= 0 {
        return Err(non_positive);
    }

    let num = nominal * nominal * p;
    let server_second = (num + den / 2) / den;
    if server_second <= 0 {
        return Err(non_positive);
    }

    i64::try_from(server_second).map_err(|_| DriftError::Overflow)
}

/// Absolute deadline `periods` server seconds after `base_ns`, pushed back by
/// a fraction of a server second so it falls between two triggers.
pub fn offset_deadline(
    base_ns: i64,
    periods: u32,
    server_second_ns: i64,
    offset_divisor: u32,
) -> Result<i64, DriftError> {
    if offset_divisor == 0 {
        return Err(DriftError::ZeroDivisor);
    }
    (periods as i64)
        .checked_mul(server_second_ns)
        .and_then(|span| span.checked_add(server_second_ns / offset_divisor as i64))
        .and_then(|span| base_ns.checked_add(span))
        .ok_or(DriftError::Overflow)
}

/// New trigger origin after a drift correction.
///
/// The drift sample is taken half a server second after trigger number
/// `drift_period_s`, so the next trigger still to come is number
/// `drift_period_s + 1`, placed with the corrected server second.
pub fn advance_base(
    base_ns: i64,
    drift_period_s: u32,
    server_second_ns: i64,
) -> Result<i64, DriftError> {
    (drift_period_s as i64 + 1)
        .checked_mul(server_second_ns)
        .and_then(|span| base_ns.checked_add(span))
        .ok_or(DriftError::Overflow)
}
