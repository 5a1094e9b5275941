//! Software stand-in for a remote time reference whose clock runs at a
//! constant rate error relative to ours.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use strobesync_shared::{NOMINAL_SECOND_NS, RemoteClockInfo};

use super::RemoteClock;
use crate::clock::MonotonicClock;

/// Remote clock computed from the local one:
///
/// ```text
/// remote_ns = offset_ns + local_ns + local_ns * drift_ppb / 1e9
/// ```
///
/// A positive `drift_ppb` makes the remote clock run fast, so its seconds
/// are shorter than ours when measured locally.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SimulatedRemote {
    /// Rate error of the remote clock in parts per billion
    pub drift_ppb: i64,

    /// Remote time at local time zero
    pub offset_ns: i64,

    /// Minimum time between the initial handshake and the first trigger
    pub initial_lead_ms: u64,

    /// Minimum time between a resynchronization and the next trigger
    pub resync_lead_ms: u64,

    /// Wall time spent blocking in each full handshake
    #[serde(default)]
    pub handshake_delay_ms: u64,

    /// Fail every handshake after this many have succeeded
    #[serde(default)]
    pub fail_after: Option<u64>,

    #[serde(skip)]
    handshakes: u64,
}

impl Default for SimulatedRemote {
    fn default() -> Self {
        Self {
            drift_ppb: 0,
            offset_ns: 0,
            initial_lead_ms: 1000,
            resync_lead_ms: 100,
            handshake_delay_ms: 0,
            fail_after: None,
            handshakes: 0,
        }
    }
}

impl SimulatedRemote {
    pub fn new(drift_ppb: i64, offset_ns: i64) -> Self {
        Self {
            drift_ppb,
            offset_ns,
            ..Default::default()
        }
    }

    /// Set the lead times of the initial and subsequent full synchronizations.
    pub fn with_leads(mut self, initial_lead_ms: u64, resync_lead_ms: u64) -> Self {
        self.initial_lead_ms = initial_lead_ms;
        self.resync_lead_ms = resync_lead_ms;
        self
    }

    /// Fail every handshake after the first `n`.
    pub fn with_fail_after(mut self, n: u64) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Number of successful handshakes so far
    pub fn handshakes(&self) -> u64 {
        self.handshakes
    }

    /// Remote time at a given local time
    pub fn remote_ns(&self, local_ns: i64) -> Result<i64, String> {
        let local = local_ns as i128;
        let remote = self.offset_ns as i128
            + local
            + (local * self.drift_ppb as i128).div_euclid(NOMINAL_SECOND_NS as i128);
        i64::try_from(remote).map_err(|_| format!("Remote time overflows at local {local_ns} ns"))
    }

    /// Earliest local time at which the remote clock reads at least `remote_ns`
    pub fn local_ns(&self, remote_ns: i64) -> Result<i64, String> {
        let rate = NOMINAL_SECOND_NS as i128 + self.drift_ppb as i128;
        if rate <= 0 {
            return Err(format!(
                "Remote clock drift of {} ppb stops or reverses it",
                self.drift_ppb
            ));
        }

        // Inverse of the linear map, then settle the integer rounding
        let num = (remote_ns as i128 - self.offset_ns as i128) * NOMINAL_SECOND_NS as i128;
        let mut local = i64::try_from(num.div_euclid(rate))
            .map_err(|_| format!("Local time overflows at remote {remote_ns} ns"))?;
        while self.remote_ns(local)? < remote_ns {
            local += 1;
        }
        while self.remote_ns(local - 1)? >= remote_ns {
            local -= 1;
        }
        Ok(local)
    }

    fn handshake(&mut self) -> Result<(), String> {
        if let Some(n) = self.fail_after {
            if self.handshakes >= n {
                return Err(format!(
                    "Simulated remote handshake failure after {n} handshake(s)"
                ));
            }
        }
        self.handshakes += 1;
        Ok(())
    }
}

#[typetag::serde]
impl RemoteClock for SimulatedRemote {
    fn full_sync(
        &mut self,
        clock: &dyn MonotonicClock,
        is_initial: bool,
    ) -> Result<RemoteClockInfo, String> {
        self.handshake()?;
        if self.handshake_delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.handshake_delay_ms));
        }

        let now = clock.now_ns();
        let skew_ns = self.remote_ns(now)? - now;

        // First remote second boundary at least one lead time out
        let lead_ms = if is_initial {
            self.initial_lead_ms
        } else {
            self.resync_lead_ms
        };
        let lead_ns = i64::try_from(lead_ms)
            .ok()
            .and_then(|ms| ms.checked_mul(1_000_000))
            .ok_or_else(|| format!("Lead time of {lead_ms} ms overflows"))?;
        let earliest = self.remote_ns(now + lead_ns)?;
        let whole = earliest.div_euclid(NOMINAL_SECOND_NS);
        let boundary = if earliest.rem_euclid(NOMINAL_SECOND_NS) == 0 {
            earliest
        } else {
            (whole + 1) * NOMINAL_SECOND_NS
        };
        let start_ns = self.local_ns(boundary)?;

        debug!(
            "Simulated full sync: skew {skew_ns} ns, start at local {start_ns} ns (remote {boundary} ns)"
        );
        Ok(RemoteClockInfo { skew_ns, start_ns })
    }

    fn sample_skew(&mut self, clock: &dyn MonotonicClock) -> Result<i64, String> {
        self.handshake()?;
        let now = clock.now_ns();
        Ok(self.remote_ns(now)? - now)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn skew_grows_with_drift() {
        let clock = ManualClock::new(0);
        let mut remote = SimulatedRemote::new(1_000, 5_000);

        assert_eq!(remote.sample_skew(&clock).unwrap(), 5_000);
        clock.set(61_000_000_000);
        assert_eq!(remote.sample_skew(&clock).unwrap(), 5_000 + 61_000);
        assert_eq!(remote.handshakes(), 2);
    }

    #[test]
    fn start_lands_on_remote_second_boundary() {
        for drift_ppb in [-20_000, 0, 1_000, 20_000] {
            let clock = ManualClock::new(3_217_000_123);
            let mut remote = SimulatedRemote::new(drift_ppb, 412_345_678).with_leads(1500, 100);

            let info = remote.full_sync(&clock, true).unwrap();
            let now = clock.now_ns();
            assert!(info.start_ns >= now + 1_500_000_000);
            assert!(info.start_ns < now + 2_600_000_000);

            // First local nanosecond past the boundary
            let at = remote.remote_ns(info.start_ns).unwrap();
            let before = remote.remote_ns(info.start_ns - 1).unwrap();
            assert!(at.rem_euclid(NOMINAL_SECOND_NS) <= 1);
            assert_eq!(
                before.div_euclid(NOMINAL_SECOND_NS) + 1,
                at.div_euclid(NOMINAL_SECOND_NS)
            );
            assert_eq!(info.skew_ns, remote.remote_ns(now).unwrap() - now);

            let resync = remote.full_sync(&clock, false).unwrap();
            assert!(resync.start_ns >= now + 100_000_000);
            assert!(resync.start_ns <= info.start_ns);
        }
    }

    #[test]
    fn injected_failures() {
        let clock = ManualClock::new(0);
        let mut remote = SimulatedRemote::default().with_fail_after(1);
        assert!(remote.full_sync(&clock, true).is_ok());
        assert!(remote.sample_skew(&clock).is_err());
        assert!(remote.full_sync(&clock, false).is_err());
    }

    #[test]
    fn rejects_stopped_clock() {
        let remote = SimulatedRemote::new(-1_000_000_000, 0);
        assert!(remote.local_ns(5).is_err());
    }

    #[test]
    fn ser_roundtrip() {
        let remote: Box<dyn RemoteClock> = Box::new(SimulatedRemote::new(250, -3));
        let serialized = serde_json::to_string(&remote).unwrap();
        let deserialized: Box<dyn RemoteClock> = serde_json::from_str(&serialized).unwrap();
        assert_eq!(serialized, serde_json::to_string(&deserialized).unwrap());
    }
}
