//! What happens on each trigger expiration.

use tracing::debug;

use strobesync_shared::NOMINAL_SECOND_NS;

use crate::clock::MonotonicClock;
use crate::peripheral::Peripheral;
use crate::scheduler::SchedulerState;
use crate::sink::LogSink;

/// Borrowed appendages needed to fire the camera once.
pub struct TriggerAction<'a> {
    pub peripheral: &'a mut dyn Peripheral,
    pub sink: &'a mut dyn LogSink,
    pub clock: &'a dyn MonotonicClock,
    pub read_environment: bool,
}

impl TriggerAction<'_> {
    /// Assert the trigger, log the exposure, and release the trigger.
    ///
    /// The trigger is released even if logging fails.
    /// Returns the local time the exposure was logged at.
    pub fn fire(&mut self, fired_at_ns: i64, state: &SchedulerState) -> Result<i64, String> {
        self.peripheral
            .trigger_on()
            .map_err(|e| format!("Failed to assert trigger: {e}"))?;
        let exposed = self.log_exposure(state);
        let released = self
            .peripheral
            .trigger_off()
            .map_err(|e| format!("Failed to release trigger: {e}"));

        let timestamp_ns = exposed?;
        released?;
        debug!(
            "Trigger {} handled {} ns after expiration",
            state.trigger_count,
            timestamp_ns - fired_at_ns
        );
        Ok(timestamp_ns)
    }

    fn log_exposure(&mut self, state: &SchedulerState) -> Result<i64, String> {
        let timestamp_ns = self.clock.now_ns();
        let (value_a, value_b) = if self.read_environment {
            self.peripheral
                .read_environment()
                .map_err(|e| format!("Failed to read environment: {e}"))?
        } else {
            (0.0, 0.0)
        };

        let label = remote_label(timestamp_ns, state.skew_now_ns);
        self.sink
            .append(timestamp_ns, &label, value_a, value_b)
            .map_err(|e| format!("Failed to log trigger: {e}"))?;
        Ok(timestamp_ns)
    }
}

/// Estimated remote time of a local instant as `seconds.nanoseconds`,
/// with a leading `-` when the remote clock reads before its epoch.
pub fn remote_label(local_ns: i64, skew_ns: i64) -> String {
    let remote_ns = local_ns as i128 + skew_ns as i128;
    let sign = if remote_ns < 0 { "-" } else { "" };
    let magnitude = remote_ns.unsigned_abs();
    let second = NOMINAL_SECOND_NS as u128;
    format!("{sign}{}.{:09}", magnitude / second, magnitude % second)
}
