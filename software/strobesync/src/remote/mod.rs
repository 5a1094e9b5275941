//! Handshakes with the remote time reference.
//!
//! The wire protocol to the remote peer lives behind [`RemoteClock`];
//! the scheduler only sees skews and aligned start times
//! on the local monotonic clock.

use core::fmt::Debug;

use strobesync_shared::RemoteClockInfo;

use crate::clock::MonotonicClock;

mod simulated;
pub use simulated::SimulatedRemote;

/// Source of skew samples and full synchronizations against a remote clock,
/// serializable and deserializable as `Box<dyn RemoteClock>`.
///
/// Skews follow `remote - local` in nanoseconds.
#[typetag::serde(tag = "type")]
pub trait RemoteClock: Send + Debug {
    /// Perform a full handshake, blocking until it completes.
    ///
    /// `start_ns` in the result is the local monotonic time of a remote second
    /// boundary far enough ahead that timers can still be armed for it.
    /// The initial handshake may ask for a longer lead than later ones.
    fn full_sync(
        &mut self,
        clock: &dyn MonotonicClock,
        is_initial: bool,
    ) -> Result<RemoteClockInfo, String>;

    /// Measure the current skew without realigning anything.
    fn sample_skew(&mut self, clock: &dyn MonotonicClock) -> Result<i64, String>;
}
