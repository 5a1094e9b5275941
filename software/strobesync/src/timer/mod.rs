//! Absolute-time periodic timers and the notification layer between
//! timer expirations and the control loop.
//!
//! Expirations are delivered from outside the control loop (the timer thread),
//! so the notification path only touches atomics and a lock-free queue.
//! Everything else happens when the control loop drains [`PendingWork`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use serde::{Deserialize, Serialize};

use strobesync_shared::Timespec;

mod manual;
mod thread;

pub use manual::{ArmRecord, ManualTimerService};
pub use thread::ThreadTimerService;

/// Depth of the queue of trigger expirations awaiting the control loop
pub const TRIGGER_QUEUE_DEPTH: usize = 64;

/// Which of the three scheduler timers expired
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Fires the camera trigger every server second
    Trigger,

    /// Samples the skew to correct the server second
    Drift,

    /// Performs a full resynchronization with the remote reference
    Sync,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerKind::Trigger => "trigger",
            TimerKind::Drift => "drift",
            TimerKind::Sync => "sync",
        };
        f.write_str(name)
    }
}

/// Handle to a timer created by a [`TimerService`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub(crate) usize);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Absolute-time timers on the local monotonic clock.
///
/// A timer first fires at `start` and then every `interval` after that;
/// an interval of [`Timespec::ZERO`] makes it one-shot.
/// Timers are never destroyed, only re-armed.
pub trait TimerService: Send {
    /// Create a new timer that notifies with `kind` on expiration.
    fn create(
        &mut self,
        kind: TimerKind,
        start: Timespec,
        interval: Timespec,
    ) -> Result<TimerId, String>;

    /// Replace the next expiration and interval of an existing timer.
    fn rearm(&mut self, id: TimerId, start: Timespec, interval: Timespec) -> Result<(), String>;
}

/// Work handed from the expiration context to the control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// A trigger timer expired at this local monotonic time
    Trigger { fired_at_ns: i64 },

    /// A drift or sync flag was raised
    Wake,
}

/// Flags shared between the notifier and the control loop
#[derive(Debug, Default)]
struct Flags {
    drift: AtomicBool,
    sync: AtomicBool,
    dropped_triggers: AtomicU64,
}

/// Expiration-side half of the notification layer.
///
/// Never blocks, never allocates.
#[derive(Debug, Clone)]
pub struct Notifier {
    flags: Arc<Flags>,
    tx: Sender<Expiration>,
}

impl Notifier {
    /// Deliver an expiration of a timer of this kind.
    pub fn notify(&self, kind: TimerKind, fired_at_ns: i64) {
        let msg = match kind {
            TimerKind::Trigger => Expiration::Trigger { fired_at_ns },
            TimerKind::Drift => {
                self.flags.drift.store(true, Ordering::Release);
                Expiration::Wake
            }
            TimerKind::Sync => {
                self.flags.sync.store(true, Ordering::Release);
                Expiration::Wake
            }
        };

        match self.tx.try_send(msg) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(Expiration::Trigger { .. })) => {
                self.flags.dropped_triggers.fetch_add(1, Ordering::Relaxed);
            }
            // The flag is already set and the loop has plenty of wakes queued
            Err(TrySendError::Full(Expiration::Wake)) => {}
        }
    }
}

/// Loop-side half of the notification layer, with a single consumer.
#[derive(Debug)]
pub struct PendingWork {
    flags: Arc<Flags>,
    rx: Receiver<Expiration>,
}

impl PendingWork {
    /// Build a connected pair of notifier and pending-work queue.
    pub fn new() -> (Notifier, PendingWork) {
        let (tx, rx) = bounded(TRIGGER_QUEUE_DEPTH);
        let flags = Arc::new(Flags::default());
        (
            Notifier {
                flags: flags.clone(),
                tx,
            },
            PendingWork { flags, rx },
        )
    }

    /// Wait up to `timeout` for any notification, then hand every queued
    /// trigger expiration to `on_trigger` in delivery order.
    ///
    /// Returns early as soon as something is delivered.
    /// Errors from `on_trigger` stop the drain and are returned.
    /// Fails once the notifier is gone and nothing is left to deliver.
    pub fn drain_triggers<F>(&self, timeout: Duration, mut on_trigger: F) -> Result<(), String>
    where
        F: FnMut(i64) -> Result<(), String>,
    {
        let first = match self.rx.recv_timeout(timeout) {
            Ok(msg) => msg,
            Err(RecvTimeoutError::Timeout) => return Ok(()),
            Err(RecvTimeoutError::Disconnected) => {
                return Err("Timer service stopped; no further expirations will arrive".to_string());
            }
        };

        for msg in std::iter::once(first).chain(self.rx.try_iter()) {
            if let Expiration::Trigger { fired_at_ns } = msg {
                on_trigger(fired_at_ns)?;
            }
        }
        Ok(())
    }

    /// Read and clear the drift flag.
    pub fn take_drift(&self) -> bool {
        self.flags.drift.swap(false, Ordering::AcqRel)
    }

    /// Read and clear the sync flag.
    pub fn take_sync(&self) -> bool {
        self.flags.sync.swap(false, Ordering::AcqRel)
    }

    /// Read and clear the count of trigger expirations lost to a full queue.
    pub fn take_dropped_triggers(&self) -> u64 {
        self.flags.dropped_triggers.swap(0, Ordering::AcqRel)
    }
}
