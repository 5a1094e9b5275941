//! Timer service backed by a dedicated timer thread.
//!
//! The thread owns the timer table, receives create/re-arm commands over a
//! channel, and sleeps until the earliest absolute deadline. On expiration it
//! notifies the control loop through a [`Notifier`] and moves periodic timers
//! to their next deadline.

use std::sync::Arc;
use std::thread::{Builder, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use tracing::{debug, warn};

use strobesync_shared::{Timespec, from_absolute};

use super::{Notifier, TimerId, TimerKind, TimerService};
use crate::LoopMethod;
use crate::clock::MonotonicClock;

/// Final stretch before a deadline that is busy-waited
/// in the `Performant` loop method
const SPIN_WINDOW_NS: i64 = 200_000;

/// Commands sent to the timer thread
enum TimerCommand {
    /// Set the next deadline and interval of a timer, adding it if new
    Arm {
        id: TimerId,
        kind: TimerKind,
        start_ns: i64,
        interval_ns: i64,
    },

    /// Shut down the thread
    Close,
}

/// One row of the timer table
#[derive(Debug, Clone, Copy)]
struct Entry {
    kind: TimerKind,
    next_ns: Option<i64>,
    interval_ns: i64,
    overruns: u64,
}

/// Timer table and wait loop, run on the timer thread
struct TimerWorker {
    entries: Vec<Entry>,
    clock: Arc<dyn MonotonicClock>,
    notifier: Notifier,
    loop_method: LoopMethod,
    cmd_rx: Receiver<TimerCommand>,
}

impl TimerWorker {
    fn run(mut self) {
        loop {
            // Fire anything that is due before deciding how long to wait
            let wait_ns = match self.next_deadline() {
                Some(deadline) => {
                    let remaining = deadline - self.clock.now_ns();
                    if remaining <= 0 {
                        self.fire_due();
                        continue;
                    }
                    Some(remaining)
                }
                None => None,
            };

            let cmd = match wait_ns {
                // Nothing armed; block until told otherwise
                None => match self.cmd_rx.recv() {
                    Ok(cmd) => Some(cmd),
                    Err(_) => break,
                },
                Some(remaining) => match self.coarse_wait(remaining) {
                    Some(timeout) => match self.cmd_rx.recv_timeout(timeout) {
                        Ok(cmd) => Some(cmd),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    },
                    None => match self.cmd_rx.try_recv() {
                        Ok(cmd) => Some(cmd),
                        Err(TryRecvError::Empty) => {
                            std::hint::spin_loop();
                            None
                        }
                        Err(TryRecvError::Disconnected) => break,
                    },
                },
            };

            if let Some(cmd) = cmd {
                if !self.handle_command(cmd) {
                    break;
                }
            }
        }
        debug!("Timer thread exiting");
    }

    /// How long to sleep on the command channel, or `None` to spin.
    fn coarse_wait(&self, remaining_ns: i64) -> Option<Duration> {
        match self.loop_method {
            LoopMethod::Efficient => Some(Duration::from_nanos(remaining_ns as u64)),
            LoopMethod::Performant => {
                if remaining_ns > SPIN_WINDOW_NS {
                    Some(Duration::from_nanos((remaining_ns - SPIN_WINDOW_NS) as u64))
                } else {
                    None
                }
            }
        }
    }

    fn next_deadline(&self) -> Option<i64> {
        self.entries.iter().filter_map(|e| e.next_ns).min()
    }

    /// Notify every timer whose deadline has passed and schedule its next expiration.
    fn fire_due(&mut self) {
        let now = self.clock.now_ns();
        for entry in self.entries.iter_mut() {
            let Some(deadline) = entry.next_ns else {
                continue;
            };
            if deadline > now {
                continue;
            }

            self.notifier.notify(entry.kind, now);

            if entry.interval_ns <= 0 {
                entry.next_ns = None;
                continue;
            }

            // Skip whole periods that were missed entirely, keeping phase
            let mut next = deadline + entry.interval_ns;
            if next <= now {
                let missed = (now - next) / entry.interval_ns + 1;
                next += missed * entry.interval_ns;
                entry.overruns += missed as u64;
                warn!(
                    "{} timer fell behind by {missed} period(s); {} overrun(s) so far",
                    entry.kind, entry.overruns
                );
            }
            entry.next_ns = Some(next);
        }
    }

    /// Apply a command. Returns `false` when the thread should exit.
    fn handle_command(&mut self, cmd: TimerCommand) -> bool {
        match cmd {
            TimerCommand::Arm {
                id,
                kind,
                start_ns,
                interval_ns,
            } => {
                if id.0 >= self.entries.len() {
                    self.entries.resize(
                        id.0 + 1,
                        Entry {
                            kind,
                            next_ns: None,
                            interval_ns: 0,
                            overruns: 0,
                        },
                    );
                }
                let entry = &mut self.entries[id.0];
                entry.kind = kind;
                entry.next_ns = Some(start_ns);
                entry.interval_ns = interval_ns;
                true
            }
            TimerCommand::Close => false,
        }
    }
}

/// Timer service running on its own thread.
///
/// Create and re-arm only enqueue a command, so they never block the caller.
/// Dropping the service stops the thread.
pub struct ThreadTimerService {
    kinds: Vec<TimerKind>,
    cmd_tx: Sender<TimerCommand>,
    thread: Option<JoinHandle<()>>,
}

impl ThreadTimerService {
    /// Spin up the timer thread, optionally pinned to a core.
    pub fn spawn(
        clock: Arc<dyn MonotonicClock>,
        notifier: Notifier,
        loop_method: LoopMethod,
        core_assignment: Option<usize>,
    ) -> Result<Self, String> {
        let (cmd_tx, cmd_rx) = unbounded();
        let worker = TimerWorker {
            entries: Vec::with_capacity(3),
            clock,
            notifier,
            loop_method,
            cmd_rx,
        };

        let thread = Builder::new()
            .name("timer-service".to_string())
            .spawn(move || {
                prioritize_timer_thread(core_assignment);
                worker.run()
            })
            .map_err(|e| format!("Failed to spawn timer thread: {e}"))?;

        Ok(Self {
            kinds: Vec::with_capacity(3),
            cmd_tx,
            thread: Some(thread),
        })
    }

    fn send_arm(
        &self,
        id: TimerId,
        kind: TimerKind,
        start: Timespec,
        interval: Timespec,
    ) -> Result<(), String> {
        let start_ns = from_absolute(start).map_err(|e| format!("Invalid {kind} start: {e}"))?;
        let interval_ns =
            from_absolute(interval).map_err(|e| format!("Invalid {kind} interval: {e}"))?;
        self.cmd_tx
            .send(TimerCommand::Arm {
                id,
                kind,
                start_ns,
                interval_ns,
            })
            .map_err(|_| format!("Timer thread is gone; unable to arm {kind} {id}"))
    }
}

impl TimerService for ThreadTimerService {
    fn create(
        &mut self,
        kind: TimerKind,
        start: Timespec,
        interval: Timespec,
    ) -> Result<TimerId, String> {
        let id = TimerId(self.kinds.len());
        self.send_arm(id, kind, start, interval)?;
        self.kinds.push(kind);
        debug!("Created {kind} {id} at {start} every {interval}");
        Ok(id)
    }

    fn rearm(&mut self, id: TimerId, start: Timespec, interval: Timespec) -> Result<(), String> {
        let kind = *self
            .kinds
            .get(id.0)
            .ok_or_else(|| format!("Unknown {id}"))?;
        self.send_arm(id, kind, start, interval)?;
        debug!("Re-armed {kind} {id} at {start} every {interval}");
        Ok(())
    }
}

impl Drop for ThreadTimerService {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(TimerCommand::Close);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Timer thread panicked");
            }
        }
    }
}

/// Bind the timer thread to its core and raise its priority, if supported.
#[cfg(feature = "affinity")]
fn prioritize_timer_thread(core_assignment: Option<usize>) {
    if let Some(id) = core_assignment {
        if !core_affinity::set_for_current(core_affinity::CoreId { id }) {
            warn!("Unable to pin timer thread to core {id}");
        }
    }
    if thread_priority::set_current_thread_priority(thread_priority::ThreadPriority::Max).is_err()
    {
        warn!("Unable to raise timer thread priority");
    }
}

#[cfg(not(feature = "affinity"))]
fn prioritize_timer_thread(_core_assignment: Option<usize>) {}
