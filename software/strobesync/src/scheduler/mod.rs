//! Scheduler core: the trigger timeline and its corrections.
//!
//! A run is a sequence of sync epochs. Each epoch starts from a full
//! synchronization that lands the trigger on a remote second boundary,
//! with the server second reset to nominal. Partway through the epoch a
//! single drift sample corrects the server second from the change in skew
//! and moves the trigger timeline onto the corrected period. The next full
//! synchronization starts a new epoch.
//!
//! ```text
//!  sync/start        drift                              sync
//!  |                 |                                  |
//!  T  T  T ... T  T  :  t  t  t  ...                 t  :  T  T ...
//!  ^ base            ^ base + P_d*ss + ss/2             ^ anchor + P_s*ss' + ss'/2
//! ```
//!
//! The scheduler never waits on anything itself. It is handed each expiration
//! by the control loop, which is the only place its state changes.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use strobesync_shared::{
    DEFAULT_DRIFT_PERIOD_S, DEFAULT_PHASE_OFFSET_DIVISOR, DEFAULT_SYNC_PERIOD_S,
    NOMINAL_SECOND_NS, Timespec, advance_base, estimate_server_second, offset_deadline,
    to_absolute,
};

use crate::clock::MonotonicClock;
use crate::remote::RemoteClock;
use crate::timer::{TimerId, TimerKind, TimerService};

/// Periods of the drift and sync timers, in remote seconds
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Schedule {
    pub drift_period_s: u32,
    pub sync_period_s: u32,

    /// Drift and sync land `server_second / phase_offset_divisor` after a trigger
    pub phase_offset_divisor: u32,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            drift_period_s: DEFAULT_DRIFT_PERIOD_S,
            sync_period_s: DEFAULT_SYNC_PERIOD_S,
            phase_offset_divisor: DEFAULT_PHASE_OFFSET_DIVISOR,
        }
    }
}

/// Everything the scheduler knows about the relation between the two clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerState {
    /// Local time of the current trigger-period origin.
    /// Triggers fall at `trigger_base_ns + k * server_second_ns`.
    pub trigger_base_ns: i64,

    /// Local nanoseconds per remote second; always positive
    pub server_second_ns: i64,

    /// Skew before the most recent drift sample
    pub skew_prev_ns: i64,

    /// Most recent skew, remote minus local
    pub skew_now_ns: i64,

    /// Triggers fired since the last drift correction or full synchronization
    pub trigger_count: u32,

    /// Trigger base set by the most recent full synchronization
    pub sync_anchor_ns: i64,

    /// Number of corrections applied so far
    pub epoch: u64,
}

/// Owner of the three timers and the state they are scheduled from.
#[derive(Debug)]
pub struct Scheduler {
    schedule: Schedule,
    state: SchedulerState,
    trigger: TimerId,
    drift: TimerId,
    sync: TimerId,
}

impl Scheduler {
    /// Perform the initial full synchronization and arm all three timers.
    ///
    /// Nothing is armed if the synchronization fails.
    pub fn start(
        schedule: Schedule,
        remote: &mut dyn RemoteClock,
        clock: &dyn MonotonicClock,
        timers: &mut dyn TimerService,
    ) -> Result<Self, String> {
        if schedule.drift_period_s == 0 || schedule.drift_period_s >= schedule.sync_period_s {
            return Err(format!("Invalid schedule {schedule:?}"));
        }

        let info = remote
            .full_sync(clock, true)
            .map_err(|e| format!("Initial synchronization failed: {e}"))?;

        let base = info.start_ns;
        let ss = NOMINAL_SECOND_NS;
        let state = SchedulerState {
            trigger_base_ns: base,
            server_second_ns: ss,
            skew_prev_ns: info.skew_ns,
            skew_now_ns: info.skew_ns,
            trigger_count: 0,
            sync_anchor_ns: base,
            epoch: 0,
        };

        let drift_at = offset(base, schedule.drift_period_s, ss, &schedule)?;
        let sync_at = offset(base, schedule.sync_period_s, ss, &schedule)?;

        let trigger = timers
            .create(TimerKind::Trigger, timespec(base)?, timespec(ss)?)
            .map_err(arm_failed(TimerKind::Trigger))?;
        let drift = timers
            .create(TimerKind::Drift, timespec(drift_at)?, Timespec::ZERO)
            .map_err(arm_failed(TimerKind::Drift))?;
        let sync = timers
            .create(TimerKind::Sync, timespec(sync_at)?, Timespec::ZERO)
            .map_err(arm_failed(TimerKind::Sync))?;

        info!(
            "Scheduler started: first trigger at {base} ns, skew {} ns, drift at {drift_at} ns, sync at {sync_at} ns",
            info.skew_ns
        );

        Ok(Self {
            schedule,
            state,
            trigger,
            drift,
            sync,
        })
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Handle of the timer of a given kind
    pub fn timer_id(&self, kind: TimerKind) -> TimerId {
        match kind {
            TimerKind::Trigger => self.trigger,
            TimerKind::Drift => self.drift,
            TimerKind::Sync => self.sync,
        }
    }

    /// Run the trigger action for one trigger expiration and count it.
    pub fn on_trigger<F>(&mut self, action: F) -> Result<(), String>
    where
        F: FnOnce(&SchedulerState) -> Result<(), String>,
    {
        action(&self.state)?;
        self.state.trigger_count = self.state.trigger_count.saturating_add(1);
        Ok(())
    }

    /// Whether a trigger expiration no longer lines up with the current timeline.
    ///
    /// Expirations from before the latest re-arm fall ahead of the trigger base,
    /// and any expiration handled more than half a server second after it fired
    /// would expose off phase.
    pub fn is_stale(&self, fired_at_ns: i64, now_ns: i64) -> bool {
        fired_at_ns < self.state.trigger_base_ns
            || now_ns.saturating_sub(fired_at_ns) > self.state.server_second_ns / 2
    }

    /// Correct the server second from a fresh skew sample and move the
    /// trigger timeline and the pending sync onto it.
    pub fn handle_drift(
        &mut self,
        remote: &mut dyn RemoteClock,
        clock: &dyn MonotonicClock,
        timers: &mut dyn TimerService,
    ) -> Result<(), String> {
        let skew = remote
            .sample_skew(clock)
            .map_err(|e| format!("Drift skew sample failed: {e}"))?;

        let mut next = self.state;
        next.skew_prev_ns = next.skew_now_ns;
        next.skew_now_ns = skew;

        let ss = estimate_server_second(
            next.skew_prev_ns,
            next.skew_now_ns,
            self.schedule.drift_period_s,
        )
        .map_err(|e| format!("Failed to estimate server second: {e}"))?;
        next.server_second_ns = ss;
        next.trigger_base_ns = advance_base(next.trigger_base_ns, self.schedule.drift_period_s, ss)
            .map_err(|e| format!("Failed to advance trigger base: {e}"))?;
        let sync_at = offset(
            next.sync_anchor_ns,
            self.schedule.sync_period_s,
            ss,
            &self.schedule,
        )?;

        timers
            .rearm(self.trigger, timespec(next.trigger_base_ns)?, timespec(ss)?)
            .map_err(arm_failed(TimerKind::Trigger))?;
        timers
            .rearm(self.sync, timespec(sync_at)?, Timespec::ZERO)
            .map_err(arm_failed(TimerKind::Sync))?;

        debug!(
            "Drift sample after {} trigger(s) in epoch {}",
            next.trigger_count, next.epoch
        );
        next.trigger_count = 0;
        next.epoch += 1;
        self.state = next;

        info!(
            "Drift correction: skew {} -> {} ns, server second {ss} ns, triggers resume at {} ns, sync at {sync_at} ns",
            next.skew_prev_ns, next.skew_now_ns, next.trigger_base_ns
        );
        Ok(())
    }

    /// Resynchronize with the remote clock and start a new sync epoch.
    pub fn handle_sync(
        &mut self,
        remote: &mut dyn RemoteClock,
        clock: &dyn MonotonicClock,
        timers: &mut dyn TimerService,
    ) -> Result<(), String> {
        let info = remote
            .full_sync(clock, false)
            .map_err(|e| format!("Resynchronization failed: {e}"))?;

        let base = info.start_ns;
        let ss = NOMINAL_SECOND_NS;
        let drift_at = offset(base, self.schedule.drift_period_s, ss, &self.schedule)?;

        timers
            .rearm(self.trigger, timespec(base)?, timespec(ss)?)
            .map_err(arm_failed(TimerKind::Trigger))?;
        timers
            .rearm(self.drift, timespec(drift_at)?, Timespec::ZERO)
            .map_err(arm_failed(TimerKind::Drift))?;

        let prior = self.state;
        self.state = SchedulerState {
            trigger_base_ns: base,
            server_second_ns: ss,
            skew_prev_ns: prior.skew_now_ns,
            skew_now_ns: info.skew_ns,
            trigger_count: 0,
            sync_anchor_ns: base,
            epoch: prior.epoch + 1,
        };

        info!(
            "Resynchronized after {} trigger(s): skew {} ns, triggers resume at {base} ns, drift at {drift_at} ns",
            prior.trigger_count, info.skew_ns
        );
        Ok(())
    }
}

fn offset(base_ns: i64, periods: u32, ss: i64, schedule: &Schedule) -> Result<i64, String> {
    offset_deadline(base_ns, periods, ss, schedule.phase_offset_divisor)
        .map_err(|e| format!("Failed to place deadline {periods} periods after {base_ns} ns: {e}"))
}

fn timespec(ns: i64) -> Result<Timespec, String> {
    to_absolute(ns).map_err(|e| format!("Unable to schedule at {ns} ns: {e}"))
}

fn arm_failed(kind: TimerKind) -> impl Fn(String) -> String {
    move |e| format!("Failed to arm {kind} timer: {e}")
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;

    use super::*;
    use crate::clock::ManualClock;
    use crate::remote::SimulatedRemote;
    use crate::timer::ManualTimerService;
    use strobesync_shared::RemoteClockInfo;

    const S: i64 = NOMINAL_SECOND_NS;

    /// Remote that replays canned handshake results.
    #[derive(Serialize, Deserialize, Debug, Default)]
    struct ScriptedRemote {
        /// `(skew_ns, start_ns)` per full synchronization
        syncs: VecDeque<(i64, i64)>,
        skews: VecDeque<i64>,
    }

    impl ScriptedRemote {
        fn new(syncs: &[(i64, i64)], skews: &[i64]) -> Self {
            Self {
                syncs: syncs.iter().copied().collect(),
                skews: skews.iter().copied().collect(),
            }
        }
    }

    #[typetag::serde]
    impl RemoteClock for ScriptedRemote {
        fn full_sync(
            &mut self,
            _clock: &dyn MonotonicClock,
            _is_initial: bool,
        ) -> Result<RemoteClockInfo, String> {
            let (skew_ns, start_ns) = self
                .syncs
                .pop_front()
                .ok_or_else(|| "no sync scripted".to_string())?;
            Ok(RemoteClockInfo { skew_ns, start_ns })
        }

        fn sample_skew(&mut self, _clock: &dyn MonotonicClock) -> Result<i64, String> {
            self.skews
                .pop_front()
                .ok_or_else(|| "no skew scripted".to_string())
        }
    }

    fn ts(ns: i64) -> Timespec {
        to_absolute(ns).unwrap()
    }

    fn started(
        remote: &mut dyn RemoteClock,
        clock: &ManualClock,
        timers: &mut ManualTimerService,
    ) -> Scheduler {
        Scheduler::start(Schedule::default(), remote, clock, timers).unwrap()
    }

    #[test]
    fn startup_arms_three_timers() {
        let x = 5_000_000_000;
        let clock = ManualClock::new(1_000_000_000);
        let mut remote = ScriptedRemote::new(&[(-42, x)], &[]);
        let mut timers = ManualTimerService::new();
        let scheduler = started(&mut remote, &clock, &mut timers);

        let arms = timers.arms();
        assert_eq!(arms.len(), 3);
        assert_eq!(arms[0].kind, TimerKind::Trigger);
        assert_eq!((arms[0].start, arms[0].interval), (ts(x), ts(S)));
        assert_eq!(arms[1].kind, TimerKind::Drift);
        assert_eq!((arms[1].start, arms[1].interval), (ts(x + 61_500_000_000), Timespec::ZERO));
        assert_eq!(arms[2].kind, TimerKind::Sync);
        assert_eq!((arms[2].start, arms[2].interval), (ts(x + 301_500_000_000), Timespec::ZERO));

        let state = scheduler.state();
        assert_eq!(state.trigger_base_ns, x);
        assert_eq!(state.sync_anchor_ns, x);
        assert_eq!(state.server_second_ns, S);
        assert_eq!(state.skew_now_ns, -42);
        assert_eq!(state.trigger_count, 0);
        assert_eq!(scheduler.timer_id(TimerKind::Sync), arms[2].id);
    }

    #[test]
    fn startup_failure_arms_nothing() {
        let clock = ManualClock::new(0);
        let mut timers = ManualTimerService::new();

        let mut remote = ScriptedRemote::default();
        assert!(Scheduler::start(Schedule::default(), &mut remote, &clock, &mut timers).is_err());

        let mut remote = SimulatedRemote::default().with_fail_after(0);
        assert!(Scheduler::start(Schedule::default(), &mut remote, &clock, &mut timers).is_err());

        assert!(timers.arms().is_empty());
    }

    #[test]
    fn drift_corrects_period_and_moves_sync() {
        let x = 10_000_000_000;
        let clock = ManualClock::new(0);
        let mut remote = ScriptedRemote::new(&[(0, x)], &[61_000]);
        let mut timers = ManualTimerService::new();
        let mut scheduler = started(&mut remote, &clock, &mut timers);

        clock.set(x + 61_500_000_000);
        scheduler
            .handle_drift(&mut remote, &clock, &mut timers)
            .unwrap();

        let ss = 999_999_000;
        let state = *scheduler.state();
        assert_eq!(state.server_second_ns, ss);
        assert_eq!(state.skew_prev_ns, 0);
        assert_eq!(state.skew_now_ns, 61_000);
        assert_eq!(state.trigger_base_ns, x + 62 * ss);
        assert_eq!(state.sync_anchor_ns, x);
        assert_eq!(state.epoch, 1);

        let trigger = timers.last_arm(TimerKind::Trigger).unwrap();
        assert_eq!((trigger.start, trigger.interval), (ts(x + 62 * ss), ts(ss)));
        let sync = timers.last_arm(TimerKind::Sync).unwrap();
        assert_eq!((sync.start, sync.interval), (ts(x + 301 * ss + ss / 2), Timespec::ZERO));

        // Drift is not re-armed by itself
        assert_eq!(timers.arms().len(), 5);
        assert_eq!(timers.deadline(TimerKind::Drift), Some(x + 61_500_000_000));
    }

    #[test]
    fn sync_resets_base_count_and_period() {
        let x = 10_000_000_000;
        let y = x + 302 * S + 123_456;
        let clock = ManualClock::new(0);
        let mut remote = ScriptedRemote::new(&[(0, x), (77, y)], &[-3_000_000]);
        let mut timers = ManualTimerService::new();
        let mut scheduler = started(&mut remote, &clock, &mut timers);

        scheduler
            .handle_drift(&mut remote, &clock, &mut timers)
            .unwrap();
        for _ in 0..5 {
            scheduler.on_trigger(|_| Ok(())).unwrap();
        }
        assert_ne!(scheduler.state().server_second_ns, S);
        assert_eq!(scheduler.state().trigger_count, 5);

        scheduler
            .handle_sync(&mut remote, &clock, &mut timers)
            .unwrap();
        let state = *scheduler.state();
        assert_eq!(state.trigger_base_ns, y);
        assert_eq!(state.sync_anchor_ns, y);
        assert_eq!(state.trigger_count, 0);
        assert_eq!(state.server_second_ns, S);
        assert_eq!(state.skew_now_ns, 77);
        assert_eq!(state.epoch, 2);

        let trigger = timers.last_arm(TimerKind::Trigger).unwrap();
        assert_eq!((trigger.start, trigger.interval), (ts(y), ts(S)));
        let drift = timers.last_arm(TimerKind::Drift).unwrap();
        assert_eq!((drift.start, drift.interval), (ts(y + 61 * S + S / 2), Timespec::ZERO));
    }

    #[test]
    fn trigger_count_increments_and_resets() {
        let clock = ManualClock::new(0);
        let mut remote = ScriptedRemote::new(&[(0, S), (0, 400 * S)], &[0]);
        let mut timers = ManualTimerService::new();
        let mut scheduler = started(&mut remote, &clock, &mut timers);

        let mut seen = Vec::new();
        for _ in 0..3 {
            scheduler
                .on_trigger(|state| {
                    seen.push(state.trigger_count);
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(scheduler.state().trigger_count, 3);

        // A failing action is not counted
        assert!(scheduler.on_trigger(|_| Err("jammed".to_string())).is_err());
        assert_eq!(scheduler.state().trigger_count, 3);

        scheduler
            .handle_drift(&mut remote, &clock, &mut timers)
            .unwrap();
        assert_eq!(scheduler.state().trigger_count, 0);

        scheduler.on_trigger(|_| Ok(())).unwrap();
        scheduler
            .handle_sync(&mut remote, &clock, &mut timers)
            .unwrap();
        assert_eq!(scheduler.state().trigger_count, 0);
    }

    #[test]
    fn expirations_from_old_timeline_are_stale() {
        let x = 10_000_000_000;
        let y = x + 302 * S + 123_456;
        let clock = ManualClock::new(0);
        let mut remote = ScriptedRemote::new(&[(0, x), (0, y)], &[]);
        let mut timers = ManualTimerService::new();
        let mut scheduler = started(&mut remote, &clock, &mut timers);

        // On time, slightly late, and too late to be on phase
        assert!(!scheduler.is_stale(x, x));
        assert!(!scheduler.is_stale(x + S, x + S + S / 2));
        assert!(scheduler.is_stale(x + S, x + S + S / 2 + 1));

        // Queued while a slow resync blocked the loop
        let queued = [x + 300 * S, x + 301 * S, x + 302 * S];
        scheduler
            .handle_sync(&mut remote, &clock, &mut timers)
            .unwrap();
        for fired_at in queued {
            assert!(scheduler.is_stale(fired_at, y), "{fired_at}");
        }
        assert!(!scheduler.is_stale(y, y + 1_000));
    }

    #[test]
    fn drift_period_must_precede_sync() {
        let clock = ManualClock::new(0);
        let mut timers = ManualTimerService::new();
        for (drift_period_s, sync_period_s) in [(0, 10), (10, 10), (11, 10)] {
            let schedule = Schedule {
                drift_period_s,
                sync_period_s,
                ..Default::default()
            };
            let mut remote = ScriptedRemote::new(&[(0, S)], &[]);
            assert!(Scheduler::start(schedule, &mut remote, &clock, &mut timers).is_err());
        }
        assert!(timers.arms().is_empty());
    }

    #[test]
    fn failures_after_start_are_fatal() {
        let clock = ManualClock::new(0);

        // Timer service refuses to re-arm
        let mut remote = ScriptedRemote::new(&[(0, S)], &[0]);
        let mut timers = ManualTimerService::new().fail_after(3);
        let mut scheduler = started(&mut remote, &clock, &mut timers);
        let err = scheduler
            .handle_drift(&mut remote, &clock, &mut timers)
            .unwrap_err();
        assert!(err.contains("arm"), "{err}");

        // Skew sample unavailable
        let mut remote = ScriptedRemote::new(&[(0, S)], &[]);
        let mut timers = ManualTimerService::new();
        let mut scheduler = started(&mut remote, &clock, &mut timers);
        assert!(
            scheduler
                .handle_drift(&mut remote, &clock, &mut timers)
                .is_err()
        );

        // Skew implying a stopped remote clock
        let mut remote = ScriptedRemote::new(&[(0, S)], &[-61 * S]);
        let mut timers = ManualTimerService::new();
        let mut scheduler = started(&mut remote, &clock, &mut timers);
        let before = *scheduler.state();
        assert!(
            scheduler
                .handle_drift(&mut remote, &clock, &mut timers)
                .is_err()
        );
        assert_eq!(*scheduler.state(), before);

        // Resynchronization unavailable
        assert!(
            scheduler
                .handle_sync(&mut remote, &clock, &mut timers)
                .is_err()
        );
    }

    #[test]
    fn stable_over_many_epochs() {
        let n = 5_000;
        let skew = 1_234_567;
        let syncs: Vec<(i64, i64)> = (0..=n).map(|i| (skew, (1 + 400 * i) * S)).collect();
        let skews = vec![skew; n as usize];

        let clock = ManualClock::new(0);
        let mut remote = ScriptedRemote::new(&syncs, &skews);
        let mut timers = ManualTimerService::new();
        let mut scheduler = started(&mut remote, &clock, &mut timers);

        for i in 0..n {
            let anchor = scheduler.state().sync_anchor_ns;
            scheduler
                .handle_drift(&mut remote, &clock, &mut timers)
                .unwrap();
            assert_eq!(scheduler.state().server_second_ns, S);
            assert_eq!(scheduler.state().trigger_base_ns, anchor + 62 * S);

            scheduler
                .handle_sync(&mut remote, &clock, &mut timers)
                .unwrap();
            assert_eq!(scheduler.state().trigger_base_ns, (1 + 400 * (i + 1)) * S);
        }
        assert_eq!(scheduler.state().epoch, 2 * n as u64);
    }

    #[test]
    fn stable_under_alternating_drift() {
        // Skew wanders back and forth by up to 1 ms per drift window
        let n = 2_000;
        let syncs: Vec<(i64, i64)> = (0..=n).map(|i| (0, (1 + 400 * i) * S)).collect();
        let clock = ManualClock::new(0);
        let mut remote = ScriptedRemote::new(&syncs, &[]);
        let mut timers = ManualTimerService::new();
        let mut scheduler = started(&mut remote, &clock, &mut timers);

        for i in 0..n {
            let delta = if i % 2 == 0 { 1_000_000 } else { -1_000_000 };
            remote.skews.push_back(scheduler.state().skew_now_ns + delta);
            scheduler
                .handle_drift(&mut remote, &clock, &mut timers)
                .unwrap();
            let ss = scheduler.state().server_second_ns;
            assert!((S - 20_000..=S + 20_000).contains(&ss), "{ss}");

            scheduler
                .handle_sync(&mut remote, &clock, &mut timers)
                .unwrap();
        }
    }

    /// Distance from remote time to the nearest remote second boundary
    fn phase_error(remote: &SimulatedRemote, local_ns: i64) -> i64 {
        let r = remote.remote_ns(local_ns).unwrap().rem_euclid(S);
        r.min(S - r)
    }

    #[test]
    fn drift_correction_keeps_triggers_phase_locked() {
        // 20 ppm fast remote clock, a crystal's worth of error
        let mut remote = SimulatedRemote::new(20_000, 250_000_000).with_leads(1000, 100);
        let clock = ManualClock::new(3_000_000_000);
        let mut timers = ManualTimerService::new();
        let mut scheduler = started(&mut remote, &clock, &mut timers);

        // Run three sync epochs in simulated time
        let mut triggers: Vec<(i64, bool)> = Vec::new();
        let mut corrected = false;
        let mut syncs = 0;
        while syncs < 3 {
            let (kind, t) = timers.pop().unwrap();
            clock.set(t);
            match kind {
                TimerKind::Trigger => {
                    let fired = clock.now_ns();
                    scheduler
                        .on_trigger(|_| {
                            triggers.push((fired, corrected));
                            Ok(())
                        })
                        .unwrap();
                }
                TimerKind::Drift => {
                    scheduler
                        .handle_drift(&mut remote, &clock, &mut timers)
                        .unwrap();
                    corrected = true;
                }
                TimerKind::Sync => {
                    // Every trigger of the epoch fired once
                    assert_eq!(scheduler.state().trigger_count, 301 - 62 + 1);
                    scheduler
                        .handle_sync(&mut remote, &clock, &mut timers)
                        .unwrap();
                    corrected = false;
                    syncs += 1;
                }
            }
        }
        assert!(triggers.len() > 900);

        for (t, corrected) in triggers.iter().copied() {
            let err = phase_error(&remote, t);
            if corrected {
                assert!(err < 300_000, "corrected trigger at {t} off by {err} ns");
            } else {
                assert!(err < 1_500_000, "trigger at {t} off by {err} ns");
            }
        }

        // Without correction, nominal seconds would have slipped by milliseconds
        let anchor = scheduler.state().sync_anchor_ns;
        assert!(phase_error(&remote, anchor + 300 * S) > 5_000_000);
        assert!(phase_error(&remote, anchor) < 2);
    }
}
