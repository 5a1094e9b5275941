//! Deterministic timer service for discrete-event simulation.
//!
//! Nothing runs on its own: the caller asks for the next expiration, moves
//! its clock there, and feeds the expiration to the scheduler. Every arm
//! request is recorded so tests can check exactly what was scheduled.

use strobesync_shared::{Timespec, from_absolute};

use super::{TimerId, TimerKind, TimerService};

/// One create or re-arm request, as received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmRecord {
    pub id: TimerId,
    pub kind: TimerKind,
    pub start: Timespec,
    pub interval: Timespec,
}

#[derive(Debug, Clone, Copy)]
struct ManualEntry {
    kind: TimerKind,
    next_ns: Option<i64>,
    interval_ns: i64,
}

/// Timer service that is stepped by hand.
#[derive(Debug, Default)]
pub struct ManualTimerService {
    entries: Vec<ManualEntry>,
    arms: Vec<ArmRecord>,
    fail_after: Option<usize>,
}

impl ManualTimerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every arm request after the first `n` have succeeded.
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Every successful create and re-arm, in order
    pub fn arms(&self) -> &[ArmRecord] {
        &self.arms
    }

    /// Most recent successful arm of a timer of this kind
    pub fn last_arm(&self, kind: TimerKind) -> Option<ArmRecord> {
        self.arms.iter().rev().find(|a| a.kind == kind).copied()
    }

    /// Next deadline of a timer of this kind, if armed
    pub fn deadline(&self, kind: TimerKind) -> Option<i64> {
        self.entries
            .iter()
            .filter(|e| e.kind == kind)
            .find_map(|e| e.next_ns)
    }

    /// Earliest pending expiration, without consuming it
    pub fn peek(&self) -> Option<(TimerKind, i64)> {
        self.entries
            .iter()
            .filter_map(|e| e.next_ns.map(|t| (e.kind, t)))
            .min_by_key(|(_, t)| *t)
    }

    /// Consume the earliest pending expiration and schedule the timer's next one.
    ///
    /// Ties go to the timer created first.
    pub fn pop(&mut self) -> Option<(TimerKind, i64)> {
        let (idx, deadline) = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.next_ns.map(|t| (i, t)))
            .min_by_key(|(i, t)| (*t, *i))?;

        let entry = &mut self.entries[idx];
        entry.next_ns = if entry.interval_ns > 0 {
            Some(deadline + entry.interval_ns)
        } else {
            None
        };
        Some((entry.kind, deadline))
    }

    fn check_budget(&self, kind: TimerKind) -> Result<(), String> {
        match self.fail_after {
            Some(n) if self.arms.len() >= n => Err(format!("Injected failure arming {kind} timer")),
            _ => Ok(()),
        }
    }

    fn to_ns(start: Timespec, interval: Timespec) -> Result<(i64, i64), String> {
        let start_ns = from_absolute(start).map_err(|e| format!("Invalid timer start: {e}"))?;
        let interval_ns =
            from_absolute(interval).map_err(|e| format!("Invalid timer interval: {e}"))?;
        Ok((start_ns, interval_ns))
    }
}

impl TimerService for ManualTimerService {
    fn create(
        &mut self,
        kind: TimerKind,
        start: Timespec,
        interval: Timespec,
    ) -> Result<TimerId, String> {
        self.check_budget(kind)?;
        let (start_ns, interval_ns) = Self::to_ns(start, interval)?;

        let id = TimerId(self.entries.len());
        self.entries.push(ManualEntry {
            kind,
            next_ns: Some(start_ns),
            interval_ns,
        });
        self.arms.push(ArmRecord {
            id,
            kind,
            start,
            interval,
        });
        Ok(id)
    }

    fn rearm(&mut self, id: TimerId, start: Timespec, interval: Timespec) -> Result<(), String> {
        let kind = self
            .entries
            .get(id.0)
            .map(|e| e.kind)
            .ok_or_else(|| format!("Unknown {id}"))?;
        self.check_budget(kind)?;
        let (start_ns, interval_ns) = Self::to_ns(start, interval)?;

        let entry = &mut self.entries[id.0];
        entry.next_ns = Some(start_ns);
        entry.interval_ns = interval_ns;
        self.arms.push(ArmRecord {
            id,
            kind,
            start,
            interval,
        });
        Ok(())
    }
}
