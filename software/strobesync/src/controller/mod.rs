//! Cooperative control loop tying the scheduler to its appendages.

pub mod context;
pub mod trigger;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::Termination;
use crate::clock::{MonotonicClock, ProcessClock};
use crate::peripheral::Peripheral;
use crate::remote::RemoteClock;
use crate::scheduler::Scheduler;
use crate::sink::LogSink;
use crate::timer::{PendingWork, ThreadTimerService};
use context::ControllerCtx;
use trigger::TriggerAction;

/// Totals for a finished run
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Trigger expirations handled
    pub triggers: u64,

    /// Drift corrections and resynchronizations applied
    pub corrections: u64,

    /// Trigger expirations lost because the loop fell behind
    pub dropped_triggers: u64,

    /// Trigger expirations skipped because they were handled too late
    /// to expose on phase, such as those queued during a resynchronization
    pub stale_triggers: u64,
}

/// The controller owns the trigger hardware, the remote clock and the log,
/// arms the scheduler's timers, and services their expirations
/// on a single cooperative loop.
#[derive(Serialize, Deserialize, Debug)]
pub struct Controller {
    ctx: ControllerCtx,
    peripheral: Box<dyn Peripheral>,
    remote: Box<dyn RemoteClock>,
    sink: Box<dyn LogSink>,
}

impl Controller {
    pub fn new(
        ctx: ControllerCtx,
        peripheral: Box<dyn Peripheral>,
        remote: Box<dyn RemoteClock>,
        sink: Box<dyn LogSink>,
    ) -> Self {
        Self {
            ctx,
            peripheral,
            remote,
            sink,
        }
    }

    /// Read a controller from a JSON file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let json = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read controller config {path:?}: {e}"))?;
        serde_json::from_str(&json)
            .map_err(|e| format!("Failed to parse controller config {path:?}: {e}"))
    }

    /// Write this controller to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize controller: {e}"))?;
        fs::write(path, json).map_err(|e| format!("Failed to write controller config {path:?}: {e}"))
    }

    pub fn ctx(&self) -> &ControllerCtx {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut ControllerCtx {
        &mut self.ctx
    }

    /// Run on the process monotonic clock until a termination criterion is met
    /// or something fails. With no termination criteria, only failure ends the run.
    pub fn run(&mut self) -> Result<RunSummary, String> {
        self.run_with_clock(Arc::new(ProcessClock::new()))
    }

    /// Run against a given monotonic clock.
    pub fn run_with_clock(&mut self, clock: Arc<dyn MonotonicClock>) -> Result<RunSummary, String> {
        self.ctx.validate()?;

        info!("Initializing peripheral");
        self.peripheral
            .init(&self.ctx)
            .map_err(|e| format!("Peripheral initialization failed: {e}"))?;

        info!("Opening log for op `{}`", self.ctx.op_name);
        self.sink
            .open(&self.ctx)
            .map_err(|e| format!("Failed to open log: {e}"))?;

        let result = self.operate(clock);

        // Shut down appendages regardless of how the loop ended
        let closed = self.sink.close().map_err(|e| format!("Failed to close log: {e}"));
        let terminated = self
            .peripheral
            .terminate()
            .map_err(|e| format!("Failed to release peripheral: {e}"));

        match &result {
            Ok(summary) => info!(
                "Run complete: {} trigger(s), {} correction(s), {} dropped, {} stale",
                summary.triggers,
                summary.corrections,
                summary.dropped_triggers,
                summary.stale_triggers
            ),
            Err(e) => error!("Run aborted: {e}"),
        }
        let summary = result?;
        closed?;
        terminated?;
        Ok(summary)
    }

    fn operate(&mut self, clock: Arc<dyn MonotonicClock>) -> Result<RunSummary, String> {
        let (notifier, pending) = PendingWork::new();
        let mut timers = ThreadTimerService::spawn(
            clock.clone(),
            notifier,
            self.ctx.loop_method,
            self.ctx.timer_core,
        )?;

        info!("Synchronizing with remote clock");
        let mut scheduler = Scheduler::start(
            self.ctx.schedule(),
            self.remote.as_mut(),
            clock.as_ref(),
            &mut timers,
        )?;

        info!("Entering control loop");
        let start_of_operating = Instant::now();
        let poll_interval = self.ctx.poll_interval();
        let mut summary = RunSummary::default();
        loop {
            // Wait for expirations, firing the camera for each queued trigger
            let mut action = TriggerAction {
                peripheral: self.peripheral.as_mut(),
                sink: self.sink.as_mut(),
                clock: clock.as_ref(),
                read_environment: self.ctx.read_environment,
            };
            let mut stale = 0;
            pending.drain_triggers(poll_interval, |fired_at_ns| {
                if scheduler.is_stale(fired_at_ns, clock.now_ns()) {
                    stale += 1;
                    return Ok(());
                }
                scheduler.on_trigger(|state| action.fire(fired_at_ns, state).map(|_| ()))?;
                summary.triggers += 1;
                Ok(())
            })?;
            if stale > 0 {
                warn!("Skipped {stale} trigger expiration(s) that could no longer fire on phase");
                summary.stale_triggers += stale;
            }

            let dropped = pending.take_dropped_triggers();
            if dropped > 0 {
                warn!("Control loop fell behind; {dropped} trigger expiration(s) dropped");
                summary.dropped_triggers += dropped;
            }

            if pending.take_drift() {
                scheduler.handle_drift(self.remote.as_mut(), clock.as_ref(), &mut timers)?;
                summary.corrections += 1;
            }

            if pending.take_sync() {
                scheduler.handle_sync(self.remote.as_mut(), clock.as_ref(), &mut timers)?;
                summary.corrections += 1;
            }

            if let Some(criterion) = self.terminated(start_of_operating, &summary) {
                info!("Reached termination criterion {criterion:?}");
                break;
            }
        }

        Ok(summary)
    }

    /// The first termination criterion that has been met, if any.
    fn terminated(&self, start: Instant, summary: &RunSummary) -> Option<Termination> {
        self.ctx
            .termination_criteria
            .iter()
            .copied()
            .find(|criterion| match criterion {
                Termination::Timeout(duration) => start.elapsed() >= *duration,
                Termination::TriggerCount(n) => summary.triggers >= *n,
            })
    }
}
