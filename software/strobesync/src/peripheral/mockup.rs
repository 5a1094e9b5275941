//! Software-only trigger hardware for running without a camera attached.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::controller::context::ControllerCtx;

use super::Peripheral;

#[derive(Debug, Default)]
struct MockupCounts {
    inits: AtomicU64,
    trigger_ons: AtomicU64,
    trigger_offs: AtomicU64,
    environment_reads: AtomicU64,
    exposing: AtomicBool,
}

/// Cloneable handle for observing a [`MockupPeripheral`] from outside the control loop.
#[derive(Clone, Debug, Default)]
pub struct MockupHandle {
    counts: Arc<MockupCounts>,
}

impl MockupHandle {
    pub fn inits(&self) -> u64 {
        self.counts.inits.load(Ordering::Acquire)
    }

    pub fn trigger_ons(&self) -> u64 {
        self.counts.trigger_ons.load(Ordering::Acquire)
    }

    pub fn trigger_offs(&self) -> u64 {
        self.counts.trigger_offs.load(Ordering::Acquire)
    }

    pub fn environment_reads(&self) -> u64 {
        self.counts.environment_reads.load(Ordering::Acquire)
    }

    /// Whether the trigger is currently asserted
    pub fn exposing(&self) -> bool {
        self.counts.exposing.load(Ordering::Acquire)
    }
}

/// Peripheral that only counts what it is asked to do
/// and reports fixed environmental readings.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct MockupPeripheral {
    /// Reported pressure
    pub pressure: f32,

    /// Reported temperature
    pub temperature: f32,

    /// Refuse to initialize, to exercise startup failure
    #[serde(default)]
    pub fail_init: bool,

    #[serde(skip)]
    handle: MockupHandle,
}

impl MockupPeripheral {
    pub fn new() -> (Self, MockupHandle) {
        let handle = MockupHandle::default();
        (
            Self {
                handle: handle.clone(),
                ..Default::default()
            },
            handle,
        )
    }

    /// Set the environmental readings to report.
    pub fn with_environment(mut self, pressure: f32, temperature: f32) -> Self {
        self.pressure = pressure;
        self.temperature = temperature;
        self
    }

    /// Get a handle to this peripheral's counters.
    pub fn handle(&self) -> MockupHandle {
        self.handle.clone()
    }
}

#[typetag::serde]
impl Peripheral for MockupPeripheral {
    fn init(&mut self, ctx: &ControllerCtx) -> Result<(), String> {
        if self.fail_init {
            return Err("Mockup peripheral configured to fail initialization".to_string());
        }
        self.handle.counts.inits.fetch_add(1, Ordering::AcqRel);
        self.handle.counts.exposing.store(false, Ordering::Release);
        info!("Mockup peripheral ready for op `{}`", ctx.op_name);
        Ok(())
    }

    fn trigger_on(&mut self) -> Result<(), String> {
        if self.handle.counts.exposing.swap(true, Ordering::AcqRel) {
            return Err("Mockup trigger asserted while already asserted".to_string());
        }
        self.handle.counts.trigger_ons.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn trigger_off(&mut self) -> Result<(), String> {
        self.handle.counts.exposing.store(false, Ordering::Release);
        self.handle.counts.trigger_offs.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn read_environment(&mut self) -> Result<(f32, f32), String> {
        self.handle
            .counts
            .environment_reads
            .fetch_add(1, Ordering::AcqRel);
        Ok((self.pressure, self.temperature))
    }
}
