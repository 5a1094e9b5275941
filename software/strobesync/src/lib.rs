#![doc = include_str!("../README.md")]

pub mod clock;
pub mod controller;
pub mod logging;
pub mod peripheral;
pub mod remote;
pub mod scheduler;
pub mod sink;
pub mod timer;

pub use controller::{Controller, context::ControllerCtx};
pub use scheduler::{Schedule, Scheduler, SchedulerState};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Choice of how the timer thread waits for the next deadline
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopMethod {
    /// Sleep until shortly before each deadline, then busy-wait the rest.
    /// Sub-millisecond delivery at the cost of one core spinning briefly.
    #[default]
    Performant,

    /// Let the OS scheduler wake the thread at each deadline.
    /// Delivery jitter follows the OS timer slack.
    Efficient,
}

/// Criteria for ending a run
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// End after this much wall time in the control loop
    Timeout(Duration),

    /// End after this many trigger firings in total
    TriggerCount(u64),
}
