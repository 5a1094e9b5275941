//! Information about the current operation
//! that may be used by the controller's appendages.

use std::default::Default;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};

use serde::{Deserialize, Serialize};

use strobesync_shared::{
    DEFAULT_DRIFT_PERIOD_S, DEFAULT_PHASE_OFFSET_DIVISOR, DEFAULT_SYNC_PERIOD_S,
};

use crate::scheduler::Schedule;
use crate::{LoopMethod, Termination};

/// Operation context
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ControllerCtx {
    /// Server seconds from the start of a sync epoch to the drift sample
    pub drift_period_s: u32,

    /// Server seconds from the start of a sync epoch to the next full synchronization
    pub sync_period_s: u32,

    /// Drift and sync fire `server_second / phase_offset_divisor` after a trigger
    pub phase_offset_divisor: u32,

    /// Longest the control loop waits without any timer expiration
    /// before checking its termination criteria again
    pub poll_interval_ms: u64,

    /// How the timer thread waits for deadlines
    pub loop_method: LoopMethod,

    /// Read environmental sensors on every trigger
    pub read_environment: bool,

    /// Core to pin the timer thread to, if the `affinity` feature is enabled
    pub timer_core: Option<usize>,

    /// A name for this controller op,
    /// which will be used as the name of the log file
    /// and must be compatible with that use.
    pub op_name: String,

    /// A directory to place outputs.
    pub op_dir: PathBuf,

    /// Criteria for ending the run. With none, the run continues until the process is stopped.
    pub termination_criteria: Vec<Termination>,
}

impl Default for ControllerCtx {
    fn default() -> Self {
        // Use current time with seconds as op name and use working directory as op dir,
        // replacing characters in the name that would be invalid on Windows.
        let op_name = DateTime::<Utc>::from(SystemTime::now())
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
            .replace(":", "");
        Self {
            drift_period_s: DEFAULT_DRIFT_PERIOD_S,
            sync_period_s: DEFAULT_SYNC_PERIOD_S,
            phase_offset_divisor: DEFAULT_PHASE_OFFSET_DIVISOR,
            poll_interval_ms: 100,
            loop_method: LoopMethod::default(),
            read_environment: false,
            timer_core: None,
            op_name,
            op_dir: std::fs::canonicalize("./").unwrap_or_default(),
            termination_criteria: Vec::new(),
        }
    }
}

impl ControllerCtx {
    /// Check that the schedule can be built and the loop can make progress.
    pub fn validate(&self) -> Result<(), String> {
        if self.drift_period_s == 0 {
            return Err("Drift period must be at least one second".to_string());
        }
        if self.sync_period_s <= self.drift_period_s {
            return Err(format!(
                "Sync period ({} s) must be longer than drift period ({} s)",
                self.sync_period_s, self.drift_period_s
            ));
        }
        if self.phase_offset_divisor == 0 {
            return Err("Phase offset divisor must be nonzero".to_string());
        }
        if self.poll_interval_ms == 0 {
            return Err("Poll interval must be nonzero".to_string());
        }
        if self.op_name.is_empty() {
            return Err("Op name must not be empty".to_string());
        }
        Ok(())
    }

    /// Scheduling periods for the scheduler core
    pub fn schedule(&self) -> Schedule {
        Schedule {
            drift_period_s: self.drift_period_s,
            sync_period_s: self.sync_period_s,
            phase_offset_divisor: self.phase_offset_divisor,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let ctx = ControllerCtx::default();
        assert_eq!(ctx.drift_period_s, 61);
        assert_eq!(ctx.sync_period_s, 301);
        assert_eq!(ctx.phase_offset_divisor, 2);
        assert_eq!(ctx.poll_interval(), Duration::from_millis(100));
        assert_eq!(ctx.loop_method, LoopMethod::Performant);
        assert!(!ctx.op_name.contains(':'));
        assert!(ctx.validate().is_ok());
    }

    #[test]
    fn validation() {
        for ctx in [
            ControllerCtx {
                drift_period_s: 0,
                ..Default::default()
            },
            ControllerCtx {
                sync_period_s: 0,
                ..Default::default()
            },
            ControllerCtx {
                drift_period_s: 30,
                sync_period_s: 30,
                ..Default::default()
            },
            ControllerCtx {
                drift_period_s: 61,
                sync_period_s: 5,
                ..Default::default()
            },
            ControllerCtx {
                phase_offset_divisor: 0,
                ..Default::default()
            },
            ControllerCtx {
                poll_interval_ms: 0,
                ..Default::default()
            },
        ] {
            assert!(ctx.validate().is_err(), "{ctx:?}");
        }
    }

    #[test]
    fn missing_fields_take_defaults() {
        let ctx: ControllerCtx =
            serde_json::from_str(r#"{"op_name": "dive", "termination_criteria": [{"TriggerCount": 5}]}"#)
                .unwrap();
        assert_eq!(ctx.op_name, "dive");
        assert_eq!(ctx.sync_period_s, 301);
        assert_eq!(ctx.termination_criteria, vec![Termination::TriggerCount(5)]);
    }
}
