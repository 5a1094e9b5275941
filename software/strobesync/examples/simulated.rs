//! Trigger a mock camera against a simulated remote clock running fast.
//!
//! Demonstrated here:
//!   * Building a controller from a mock peripheral, a simulated remote clock and a CSV log
//!   * Shortened drift and sync periods, so several corrections happen within a minute
//!   * Serialization of the controller to the JSON form the `strobesync` binary reads

use std::time::Duration;

use strobesync::controller::RunSummary;
use strobesync::logging::init_logging;
use strobesync::peripheral::MockupPeripheral;
use strobesync::remote::SimulatedRemote;
use strobesync::sink::{CsvLogSink, Overflow};
use strobesync::*;

fn main() -> Result<(), String> {
    let mut ctx = ControllerCtx::default();
    ctx.op_name = "simulated_example".into();
    ctx.op_dir = std::env::temp_dir().join("strobesync");
    ctx.drift_period_s = 7;
    ctx.sync_period_s = 31;
    ctx.read_environment = true;
    ctx.termination_criteria = vec![Termination::Timeout(Duration::from_secs(45))];
    std::fs::create_dir_all(&ctx.op_dir).map_err(|e| e.to_string())?;

    let (log_path, guards) = init_logging(&ctx.op_dir, &ctx.op_name)?;
    println!("Logging to {log_path:?}");

    // Remote clock runs 50 ppm fast and leads by a quarter second
    let remote = SimulatedRemote::new(50_000, 250_000_000);
    let (camera, counts) = MockupPeripheral::new();
    let camera = camera.with_environment(101.325, 4.0);
    let mut controller = Controller::new(
        ctx,
        Box::new(camera),
        Box::new(remote),
        Box::new(CsvLogSink::new(50, Overflow::Wrap)),
    );

    // The same controller as the binary would load it
    let json = serde_json::to_string_pretty(&controller).map_err(|e| e.to_string())?;
    println!("{json}");
    let _: Controller = serde_json::from_str(&json).map_err(|e| e.to_string())?;

    let result = controller.run();
    guards.shutdown();
    let RunSummary {
        triggers,
        corrections,
        dropped_triggers,
        stale_triggers,
    } = result?;
    println!(
        "{triggers} trigger(s), {corrections} correction(s), \
         {dropped_triggers} dropped, {stale_triggers} stale; \
         camera saw {} exposure(s)",
        counts.trigger_ons()
    );
    Ok(())
}
