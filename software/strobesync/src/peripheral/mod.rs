//! Peripherals are the trigger hardware: a camera shutter input,
//! optionally a strobe, and whatever environmental sensors ride along.

use core::fmt::Debug;

use crate::controller::context::ControllerCtx;

pub mod mockup;
pub use mockup::{MockupHandle, MockupPeripheral};

pub mod sysfs_gpio;
pub use sysfs_gpio::SysfsGpio;

/// Object-safe trigger hardware interface
/// from the perspective of the control loop,
/// serializable and deserializable as `Box<dyn Peripheral>`.
#[typetag::serde(tag = "type")]
pub trait Peripheral: Send + Debug {
    /// Prepare the hardware at the start of a run.
    /// Failure here aborts the run before anything is scheduled.
    fn init(&mut self, ctx: &ControllerCtx) -> Result<(), String>;

    /// Assert the trigger (open the shutter, fire the strobe)
    fn trigger_on(&mut self) -> Result<(), String>;

    /// Release the trigger
    fn trigger_off(&mut self) -> Result<(), String>;

    /// Read `(pressure, temperature)` to log alongside a trigger.
    /// Hardware without sensors reports zeros.
    fn read_environment(&mut self) -> Result<(f32, f32), String> {
        Ok((0.0, 0.0))
    }

    /// Release the hardware at the end of a run
    fn terminate(&mut self) -> Result<(), String> {
        Ok(())
    }
}
