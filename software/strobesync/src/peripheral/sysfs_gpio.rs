//! Trigger and strobe lines driven through the Linux sysfs GPIO interface.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::controller::context::ControllerCtx;

use super::Peripheral;

fn default_gpio_root() -> PathBuf {
    PathBuf::from("/sys/class/gpio")
}

/// Camera trigger on one GPIO line, with an optional strobe line
/// asserted and released together with it.
#[derive(Serialize, Deserialize, Debug)]
pub struct SysfsGpio {
    /// GPIO number wired to the camera trigger input
    pub trigger_pin: u32,

    /// GPIO number wired to the strobe, if any
    pub strobe_pin: Option<u32>,

    /// Location of the sysfs GPIO tree
    #[serde(default = "default_gpio_root")]
    pub gpio_root: PathBuf,

    #[serde(skip)]
    values: Vec<File>,
}

impl SysfsGpio {
    pub fn new(trigger_pin: u32, strobe_pin: Option<u32>) -> Self {
        Self {
            trigger_pin,
            strobe_pin,
            gpio_root: default_gpio_root(),
            values: Vec::new(),
        }
    }

    /// Use a GPIO tree somewhere other than `/sys/class/gpio`.
    pub fn with_gpio_root(mut self, gpio_root: &Path) -> Self {
        self.gpio_root = gpio_root.to_path_buf();
        self
    }

    fn pins(&self) -> Vec<u32> {
        std::iter::once(self.trigger_pin)
            .chain(self.strobe_pin)
            .collect()
    }

    /// Export a pin if needed, make it an output driven low,
    /// and return its open value file.
    fn setup_pin(&self, pin: u32) -> Result<File, String> {
        let pin_dir = self.gpio_root.join(format!("gpio{pin}"));
        if !pin_dir.exists() {
            write_str(&self.gpio_root.join("export"), &pin.to_string())
                .map_err(|e| format!("Failed to export GPIO {pin}: {e}"))?;
            if !pin_dir.exists() {
                return Err(format!(
                    "GPIO {pin} did not appear at {} after export",
                    pin_dir.display()
                ));
            }
        }

        write_str(&pin_dir.join("direction"), "out")
            .map_err(|e| format!("Failed to set GPIO {pin} to output: {e}"))?;

        let mut value = OpenOptions::new()
            .write(true)
            .open(pin_dir.join("value"))
            .map_err(|e| format!("Failed to open GPIO {pin} value: {e}"))?;
        set_level(&mut value, false).map_err(|e| format!("Failed to drive GPIO {pin} low: {e}"))?;
        Ok(value)
    }

    fn set_all(&mut self, high: bool) -> Result<(), String> {
        if self.values.is_empty() {
            return Err("GPIO peripheral used before initialization".to_string());
        }
        for value in self.values.iter_mut() {
            set_level(value, high).map_err(|e| format!("Failed to write GPIO level: {e}"))?;
        }
        Ok(())
    }
}

#[typetag::serde]
impl Peripheral for SysfsGpio {
    fn init(&mut self, _ctx: &ControllerCtx) -> Result<(), String> {
        self.values.clear();
        let mut values = Vec::with_capacity(2);
        for pin in self.pins() {
            values.push(self.setup_pin(pin)?);
        }
        self.values = values;
        info!(
            "GPIO trigger on pin {}, strobe on {:?}",
            self.trigger_pin, self.strobe_pin
        );
        Ok(())
    }

    fn trigger_on(&mut self) -> Result<(), String> {
        self.set_all(true)
    }

    fn trigger_off(&mut self) -> Result<(), String> {
        self.set_all(false)
    }

    fn terminate(&mut self) -> Result<(), String> {
        if !self.values.is_empty() {
            self.set_all(false)?;
        }
        self.values.clear();
        Ok(())
    }
}

fn write_str(path: &Path, s: &str) -> std::io::Result<()> {
    let mut f = OpenOptions::new().write(true).open(path)?;
    f.write_all(s.as_bytes())
}

fn set_level(value: &mut File, high: bool) -> std::io::Result<()> {
    value.seek(SeekFrom::Start(0))?;
    value.write_all(if high { b"1" } else { b"0" })?;
    value.flush()
}
