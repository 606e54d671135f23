//! Linux sysfs GPIO backend (`/sys/class/gpio`).
//!
//! Pins are exported on first use and left exported on exit; the relay
//! board is released only when the process ends.

use super::{GpioBackend, Level};
use crate::error::{Result, ThermaboxError};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default sysfs GPIO root.
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// udev may need a moment to create and chown `gpioN/` after an export.
const EXPORT_POLL_ATTEMPTS: u32 = 20;
const EXPORT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// GPIO backend driving pins through the sysfs interface.
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    root: PathBuf,
}

impl SysfsGpio {
    /// Open the GPIO subsystem at the default sysfs root.
    pub fn open() -> Result<Self> {
        Self::with_root(SYSFS_GPIO_ROOT)
    }

    /// Open the GPIO subsystem rooted at `root`.
    ///
    /// Fails with [`ThermaboxError::Hardware`] if the export interface is missing.
    pub fn with_root(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.join("export").exists() {
            return Err(ThermaboxError::Hardware(format!(
                "GPIO subsystem unavailable: {} has no export interface",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pin_dir(&self, pin: u8) -> PathBuf {
        self.root.join(format!("gpio{}", pin))
    }

    fn export(&self, pin: u8) -> Result<()> {
        let dir = self.pin_dir(pin);
        if dir.exists() {
            return Ok(());
        }
        debug!("[GPIO] Exporting pin {}", pin);
        fs::write(self.root.join("export"), pin.to_string())
            .map_err(|e| ThermaboxError::Hardware(format!("failed to export pin {}: {}", pin, e)))?;

        for _ in 0..EXPORT_POLL_ATTEMPTS {
            if dir.join("direction").exists() {
                return Ok(());
            }
            std::thread::sleep(EXPORT_POLL_INTERVAL);
        }
        Err(ThermaboxError::Hardware(format!(
            "pin {} did not appear after export",
            pin
        )))
    }
}

impl GpioBackend for SysfsGpio {
    fn setup_output(&self, pin: u8) -> Result<()> {
        self.export(pin)?;
        let direction = self.pin_dir(pin).join("direction");
        // Writing "out" drives the pin low; leave pins that are already
        // outputs at whatever level they hold.
        let current = fs::read_to_string(&direction).unwrap_or_default();
        if current.trim() == "out" {
            return Ok(());
        }
        fs::write(&direction, "out").map_err(|e| {
            ThermaboxError::Hardware(format!("failed to set pin {} as output: {}", pin, e))
        })
    }

    fn write(&self, pin: u8, level: Level) -> Result<()> {
        let value = match level {
            Level::High => "1",
            Level::Low => "0",
        };
        fs::write(self.pin_dir(pin).join("value"), value)
            .map_err(|e| ThermaboxError::Hardware(format!("failed to write pin {}: {}", pin, e)))
    }

    fn read(&self, pin: u8) -> Result<Level> {
        let raw = fs::read_to_string(self.pin_dir(pin).join("value"))
            .map_err(|e| ThermaboxError::Hardware(format!("failed to read pin {}: {}", pin, e)))?;
        match raw.trim() {
            "1" => Ok(Level::High),
            "0" => Ok(Level::Low),
            other => Err(ThermaboxError::Hardware(format!(
                "unexpected value {:?} on pin {}",
                other, pin
            ))),
        }
    }
}
