//! GPIO access for relay boards.
//!
//! Relays only ever need three things from the pin layer: switch a pin to
//! output mode, drive it, and read its level back. [`GpioBackend`] captures
//! exactly that so the relay logic runs the same against the Linux sysfs
//! interface and the in-memory board used by tests and dry runs.

pub mod mock;
pub mod sysfs;

pub use mock::MockGpio;
pub use sysfs::SysfsGpio;

use crate::error::Result;
use std::ops::Not;

/// Electrical level of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl Not for Level {
    type Output = Level;

    fn not(self) -> Level {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

/// Pin-level operations a relay needs from the GPIO subsystem.
///
/// Implementations are shared between relays, so every method takes `&self`.
pub trait GpioBackend: Send + Sync {
    /// Put `pin` in output mode. Must be called before any write.
    fn setup_output(&self, pin: u8) -> Result<()>;

    /// Drive `pin` to `level`.
    fn write(&self, pin: u8, level: Level) -> Result<()>;

    /// Read the current level of `pin`.
    fn read(&self, pin: u8) -> Result<Level>;

    /// Flip the level of `pin`.
    fn toggle(&self, pin: u8) -> Result<()> {
        let level = self.read(pin)?;
        self.write(pin, !level)
    }
}
