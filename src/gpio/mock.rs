//! In-memory GPIO board.
//!
//! Tracks pin levels in a map instead of touching hardware. Used by the test
//! suite and by dry runs on machines without a GPIO header. Supports fault
//! injection: a *stuck* pin ignores writes (contacts that never settle) and a
//! *broken* pin fails every read.

use super::{GpioBackend, Level};
use crate::error::{Result, ThermaboxError};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Default)]
struct Board {
    levels: HashMap<u8, Level>,
    stuck: HashSet<u8>,
    broken: HashSet<u8>,
}

/// In-memory implementation of [`GpioBackend`].
#[derive(Default)]
pub struct MockGpio {
    board: Mutex<Board>,
    writes: AtomicU32,
}

impl MockGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `pin` ignore writes; its level stays where it is.
    pub fn set_stuck(&self, pin: u8, stuck: bool) {
        let mut board = self.board.lock();
        if stuck {
            board.stuck.insert(pin);
        } else {
            board.stuck.remove(&pin);
        }
    }

    /// Make every read of `pin` fail.
    pub fn set_broken(&self, pin: u8, broken: bool) {
        let mut board = self.board.lock();
        if broken {
            board.broken.insert(pin);
        } else {
            board.broken.remove(&pin);
        }
    }

    /// Force a level without counting it as a write.
    pub fn set_level(&self, pin: u8, level: Level) {
        self.board.lock().levels.insert(pin, level);
    }

    /// Current level of `pin`, `None` if it was never configured.
    pub fn level(&self, pin: u8) -> Option<Level> {
        self.board.lock().levels.get(&pin).copied()
    }

    pub fn is_output(&self, pin: u8) -> bool {
        self.board.lock().levels.contains_key(&pin)
    }

    /// Total number of writes issued against the board.
    pub fn write_count(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }
}

impl GpioBackend for MockGpio {
    fn setup_output(&self, pin: u8) -> Result<()> {
        self.board.lock().levels.entry(pin).or_insert(Level::Low);
        Ok(())
    }

    fn write(&self, pin: u8, level: Level) -> Result<()> {
        let mut board = self.board.lock();
        if !board.levels.contains_key(&pin) {
            return Err(ThermaboxError::Hardware(format!(
                "pin {} not configured as output",
                pin
            )));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        if !board.stuck.contains(&pin) {
            board.levels.insert(pin, level);
        }
        Ok(())
    }

    fn read(&self, pin: u8) -> Result<Level> {
        let board = self.board.lock();
        if board.broken.contains(&pin) {
            return Err(ThermaboxError::Hardware(format!("read of pin {} failed", pin)));
        }
        board
            .levels
            .get(&pin)
            .copied()
            .ok_or_else(|| ThermaboxError::Hardware(format!("pin {} not configured", pin)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_requires_output_mode() {
        let gpio = MockGpio::new();
        assert!(gpio.write(7, Level::High).is_err());
        assert_eq!(gpio.write_count(), 0);

        gpio.setup_output(7).unwrap();
        gpio.write(7, Level::High).unwrap();
        assert_eq!(gpio.level(7), Some(Level::High));
        assert_eq!(gpio.write_count(), 1);
    }

    #[test]
    fn test_stuck_pin_ignores_writes() {
        let gpio = MockGpio::new();
        gpio.setup_output(3).unwrap();
        gpio.set_stuck(3, true);
        gpio.write(3, Level::High).unwrap();
        assert_eq!(gpio.read(3).unwrap(), Level::Low);
        assert_eq!(gpio.write_count(), 1);
    }

    #[test]
    fn test_broken_pin_fails_reads() {
        let gpio = MockGpio::new();
        gpio.setup_output(4).unwrap();
        gpio.set_broken(4, true);
        assert!(matches!(gpio.read(4), Err(ThermaboxError::Hardware(_))));
        gpio.set_broken(4, false);
        assert_eq!(gpio.read(4).unwrap(), Level::Low);
    }
}
