//! Polarity-aware relay board with confirmed switching.
//!
//! A relay maps logical switch numbers (1-based, in configuration order) to
//! physical GPIO pins. Turning a switch on or off is a *confirmed* operation:
//! the pin is driven and then read back until it reports the requested state,
//! because electromechanical contacts can take a moment to settle.

use crate::config::RelayConfig;
use crate::error::{Result, ThermaboxError};
use crate::gpio::{GpioBackend, Level};
use log::{debug, warn};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// How long a confirmed switch operation keeps re-checking the read-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmPolicy {
    /// Delay between read-back attempts.
    pub interval: Duration,
    /// Maximum number of drive/read-back attempts.
    pub attempts: u32,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            attempts: 20,
        }
    }
}

/// A bank of relay switches sharing one polarity.
pub struct Relay {
    active_high: bool,
    switch_map: BTreeMap<u32, u8>,
    gpio: Arc<dyn GpioBackend>,
    confirm: ConfirmPolicy,
}

impl Relay {
    /// Build a relay over `pins`, assigning switch IDs 1..=N in list order.
    ///
    /// Every pin is put in output mode; no initial level is forced.
    pub fn new(gpio: Arc<dyn GpioBackend>, active_high: bool, pins: &[u8]) -> Result<Self> {
        let mut seen = HashSet::new();
        if let Some(dup) = pins.iter().find(|p| !seen.insert(**p)) {
            return Err(ThermaboxError::Config(format!(
                "pin {} listed twice in relay",
                dup
            )));
        }

        let mut switch_map = BTreeMap::new();
        for (idx, &pin) in pins.iter().enumerate() {
            gpio.setup_output(pin)?;
            switch_map.insert(idx as u32 + 1, pin);
        }
        debug!(
            "[Relay] Built relay (active_high={}) with switches {:?}",
            active_high, switch_map
        );

        Ok(Self {
            active_high,
            switch_map,
            gpio,
            confirm: ConfirmPolicy::default(),
        })
    }

    pub fn from_config(config: &RelayConfig, gpio: Arc<dyn GpioBackend>) -> Result<Self> {
        Self::new(gpio, config.active_high, &config.pins)
    }

    /// Replace the read-back policy used by [`on`](Self::on) and [`off`](Self::off).
    pub fn with_confirm_policy(mut self, confirm: ConfirmPolicy) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn active_high(&self) -> bool {
        self.active_high
    }

    /// Logical switch → physical pin mapping.
    pub fn switch_map(&self) -> &BTreeMap<u32, u8> {
        &self.switch_map
    }

    fn pin(&self, switch: u32) -> Result<u8> {
        self.switch_map
            .get(&switch)
            .copied()
            .ok_or(ThermaboxError::UnknownSwitch(switch))
    }

    fn on_level(&self) -> Level {
        Level::from(self.active_high)
    }

    /// Flip the switch level without confirmation.
    pub fn toggle(&self, switch: u32) -> Result<()> {
        let pin = self.pin(switch)?;
        self.gpio.toggle(pin)
    }

    /// Read the switch and compare against the polarity's "on" level.
    pub fn is_on(&self, switch: u32) -> Result<bool> {
        let pin = self.pin(switch)?;
        Ok(self.gpio.read(pin)? == self.on_level())
    }

    /// Energize the switch and wait until the read-back confirms it.
    pub async fn on(&self, switch: u32) -> Result<()> {
        self.set_confirmed(switch, true).await
    }

    /// De-energize the switch and wait until the read-back confirms it.
    pub async fn off(&self, switch: u32) -> Result<()> {
        self.set_confirmed(switch, false).await
    }

    async fn set_confirmed(&self, switch: u32, on: bool) -> Result<()> {
        let pin = self.pin(switch)?;
        let level = if on { self.on_level() } else { !self.on_level() };
        let wanted = if on { "on" } else { "off" };
        let attempts = self.confirm.attempts.max(1);

        for attempt in 1..=attempts {
            self.gpio.write(pin, level)?;
            if self.is_on(switch)? == on {
                return Ok(());
            }
            warn!(
                "[Relay] Switch {} (pin {}) not {} yet, retrying ({}/{})",
                switch, pin, wanted, attempt, attempts
            );
            if attempt < attempts {
                tokio::time::sleep(self.confirm.interval).await;
            }
        }

        Err(ThermaboxError::RelayUnconfirmed {
            switch,
            wanted,
            attempts,
        })
    }
}
