//! Debounced heating/cooling element.
//!
//! An element is one relay switch plus a minimum idle time: once turned off
//! it refuses to come back on until the toggle delay has elapsed, protecting
//! compressors and heaters from short-cycling.

use crate::config::ElementConfig;
use crate::error::{Result, ThermaboxError};
use crate::gpio::GpioBackend;
use crate::relay::{ConfirmPolicy, Relay};
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub struct Element {
    name: String,
    relay: Arc<Relay>,
    switch: u32,
    toggle_delay: Duration,
    last_off: Mutex<Option<Instant>>,
}

impl Element {
    /// Wrap `switch` of `relay`. A zero `toggle_delay` disables debouncing.
    pub fn new(
        name: impl Into<String>,
        relay: Arc<Relay>,
        switch: u32,
        toggle_delay: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            relay,
            switch,
            toggle_delay,
            last_off: Mutex::new(None),
        }
    }

    /// Build the element and its own relay from configuration.
    pub fn from_config(
        name: impl Into<String>,
        config: &ElementConfig,
        gpio: Arc<dyn GpioBackend>,
        confirm: ConfirmPolicy,
    ) -> Result<Self> {
        let relay = Relay::from_config(&config.relay, gpio)?.with_confirm_policy(confirm);
        if !relay.switch_map().contains_key(&config.switch) {
            return Err(ThermaboxError::Config(format!(
                "switch {} not present in relay with {} pin(s)",
                config.switch,
                config.relay.pins.len()
            )));
        }
        Ok(Self::new(
            name,
            Arc::new(relay),
            config.switch,
            config.toggle_delay,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    pub fn switch(&self) -> u32 {
        self.switch
    }

    pub fn toggle_delay(&self) -> Duration {
        self.toggle_delay
    }

    pub fn is_on(&self) -> Result<bool> {
        self.relay.is_on(self.switch)
    }

    /// Turn the element on, unless it was turned off less than the toggle delay ago.
    pub async fn on(&self) -> Result<()> {
        if !self.toggle_delay.is_zero()
            && let Some(last_off) = *self.last_off.lock()
        {
            let idle = last_off.elapsed();
            if idle < self.toggle_delay {
                let remaining = self.toggle_delay - idle;
                debug!(
                    "[Element] {} on() refused, {:?} of toggle delay remaining",
                    self.name, remaining
                );
                return Err(ThermaboxError::ToggleDelay { remaining });
            }
        }
        self.relay.on(self.switch).await
    }

    /// Turn the element off. Always allowed; restarts the toggle-delay clock.
    pub async fn off(&self) -> Result<()> {
        *self.last_off.lock() = Some(Instant::now());
        self.relay.off(self.switch).await
    }

    /// Switch to the opposite of the current relay state.
    pub async fn toggle(&self) -> Result<()> {
        if self.is_on()? {
            self.off().await
        } else {
            self.on().await
        }
    }
}
