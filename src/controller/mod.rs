//! The thermabox controller.
//!
//! [`Thermabox`] owns the heating and cooling elements, a primary probe that
//! drives control and any number of report-only secondary probes. Its control
//! loop ([`Thermabox::run`]) reads the primary probe once per period, runs the
//! hysteresis state machine, commands the elements and publishes a
//! [`ThermaboxState`] snapshot to every registered listener.
//!
//! Locking:
//! - discrete state, limits and the disabled flag live behind one
//!   `parking_lot` mutex that is never held across an await;
//! - element commands are serialized by a separate async mutex so that
//!   `disable()` cannot interleave with a cycle's actuation;
//! - probe reads and relay confirmation polls run outside both locks.

pub mod hysteresis;
pub mod listeners;

pub use hysteresis::{Action, CutoffRule, Limits, Transition};
pub use listeners::ListenerRegistry;

use crate::config::ThermaboxConfig;
use crate::element::Element;
use crate::error::{Result, ThermaboxError};
use crate::gpio::GpioBackend;
use crate::interfaces::{
    ControllerState, ProbeReading, StateSender, ThermaboxControl, ThermaboxState,
};
use crate::probe::Probe;
use async_trait::async_trait;
use futures_util::future::join_all;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Static controller parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub limits: Limits,
    /// Readings above this shut the controller down. `Some(0.0)` means no cutoff.
    pub cutoff_temperature: Option<f64>,
    pub cutoff_rule: CutoffRule,
    pub disabled: bool,
    pub period: Duration,
    pub probe_grace: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            limits: Limits {
                target: 0.0,
                threshold: 0.0,
            },
            cutoff_temperature: None,
            cutoff_rule: CutoffRule::AtTarget { precision: 1 },
            disabled: false,
            period: Duration::from_millis(500),
            probe_grace: Duration::from_secs(10),
        }
    }
}

impl Settings {
    pub fn from_config(config: &ThermaboxConfig) -> Self {
        Self {
            limits: Limits {
                target: config.temperature,
                threshold: config.threshold,
            },
            cutoff_temperature: config.cutoff_temperature,
            cutoff_rule: if config.cutoff_at_threshold {
                CutoffRule::AtThreshold
            } else {
                CutoffRule::AtTarget {
                    precision: config.cutoff_precision,
                }
            },
            disabled: config.disabled,
            period: config.period,
            probe_grace: config.probe_grace,
        }
    }
}

struct ControlState {
    state: ControllerState,
    limits: Limits,
    disabled: bool,
}

pub struct Thermabox {
    heating: Element,
    cooling: Element,
    probe: RwLock<Arc<dyn Probe>>,
    secondary: RwLock<Vec<Arc<dyn Probe>>>,
    inner: Mutex<ControlState>,
    actuation: tokio::sync::Mutex<()>,
    listeners: ListenerRegistry,
    cutoff_temperature: Option<f64>,
    cutoff_rule: CutoffRule,
    period: Duration,
    probe_grace: Duration,
}

impl Thermabox {
    pub fn new(heating: Element, cooling: Element, probe: Arc<dyn Probe>, settings: Settings) -> Self {
        Self {
            heating,
            cooling,
            probe: RwLock::new(probe),
            secondary: RwLock::new(Vec::new()),
            inner: Mutex::new(ControlState {
                state: ControllerState::Unknown,
                limits: settings.limits,
                disabled: settings.disabled,
            }),
            actuation: tokio::sync::Mutex::new(()),
            listeners: ListenerRegistry::new(),
            cutoff_temperature: settings.cutoff_temperature.filter(|c| *c != 0.0),
            cutoff_rule: settings.cutoff_rule,
            period: settings.period,
            probe_grace: settings.probe_grace,
        }
    }

    /// Build both elements on `gpio` and wrap them around `probe`.
    ///
    /// Secondary probes are added separately since they need async setup.
    pub fn from_config(
        config: &ThermaboxConfig,
        gpio: Arc<dyn GpioBackend>,
        probe: Arc<dyn Probe>,
    ) -> Result<Self> {
        let heating = Element::from_config(
            "heating",
            &config.heating_element,
            gpio.clone(),
            config.relay_confirm,
        )?;
        let cooling =
            Element::from_config("cooling", &config.cooling_element, gpio, config.relay_confirm)?;
        Ok(Self::new(heating, cooling, probe, Settings::from_config(config)))
    }

    pub fn heating(&self) -> &Element {
        &self.heating
    }

    pub fn cooling(&self) -> &Element {
        &self.cooling
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn controller_state(&self) -> ControllerState {
        self.inner.lock().state
    }

    pub fn is_disabled(&self) -> bool {
        self.inner.lock().disabled
    }

    /// Replace the primary probe. Takes effect on the next cycle.
    pub fn set_probe(&self, probe: Arc<dyn Probe>) {
        info!("[Thermabox] Primary probe set to '{}'", probe.name());
        *self.probe.write() = probe;
    }

    pub fn add_secondary_probe(&self, probe: Arc<dyn Probe>) {
        info!("[Thermabox] Added secondary probe '{}'", probe.name());
        self.secondary.write().push(probe);
    }

    pub fn unregister_channel(&self, name: &str) -> bool {
        self.listeners.unregister(name)
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    fn primary(&self) -> Arc<dyn Probe> {
        self.probe.read().clone()
    }

    async fn read_secondaries(&self) -> Vec<(String, ProbeReading)> {
        let probes: Vec<Arc<dyn Probe>> = self.secondary.read().clone();
        let readings = join_all(probes.iter().map(|probe| probe.temperature())).await;
        probes
            .iter()
            .zip(readings)
            .map(|(probe, reading)| {
                if let Err(e) = &reading {
                    warn!("[Probe] Secondary probe '{}': {}", probe.name(), e);
                }
                (probe.name().to_string(), ProbeReading::from(reading))
            })
            .collect()
    }

    /// Turn both elements off, logging rather than returning failures.
    pub async fn shutdown(&self) {
        let _guard = self.actuation.lock().await;
        self.all_off().await;
    }

    async fn all_off(&self) {
        for element in [&self.heating, &self.cooling] {
            if let Err(e) = element.off().await {
                error!("[Thermabox] Failed to turn off {} element: {}", element.name(), e);
            }
        }
    }

    async fn element_on(&self, element: &Element) {
        if let Err(e) = element.on().await {
            if e.is_toggle_delay() {
                debug!("[Thermabox] {} element: {}", element.name(), e);
            } else {
                error!("[Thermabox] Failed to turn on {} element: {}", element.name(), e);
            }
        }
    }

    async fn element_off(&self, element: &Element) {
        if let Err(e) = element.off().await {
            error!("[Thermabox] Failed to turn off {} element: {}", element.name(), e);
        }
    }

    /// Re-drive the active element if a previous `on` was refused or lost.
    async fn reassert(&self, element: &Element) {
        match element.is_on() {
            Ok(true) => {}
            Ok(false) => {
                debug!("[Thermabox] Re-asserting {} element", element.name());
                self.element_on(element).await;
            }
            Err(e) => error!("[Thermabox] Failed to read {} element: {}", element.name(), e),
        }
    }

    async fn actuate(&self, action: Action, state: ControllerState) {
        match action {
            Action::Heat => {
                self.element_off(&self.cooling).await;
                self.element_on(&self.heating).await;
            }
            Action::Cool => {
                self.element_off(&self.heating).await;
                self.element_on(&self.cooling).await;
            }
            Action::AllOff => self.all_off().await,
            Action::Hold => match state {
                ControllerState::HeatingUp => self.reassert(&self.heating).await,
                ControllerState::CoolingDown => self.reassert(&self.cooling).await,
                ControllerState::Stable | ControllerState::Unknown => {}
            },
        }
    }

    /// Run one control cycle.
    ///
    /// `last_good` is the time of the last successful primary reading and is
    /// advanced on success. Returns the published snapshot, `None` when the
    /// reading failed inside the grace window, or a fatal error after both
    /// elements have been turned off.
    pub async fn cycle(&self, last_good: &mut Instant) -> Result<Option<ThermaboxState>> {
        let probe = self.primary();
        let temperature = match probe.temperature().await {
            Ok(temperature) => {
                *last_good = Instant::now();
                temperature
            }
            Err(e) => {
                let since = last_good.elapsed();
                if since > self.probe_grace {
                    error!("[Thermabox] No temperature for {:?}: {}", since, e);
                    self.shutdown().await;
                    return Err(ThermaboxError::SensorLost {
                        name: probe.name().to_string(),
                        since,
                        reason: e.to_string(),
                    });
                }
                warn!("[Thermabox] Failed to get temperature: {}", e);
                return Ok(None);
            }
        };

        if let Some(cutoff) = self.cutoff_temperature
            && temperature > cutoff
        {
            error!(
                "[Thermabox] Temperature > cutoff temperature: {:.2} > {:.2}",
                temperature, cutoff
            );
            self.shutdown().await;
            return Err(ThermaboxError::OverTemperature {
                temperature,
                cutoff,
            });
        }

        let state = {
            let _guard = self.actuation.lock().await;
            let (state, action) = {
                let mut inner = self.inner.lock();
                if inner.disabled {
                    (inner.state, None)
                } else {
                    let transition =
                        hysteresis::evaluate(inner.state, temperature, inner.limits, self.cutoff_rule);
                    if transition.next != inner.state {
                        info!(
                            "[Thermabox] temp={:.2} target={:.2} threshold={:.2} -> {}",
                            temperature, inner.limits.target, inner.limits.threshold, transition.next
                        );
                    }
                    inner.state = transition.next;
                    (transition.next, Some(transition.action))
                }
            };
            if let Some(action) = action {
                self.actuate(action, state).await;
            }
            state
        };
        debug!("[Thermabox] temp={}", temperature);

        let mut extras = BTreeMap::new();
        extras.insert(probe.name().to_string(), ProbeReading::Value { temp: temperature });
        extras.extend(self.read_secondaries().await);

        let snapshot = ThermaboxState {
            temperature,
            timestamp: chrono::Utc::now().timestamp_millis(),
            state,
            extras,
        };
        self.listeners.publish(&snapshot);
        Ok(Some(snapshot))
    }

    /// Drive the control loop until `token` is cancelled or a fatal fault occurs.
    ///
    /// Both elements are off whenever this returns.
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        info!(
            "[Thermabox] Control loop started (period={:?}, grace={:?})",
            self.period, self.probe_grace
        );
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_good = Instant::now();

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let result = tokio::select! {
                _ = token.cancelled() => break,
                result = self.cycle(&mut last_good) => result,
            };
            match result {
                Err(e) if e.is_fatal() => {
                    error!("[Thermabox] Control loop stopped: {}", e);
                    return Err(e);
                }
                Err(e) => warn!("[Thermabox] Cycle failed: {}", e),
                Ok(_) => {}
            }
        }

        info!("[Thermabox] Control loop cancelled, turning elements off");
        self.shutdown().await;
        Ok(())
    }
}

#[async_trait]
impl ThermaboxControl for Thermabox {
    async fn temperature(&self) -> Result<f64> {
        self.primary().temperature().await
    }

    async fn all_temperatures(&self) -> BTreeMap<String, ProbeReading> {
        let probe = self.primary();
        let (primary, secondary) = tokio::join!(probe.temperature(), self.read_secondaries());
        if let Err(e) = &primary {
            warn!("[Probe] Primary probe '{}': {}", probe.name(), e);
        }
        let mut readings = BTreeMap::new();
        readings.insert(probe.name().to_string(), ProbeReading::from(primary));
        readings.extend(secondary);
        readings
    }

    fn limits(&self) -> (f64, f64) {
        let limits = self.inner.lock().limits;
        (limits.target, limits.threshold)
    }

    fn set_limits(&self, temperature: f64, threshold: f64) -> Result<()> {
        if !temperature.is_finite() || !threshold.is_finite() {
            return Err(ThermaboxError::Config(
                "limits must be finite numbers".to_string(),
            ));
        }
        if threshold < 0.0 {
            return Err(ThermaboxError::Config(
                "threshold must not be negative".to_string(),
            ));
        }
        self.inner.lock().limits = Limits {
            target: temperature,
            threshold,
        };
        info!(
            "[Thermabox] Limits set: target={:.2} threshold={:.2}",
            temperature, threshold
        );
        Ok(())
    }

    fn state(&self) -> String {
        self.controller_state().to_string()
    }

    fn register_channel(&self, listener: StateSender, name: &str) {
        self.listeners.register(name, listener);
    }

    fn enable(&self) {
        let mut inner = self.inner.lock();
        inner.state = ControllerState::Unknown;
        inner.disabled = false;
        info!("[Thermabox] Enabled");
    }

    async fn disable(&self) {
        self.inner.lock().disabled = true;
        info!("[Thermabox] Disabled, turning elements off");
        self.shutdown().await;
    }
}
