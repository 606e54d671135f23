//! Types and traits shared between the controller and its observers.
//!
//! The status service (HTTP/WebSocket front-end) lives outside this crate and
//! talks to the controller only through [`ThermaboxControl`] and the
//! [`ThermaboxState`] snapshots delivered to registered listener channels.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::mpsc;

/// Discrete controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    #[default]
    Unknown,
    HeatingUp,
    CoolingDown,
    Stable,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::Unknown => "unknown",
            ControllerState::HeatingUp => "heating_up",
            ControllerState::CoolingDown => "cooling_down",
            ControllerState::Stable => "stable",
        }
    }

    /// Whether an element is being driven in this state.
    pub fn is_actuating(&self) -> bool {
        matches!(
            self,
            ControllerState::HeatingUp | ControllerState::CoolingDown
        )
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One probe's contribution to the extras map: a reading or why there is none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProbeReading {
    Value { temp: f64 },
    Error { error: String },
}

impl ProbeReading {
    pub fn value(&self) -> Option<f64> {
        match self {
            ProbeReading::Value { temp } => Some(*temp),
            ProbeReading::Error { .. } => None,
        }
    }
}

impl<E: fmt::Display> From<std::result::Result<f64, E>> for ProbeReading {
    fn from(result: std::result::Result<f64, E>) -> Self {
        match result {
            Ok(temp) => ProbeReading::Value { temp },
            Err(e) => ProbeReading::Error {
                error: e.to_string(),
            },
        }
    }
}

/// Snapshot published to listeners once per control cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermaboxState {
    pub temperature: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub state: ControllerState,
    pub extras: BTreeMap<String, ProbeReading>,
}

impl ThermaboxState {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Sending half of a listener channel.
pub type StateSender = mpsc::Sender<ThermaboxState>;

/// Operations the controller exposes to the status service.
#[async_trait]
pub trait ThermaboxControl: Send + Sync {
    /// Current reading of the primary probe.
    async fn temperature(&self) -> Result<f64>;

    /// Fresh readings from the primary and every secondary probe, by name.
    async fn all_temperatures(&self) -> BTreeMap<String, ProbeReading>;

    /// `(target, threshold)`.
    fn limits(&self) -> (f64, f64);

    fn set_limits(&self, temperature: f64, threshold: f64) -> Result<()>;

    /// Current state as its wire name, e.g. `"heating_up"`.
    fn state(&self) -> String;

    /// Start delivering snapshots to `listener`. Re-using a name replaces the old channel.
    fn register_channel(&self, listener: StateSender, name: &str);

    /// Resume actuation from `unknown`.
    fn enable(&self);

    /// Turn both elements off and suspend actuation.
    async fn disable(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_wire_names() {
        assert_eq!(
            serde_json::to_string(&ControllerState::HeatingUp).unwrap(),
            "\"heating_up\""
        );
        assert_eq!(
            serde_json::to_string(&ControllerState::CoolingDown).unwrap(),
            "\"cooling_down\""
        );
        assert_eq!(ControllerState::Stable.to_string(), "stable");
        assert_eq!(ControllerState::default().to_string(), "unknown");
    }

    #[test]
    fn test_snapshot_wire_format() {
        let mut extras = BTreeMap::new();
        extras.insert("box".to_string(), ProbeReading::Value { temp: 44.5 });
        extras.insert(
            "room".to_string(),
            ProbeReading::Error {
                error: "timeout".to_string(),
            },
        );
        let snapshot = ThermaboxState {
            temperature: 44.5,
            timestamp: 1_700_000_000_000,
            state: ControllerState::HeatingUp,
            extras,
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "temperature": 44.5,
                "timestamp": 1_700_000_000_000i64,
                "state": "heating_up",
                "extras": {
                    "box": {"temp": 44.5},
                    "room": {"error": "timeout"}
                }
            })
        );

        let back: ThermaboxState = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
        assert!(snapshot.to_json().unwrap().starts_with("{\"temperature\":44.5"));
    }

    #[test]
    fn test_probe_reading_from_result() {
        let ok: std::result::Result<f64, String> = Ok(21.0);
        assert_eq!(ProbeReading::from(ok).value(), Some(21.0));
        let err: std::result::Result<f64, String> = Err("gone".to_string());
        assert_eq!(
            ProbeReading::from(err),
            ProbeReading::Error {
                error: "gone".to_string()
            }
        );
    }
}
