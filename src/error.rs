use std::time::Duration;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum ThermaboxError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("GPIO hardware error: {0}")]
    Hardware(String),

    #[error("Switch {0} not initialized in relay")]
    UnknownSwitch(u32),

    #[error("Relay switch {switch} did not read back {wanted} after {attempts} attempts")]
    RelayUnconfirmed {
        switch: u32,
        wanted: &'static str,
        attempts: u32,
    },

    #[error("Minimum toggle delay not elapsed ({remaining:?} remaining)")]
    ToggleDelay { remaining: Duration },

    #[error("Failed to connect probe {name}: {reason}")]
    ProbeConnect { name: String, reason: String },

    #[error("Failed to get temperature from probe {name}: {reason}")]
    ProbeRead { name: String, reason: String },

    #[error("No temperature from probe {name} for {since:?}: {reason}")]
    SensorLost {
        name: String,
        since: Duration,
        reason: String,
    },

    #[error("Temperature {temperature:.2} exceeds cutoff temperature {cutoff:.2}")]
    OverTemperature { temperature: f64, cutoff: f64 },

    #[error("Another thermabox instance is already running (lock {0})")]
    AlreadyRunning(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),

    #[error(transparent)]
    YamlError(#[from] serde_yaml::Error),
}

impl ThermaboxError {
    /// Whether this error must stop the control loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::Hardware(_)
                | Self::SensorLost { .. }
                | Self::OverTemperature { .. }
                | Self::AlreadyRunning(_)
        )
    }

    /// Debounce rejections are expected during normal operation.
    pub fn is_toggle_delay(&self) -> bool {
        matches!(self, Self::ToggleDelay { .. })
    }

    pub(crate) fn probe_read(name: &str, reason: impl ToString) -> Self {
        Self::ProbeRead {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ThermaboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(
            ThermaboxError::OverTemperature {
                temperature: 61.0,
                cutoff: 60.0
            }
            .is_fatal()
        );
        assert!(
            ThermaboxError::SensorLost {
                name: "box".to_string(),
                since: Duration::from_secs(11),
                reason: "timeout".to_string(),
            }
            .is_fatal()
        );
        // A single failed read is tolerated by the control loop
        assert!(!ThermaboxError::probe_read("box", "timeout").is_fatal());
        assert!(
            !ThermaboxError::ProbeConnect {
                name: "box".to_string(),
                reason: "refused".to_string(),
            }
            .is_fatal()
        );
        assert!(!ThermaboxError::UnknownSwitch(3).is_fatal());
        assert!(
            !ThermaboxError::ToggleDelay {
                remaining: Duration::from_secs(1)
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            ThermaboxError::UnknownSwitch(4).to_string(),
            "Switch 4 not initialized in relay"
        );
        assert_eq!(
            ThermaboxError::OverTemperature {
                temperature: 61.0,
                cutoff: 60.0
            }
            .to_string(),
            "Temperature 61.00 exceeds cutoff temperature 60.00"
        );
    }
}
