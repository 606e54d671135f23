//! Thermabox configuration.
//!
//! The YAML file is decoded in two phases: it is first parsed into a generic
//! [`serde_yaml::Value`] document, then every key is validated (with the
//! defaults documented on [`ThermaboxConfig`]) into typed structs. Components
//! are built from the typed structs by their own modules.
//!
//! ```yaml
//! heating_element:
//!   relay:
//!     active_high: false
//!     pins: [22]
//! cooling_element:
//!   relay:
//!     active_high: false
//!     pins: [23]
//!   toggle_delay_sec: 30
//! temperature: 45
//! threshold: 0.5
//! cutoff_temperature: 60
//! probe:
//!   type: http
//!   name: thermabox-probe
//!   url: http://probe.local/temp
//! extra_probes:
//!   - name: room
//!     url: http://room.local/temp
//! ```

use crate::error::{Result, ThermaboxError};
use crate::relay::ConfirmPolicy;
use log::debug;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level keys understood by the controller. Anything else (for example
/// the status service's `webserver` block) is left to other consumers.
const KNOWN_KEYS: &[&str] = &[
    "heating_element",
    "cooling_element",
    "temperature",
    "threshold",
    "cutoff_temperature",
    "cutoff_at_threshold",
    "cutoff_precision",
    "disabled",
    "period_ms",
    "probe_grace_sec",
    "relay_confirm_interval_ms",
    "relay_confirm_attempts",
    "probe",
    "extra_probes",
];

const MAX_CUTOFF_PRECISION: u32 = 6;

/// Relay bank: polarity plus pins in switch order.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Default `false` (relay boards are usually active-low).
    pub active_high: bool,
    /// Required, non-empty, unique.
    pub pins: Vec<u8>,
}

/// Heating or cooling element.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementConfig {
    pub relay: RelayConfig,
    /// Relay switch driven by this element. Default `1`.
    pub switch: u32,
    /// Minimum idle time after `off` before `on` is allowed. Default 0.
    pub toggle_delay: Duration,
}

/// Temperature source selection.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeConfig {
    Http { name: String, url: String },
    Ws { name: String, url: String },
    Local { name: String, path: PathBuf },
    Simulated { name: String, value: f64 },
}

/// Probe name used when none is configured.
pub const DEFAULT_PROBE_NAME: &str = "thermabox-probe";

impl ProbeConfig {
    /// Interpret a command-line sensor selection.
    ///
    /// `config` defers to the file's `probe:` block (returns `None`),
    /// `local:<path>` and `sim:<value>` pick those probe types, `ws://` and
    /// `wss://` URLs select a WebSocket probe and anything else is taken as
    /// an HTTP URL.
    pub fn from_sensor_arg(sensor: &str) -> Result<Option<Self>> {
        let name = DEFAULT_PROBE_NAME.to_string();
        let config = if sensor == "config" {
            return Ok(None);
        } else if let Some(path) = sensor.strip_prefix("local:") {
            ProbeConfig::Local {
                name,
                path: PathBuf::from(path),
            }
        } else if let Some(value) = sensor.strip_prefix("sim:") {
            let value = value.parse::<f64>().map_err(|_| {
                ThermaboxError::Config(format!("invalid simulated temperature '{}'", value))
            })?;
            ProbeConfig::Simulated { name, value }
        } else if sensor.starts_with("ws://") || sensor.starts_with("wss://") {
            ProbeConfig::Ws {
                name,
                url: sensor.to_string(),
            }
        } else {
            ProbeConfig::Http {
                name,
                url: sensor.to_string(),
            }
        };
        Ok(Some(config))
    }

    pub fn name(&self) -> &str {
        match self {
            ProbeConfig::Http { name, .. }
            | ProbeConfig::Ws { name, .. }
            | ProbeConfig::Local { name, .. }
            | ProbeConfig::Simulated { name, .. } => name,
        }
    }
}

/// Validated controller configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermaboxConfig {
    pub heating_element: ElementConfig,
    pub cooling_element: ElementConfig,
    /// Target temperature. Default 0.
    pub temperature: f64,
    /// Half-width of the hysteresis band. Default 0, never negative.
    pub threshold: f64,
    /// Absolute safety cutoff; `cutoff_temperature: 0` (the default) disables it.
    pub cutoff_temperature: Option<f64>,
    /// Stop actuating on re-entering the band instead of on reaching the target. Default `false`.
    pub cutoff_at_threshold: bool,
    /// Decimal places used when comparing against the target. Default 1.
    pub cutoff_precision: u32,
    /// Start with actuation suspended. Default `false`.
    pub disabled: bool,
    /// Control cycle period. Default 500 ms.
    pub period: Duration,
    /// How long the primary probe may fail before the loop shuts down. Default 10 s.
    pub probe_grace: Duration,
    /// Relay read-back policy. Default 500 ms × 20.
    pub relay_confirm: ConfirmPolicy,
    /// Primary probe. Optional here; the CLI can select one instead.
    pub probe: Option<ProbeConfig>,
    /// Report-only probes. Default none.
    pub extra_probes: Vec<ProbeConfig>,
}

impl ThermaboxConfig {
    /// Read and decode a YAML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ThermaboxError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let document: Value = serde_yaml::from_str(content)?;
        Self::from_document(&document)
    }

    /// Validate a generic YAML document into a typed configuration.
    pub fn from_document(document: &Value) -> Result<Self> {
        let root = Section::root(document)?;
        for key in root.map.keys().filter_map(Value::as_str) {
            if !KNOWN_KEYS.contains(&key) {
                debug!("[Config] Ignoring key '{}'", key);
            }
        }

        let threshold = root.f64_or("threshold", 0.0)?;
        if threshold < 0.0 {
            return Err(root.invalid("threshold", "must not be negative"));
        }

        let cutoff = root.f64_or("cutoff_temperature", 0.0)?;
        let cutoff_precision = root.u64_or("cutoff_precision", 1)?;
        if cutoff_precision > MAX_CUTOFF_PRECISION as u64 {
            return Err(root.invalid(
                "cutoff_precision",
                &format!("must be at most {}", MAX_CUTOFF_PRECISION),
            ));
        }

        let period_ms = root.u64_or("period_ms", 500)?;
        if period_ms == 0 {
            return Err(root.invalid("period_ms", "must be positive"));
        }
        let attempts = root.u64_or("relay_confirm_attempts", 20)?;
        if attempts == 0 || attempts > u32::MAX as u64 {
            return Err(root.invalid("relay_confirm_attempts", "must be at least 1"));
        }

        let probe_grace = Duration::try_from_secs_f64(root.f64_or("probe_grace_sec", 10.0)?)
            .map_err(|_| root.invalid("probe_grace_sec", "must be a non-negative number of seconds in range"))?;

        let probe = match root.get("probe") {
            Some(_) => Some(decode_probe(&root.section("probe")?)?),
            None => None,
        };
        let extra_probes = match root.get("extra_probes") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(entries)) => entries
                .iter()
                .enumerate()
                .map(|(idx, entry)| {
                    Section::nested(format!("extra_probes[{}]", idx), entry)
                        .and_then(|s| decode_probe(&s))
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => return Err(root.invalid("extra_probes", "must be a list")),
        };

        Ok(Self {
            heating_element: decode_element(&root.section("heating_element")?)?,
            cooling_element: decode_element(&root.section("cooling_element")?)?,
            temperature: root.f64_or("temperature", 0.0)?,
            threshold,
            cutoff_temperature: (cutoff != 0.0).then_some(cutoff),
            cutoff_at_threshold: root.bool_or("cutoff_at_threshold", false)?,
            cutoff_precision: cutoff_precision as u32,
            disabled: root.bool_or("disabled", false)?,
            period: Duration::from_millis(period_ms),
            probe_grace,
            relay_confirm: ConfirmPolicy {
                interval: Duration::from_millis(root.u64_or("relay_confirm_interval_ms", 500)?),
                attempts: attempts as u32,
            },
            probe,
            extra_probes,
        })
    }

    /// Apply `THERMABOX_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("THERMABOX_TEMPERATURE")
            && let Ok(t) = value.parse()
        {
            self.temperature = t;
        }
        if let Some(value) = lookup("THERMABOX_THRESHOLD")
            && let Ok(t) = value.parse::<f64>()
            && t >= 0.0
        {
            self.threshold = t;
        }
        if let Some(value) = lookup("THERMABOX_DISABLED")
            && let Ok(d) = value.parse()
        {
            self.disabled = d;
        }
    }
}

fn decode_element(section: &Section<'_>) -> Result<ElementConfig> {
    let relay = section.section("relay")?;
    let pins = match relay.get("pins") {
        Some(Value::Sequence(pins)) if !pins.is_empty() => pins
            .iter()
            .map(|pin| {
                pin.as_u64()
                    .and_then(|p| u8::try_from(p).ok())
                    .ok_or_else(|| relay.invalid("pins", &format!("{:?} is not a pin number", pin)))
            })
            .collect::<Result<Vec<u8>>>()?,
        Some(_) => return Err(relay.invalid("pins", "must be a non-empty list")),
        None => return Err(relay.missing("pins")),
    };
    let mut sorted = pins.clone();
    sorted.sort_unstable();
    if sorted.windows(2).any(|w| w[0] == w[1]) {
        return Err(relay.invalid("pins", "contains duplicates"));
    }

    let switch = section.u64_or("switch", 1)?;
    if switch == 0 || switch > pins.len() as u64 {
        return Err(section.invalid("switch", "must name one of the relay's pins (1-based)"));
    }

    Ok(ElementConfig {
        relay: RelayConfig {
            active_high: relay.bool_or("active_high", false)?,
            pins,
        },
        switch: switch as u32,
        toggle_delay: Duration::from_secs(section.u64_or("toggle_delay_sec", 0)?),
    })
}

fn decode_probe(section: &Section<'_>) -> Result<ProbeConfig> {
    let kind = section.str_or("type", "http")?;
    let name = section.str_or("name", DEFAULT_PROBE_NAME)?.to_string();
    match kind {
        "http" => Ok(ProbeConfig::Http {
            name,
            url: section.required_str("url")?.to_string(),
        }),
        "ws" => Ok(ProbeConfig::Ws {
            name,
            url: section.required_str("url")?.to_string(),
        }),
        "local" => Ok(ProbeConfig::Local {
            name,
            path: PathBuf::from(section.required_str("path")?),
        }),
        "simulated" => Ok(ProbeConfig::Simulated {
            name,
            value: section.f64_or("value", 20.0)?,
        }),
        other => Err(section.invalid("type", &format!("unknown probe type '{}'", other))),
    }
}

/// A mapping in the document together with its dotted path, for error messages.
struct Section<'a> {
    path: String,
    map: &'a Mapping,
}

impl<'a> Section<'a> {
    fn root(document: &'a Value) -> Result<Self> {
        Self::nested(String::new(), document)
    }

    fn nested(path: String, value: &'a Value) -> Result<Self> {
        match value {
            Value::Mapping(map) => Ok(Self { path, map }),
            _ => Err(ThermaboxError::Config(if path.is_empty() {
                "document must be a mapping".to_string()
            } else {
                format!("'{}' must be a mapping", path)
            })),
        }
    }

    fn key_path(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.path, key)
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key)
    }

    fn missing(&self, key: &str) -> ThermaboxError {
        ThermaboxError::Config(format!("missing required key '{}'", self.key_path(key)))
    }

    fn invalid(&self, key: &str, reason: &str) -> ThermaboxError {
        ThermaboxError::Config(format!("'{}' {}", self.key_path(key), reason))
    }

    fn section(&self, key: &str) -> Result<Section<'a>> {
        let value = self.get(key).ok_or_else(|| self.missing(key))?;
        Section::nested(self.key_path(key), value)
    }

    fn f64_or(&self, key: &str, default: f64) -> Result<f64> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_f64()
                .filter(|v| v.is_finite())
                .ok_or_else(|| self.invalid(key, "must be a number")),
        }
    }

    fn u64_or(&self, key: &str, default: u64) -> Result<u64> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_u64()
                .ok_or_else(|| self.invalid(key, "must be a non-negative integer")),
        }
    }

    fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_bool()
                .ok_or_else(|| self.invalid(key, "must be true or false")),
        }
    }

    fn str_or(&self, key: &str, default: &'a str) -> Result<&'a str> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_str()
                .ok_or_else(|| self.invalid(key, "must be a string")),
        }
    }

    fn required_str(&self, key: &str) -> Result<&'a str> {
        self.get(key)
            .ok_or_else(|| self.missing(key))?
            .as_str()
            .ok_or_else(|| self.invalid(key, "must be a string"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
heating_element:
  relay:
    pins: [22]
cooling_element:
  relay:
    pins: [23]
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = ThermaboxConfig::from_yaml_str(MINIMAL).unwrap();
        assert_eq!(
            config.heating_element,
            ElementConfig {
                relay: RelayConfig {
                    active_high: false,
                    pins: vec![22],
                },
                switch: 1,
                toggle_delay: Duration::ZERO,
            }
        );
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.threshold, 0.0);
        assert_eq!(config.cutoff_temperature, None);
        assert!(!config.cutoff_at_threshold);
        assert_eq!(config.cutoff_precision, 1);
        assert!(!config.disabled);
        assert_eq!(config.period, Duration::from_millis(500));
        assert_eq!(config.probe_grace, Duration::from_secs(10));
        assert_eq!(config.relay_confirm, ConfirmPolicy::default());
        assert_eq!(config.probe, None);
        assert!(config.extra_probes.is_empty());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
heating_element:
  relay:
    active_high: false
    pins: [22]
cooling_element:
  relay:
    active_high: true
    pins: [23, 24]
  switch: 2
  toggle_delay_sec: 30
temperature: 45
threshold: 0.5
cutoff_temperature: 60
cutoff_at_threshold: true
cutoff_precision: 2
disabled: true
period_ms: 250
probe_grace_sec: 5
probe:
  type: ws
  name: box
  url: ws://probe.local/ws
extra_probes:
  - name: room
    url: http://room.local/temp
  - type: local
    name: board
    path: /sys/class/hwmon/hwmon0/temp1_input
webserver:
  port: 8080
"#;
        let config = ThermaboxConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.cooling_element.relay.pins, vec![23, 24]);
        assert!(config.cooling_element.relay.active_high);
        assert_eq!(config.cooling_element.switch, 2);
        assert_eq!(config.cooling_element.toggle_delay, Duration::from_secs(30));
        assert_eq!(config.temperature, 45.0);
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.cutoff_temperature, Some(60.0));
        assert!(config.cutoff_at_threshold);
        assert_eq!(config.cutoff_precision, 2);
        assert!(config.disabled);
        assert_eq!(config.period, Duration::from_millis(250));
        assert_eq!(config.probe_grace, Duration::from_secs(5));
        assert_eq!(
            config.probe,
            Some(ProbeConfig::Ws {
                name: "box".to_string(),
                url: "ws://probe.local/ws".to_string()
            })
        );
        assert_eq!(
            config.extra_probes,
            vec![
                ProbeConfig::Http {
                    name: "room".to_string(),
                    url: "http://room.local/temp".to_string()
                },
                ProbeConfig::Local {
                    name: "board".to_string(),
                    path: PathBuf::from("/sys/class/hwmon/hwmon0/temp1_input")
                },
            ]
        );
    }

    fn config_error(yaml: &str) -> String {
        match ThermaboxConfig::from_yaml_str(yaml) {
            Err(ThermaboxError::Config(msg)) => msg,
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_element_is_config_error() {
        let msg = config_error("heating_element:\n  relay:\n    pins: [22]\n");
        assert!(msg.contains("cooling_element"), "{msg}");
    }

    #[test]
    fn test_malformed_pins() {
        let msg = config_error(
            "heating_element:\n  relay:\n    pins: []\ncooling_element:\n  relay:\n    pins: [23]\n",
        );
        assert!(msg.contains("heating_element.relay.pins"), "{msg}");

        let msg = config_error(
            "heating_element:\n  relay:\n    pins: [22, 300]\ncooling_element:\n  relay:\n    pins: [23]\n",
        );
        assert!(msg.contains("not a pin number"), "{msg}");

        let msg = config_error(
            "heating_element:\n  relay:\n    pins: [22, 22]\ncooling_element:\n  relay:\n    pins: [23]\n",
        );
        assert!(msg.contains("duplicates"), "{msg}");
    }

    #[test]
    fn test_invalid_scalars() {
        let msg = config_error(&format!("{MINIMAL}threshold: -1\n"));
        assert!(msg.contains("threshold"), "{msg}");

        let msg = config_error(&format!("{MINIMAL}temperature: warm\n"));
        assert!(msg.contains("temperature"), "{msg}");

        let msg = config_error(&format!("{MINIMAL}cutoff_at_threshold: 3\n"));
        assert!(msg.contains("cutoff_at_threshold"), "{msg}");

        let msg = config_error(&format!("{MINIMAL}probe_grace_sec: 1.0e30\n"));
        assert!(msg.contains("probe_grace_sec"), "{msg}");

        let msg = config_error(&format!("{MINIMAL}probe_grace_sec: -1\n"));
        assert!(msg.contains("probe_grace_sec"), "{msg}");

        let msg = config_error(&format!("{MINIMAL}probe:\n  type: usb\n"));
        assert!(msg.contains("unknown probe type"), "{msg}");

        let msg = config_error(&format!("{MINIMAL}probe:\n  type: http\n"));
        assert!(msg.contains("probe.url"), "{msg}");
    }

    #[test]
    fn test_sensor_arg() {
        assert_eq!(ProbeConfig::from_sensor_arg("config").unwrap(), None);
        assert_eq!(
            ProbeConfig::from_sensor_arg("http://probe.local/temp").unwrap(),
            Some(ProbeConfig::Http {
                name: DEFAULT_PROBE_NAME.to_string(),
                url: "http://probe.local/temp".to_string()
            })
        );
        assert!(matches!(
            ProbeConfig::from_sensor_arg("ws://probe.local/ws").unwrap(),
            Some(ProbeConfig::Ws { .. })
        ));
        assert_eq!(
            ProbeConfig::from_sensor_arg("local:/sys/bus/w1/devices/28-01/w1_slave").unwrap(),
            Some(ProbeConfig::Local {
                name: DEFAULT_PROBE_NAME.to_string(),
                path: PathBuf::from("/sys/bus/w1/devices/28-01/w1_slave")
            })
        );
        assert_eq!(
            ProbeConfig::from_sensor_arg("sim:44.5").unwrap(),
            Some(ProbeConfig::Simulated {
                name: DEFAULT_PROBE_NAME.to_string(),
                value: 44.5
            })
        );
        assert!(ProbeConfig::from_sensor_arg("sim:hot").is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = ThermaboxConfig::from_yaml_str(MINIMAL).unwrap();
        config.apply_overrides(|key| match key {
            "THERMABOX_TEMPERATURE" => Some("37.5".to_string()),
            "THERMABOX_THRESHOLD" => Some("-2".to_string()),
            "THERMABOX_DISABLED" => Some("true".to_string()),
            _ => None,
        });
        assert_eq!(config.temperature, 37.5);
        // Negative thresholds are ignored
        assert_eq!(config.threshold, 0.0);
        assert!(config.disabled);
    }
}
