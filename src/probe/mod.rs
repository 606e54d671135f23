//! Temperature probes.
//!
//! Every temperature source implements [`Probe`]: a name, an initializer
//! that opens whatever live resource the probe needs, and a read. Network
//! probes retry a failed read a bounded number of times (see
//! [`RetryPolicy`]); the local sensor reads directly.
//!
//! Current probe types:
//! - `local`: Linux temperature file (hwmon / thermal zone / DS18B20 1-wire)
//! - `http`: polled HTTP endpoint returning a plain number
//! - `ws`: persistent WebSocket session answering `temp` requests
//! - `simulated`: in-memory value for dry runs and tests

pub mod http;
pub mod local;
pub mod simulated;
pub mod ws;

pub use http::HttpProbe;
pub use local::LocalProbe;
pub use simulated::SimulatedProbe;
pub use ws::WsProbe;

use crate::config::ProbeConfig;
use crate::error::{Result, ThermaboxError};
use async_trait::async_trait;
use log::{debug, info};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A named temperature source.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Name used as the key in published extras.
    fn name(&self) -> &str;

    /// Open the probe's live resource. Must succeed before the first read.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Read the current temperature in degrees.
    async fn temperature(&self) -> Result<f64>;
}

/// Bounded retry for network probe reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Run `attempt` until it succeeds or the attempts are used up,
    /// returning the last error.
    pub async fn run<F, Fut>(&self, name: &str, mut attempt: F) -> Result<f64>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<f64>>,
    {
        let attempts = self.attempts.max(1);
        let mut last_err = None;
        for n in 1..=attempts {
            match attempt().await {
                Ok(temp) => return Ok(temp),
                Err(e) => {
                    debug!("[Probe] {} read attempt {}/{} failed: {}", name, n, attempts, e);
                    last_err = Some(e);
                }
            }
            if n < attempts {
                tokio::time::sleep(self.delay).await;
            }
        }
        Err(last_err.unwrap_or_else(|| ThermaboxError::probe_read(name, "no attempts made")))
    }
}

/// Parse a plain numeric probe body such as `"42.20\n"`.
pub fn parse_reading(name: &str, body: &str) -> Result<f64> {
    let trimmed = body.trim();
    match trimmed.parse::<f64>() {
        Ok(temp) if temp.is_finite() => Ok(temp),
        _ => Err(ThermaboxError::probe_read(
            name,
            format!("invalid temperature body {:?}", trimmed),
        )),
    }
}

/// Build a probe from configuration without opening it.
pub fn build(config: &ProbeConfig) -> Result<Arc<dyn Probe>> {
    let probe: Arc<dyn Probe> = match config {
        ProbeConfig::Http { name, url } => Arc::new(HttpProbe::new(name.clone(), url.clone())?),
        ProbeConfig::Ws { name, url } => Arc::new(WsProbe::new(name.clone(), url.clone())),
        ProbeConfig::Local { name, path } => Arc::new(LocalProbe::new(name.clone(), path.clone())),
        ProbeConfig::Simulated { name, value } => {
            Arc::new(SimulatedProbe::new(name.clone(), *value))
        }
    };
    Ok(probe)
}

/// Build a probe from configuration and initialize it.
pub async fn from_config(config: &ProbeConfig) -> Result<Arc<dyn Probe>> {
    let probe = build(config)?;
    probe.initialize().await?;
    info!("[Probe] Initialized probe '{}'", probe.name());
    Ok(probe)
}
