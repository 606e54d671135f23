//! Simulated probe for dry runs and testing.
//!
//! Holds a temperature that can be changed from any thread, and can be told
//! to fail reads to exercise the controller's sensor-loss handling.

use super::Probe;
use crate::error::{Result, ThermaboxError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

pub struct SimulatedProbe {
    name: String,
    /// `f64` bit pattern.
    value: AtomicU64,
    failing: AtomicBool,
    reads: AtomicU32,
}

impl SimulatedProbe {
    pub fn new(name: impl Into<String>, initial: f64) -> Self {
        Self {
            name: name.into(),
            value: AtomicU64::new(initial.to_bits()),
            failing: AtomicBool::new(false),
            reads: AtomicU32::new(0),
        }
    }

    pub fn set(&self, temperature: f64) {
        self.value.store(temperature.to_bits(), Ordering::SeqCst);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::SeqCst))
    }

    /// While failing, every read returns a probe read error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of reads attempted so far.
    pub fn read_count(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for SimulatedProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn temperature(&self) -> Result<f64> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ThermaboxError::probe_read(&self.name, "simulated failure"));
        }
        Ok(self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_fail() {
        let probe = SimulatedProbe::new("sim", 20.0);
        assert_eq!(probe.temperature().await.unwrap(), 20.0);

        probe.set(44.5);
        assert_eq!(probe.temperature().await.unwrap(), 44.5);

        probe.set_failing(true);
        assert!(probe.temperature().await.is_err());
        probe.set_failing(false);
        assert_eq!(probe.temperature().await.unwrap(), 44.5);
        assert_eq!(probe.read_count(), 4);
    }
}
