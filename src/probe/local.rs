//! Locally attached temperature sensor.
//!
//! Reads a Linux temperature file directly, without retries:
//! - hwmon / thermal-zone files hold an integer in millidegrees (`45250`)
//! - DS18B20 1-wire `w1_slave` files hold two lines, the first ending in
//!   `YES` when the CRC is valid and the second ending in `t=45250`

use super::Probe;
use crate::error::{Result, ThermaboxError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub struct LocalProbe {
    name: String,
    path: PathBuf,
}

impl LocalProbe {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(&self, content: &str) -> Result<f64> {
        let raw = if let Some((_, value)) = content.rsplit_once("t=") {
            let crc_ok = content
                .lines()
                .next()
                .is_some_and(|line| line.trim_end().ends_with("YES"));
            if !crc_ok {
                return Err(ThermaboxError::probe_read(&self.name, "1-wire CRC check failed"));
            }
            value
        } else {
            content
        };

        raw.trim()
            .parse::<i64>()
            .map(|milli| milli as f64 / 1000.0)
            .map_err(|_| {
                ThermaboxError::probe_read(
                    &self.name,
                    format!("unexpected sensor content {:?}", content.trim()),
                )
            })
    }
}

#[async_trait]
impl Probe for LocalProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> Result<()> {
        if tokio::fs::metadata(&self.path).await.is_err() {
            return Err(ThermaboxError::ProbeConnect {
                name: self.name.clone(),
                reason: format!("{} does not exist", self.path.display()),
            });
        }
        Ok(())
    }

    async fn temperature(&self) -> Result<f64> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ThermaboxError::probe_read(&self.name, e))?;
        self.parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(tag: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "thermabox-local-{}-{}",
            tag,
            std::process::id()
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_reads_millidegrees() {
        let path = temp_file("hwmon", "45250\n");
        let probe = LocalProbe::new("board", &path);
        probe.initialize().await.unwrap();
        assert_eq!(probe.temperature().await.unwrap(), 45.25);
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_reads_one_wire() {
        let path = temp_file(
            "w1",
            "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n72 01 4b 46 7f ff 0e 10 57 t=23125\n",
        );
        let probe = LocalProbe::new("ds18b20", &path);
        assert_eq!(probe.temperature().await.unwrap(), 23.125);
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_one_wire_crc_failure() {
        let path = temp_file(
            "w1crc",
            "72 01 4b 46 7f ff 0e 10 57 : crc=00 NO\n72 01 4b 46 7f ff 0e 10 57 t=23125\n",
        );
        let probe = LocalProbe::new("ds18b20", &path);
        assert!(matches!(
            probe.temperature().await,
            Err(ThermaboxError::ProbeRead { .. })
        ));
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_fails_initialize() {
        let probe = LocalProbe::new("gone", "/nonexistent/temp1_input");
        assert!(matches!(
            probe.initialize().await,
            Err(ThermaboxError::ProbeConnect { .. })
        ));
        assert!(probe.temperature().await.is_err());
    }
}
