//! HTTP-polled probe.
//!
//! Issues a GET against a URL that answers `200 OK` with a plain numeric
//! body (e.g. `42.20`). Transport errors, other status codes and unparsable
//! bodies are all retried under the probe's [`RetryPolicy`].

use super::{Probe, RetryPolicy, parse_reading};
use crate::error::{Result, ThermaboxError};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

pub struct HttpProbe {
    name: String,
    url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpProbe {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ThermaboxError::ProbeConnect {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            name,
            url: url.into(),
            client,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_once(&self) -> Result<f64> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ThermaboxError::probe_read(&self.name, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ThermaboxError::probe_read(
                &self.name,
                format!("received response code {}", status.as_u16()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ThermaboxError::probe_read(&self.name, e))?;
        parse_reading(&self.name, &body)
    }
}

#[async_trait]
impl Probe for HttpProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn temperature(&self) -> Result<f64> {
        self.retry.run(&self.name, || self.fetch_once()).await
    }
}
