//! WebSocket probe.
//!
//! Keeps one WebSocket session open to the probe. A read sends a `temp` text
//! frame and waits for the reply frame carrying a plain number. A broken
//! session is dropped and re-opened on the next attempt.

use super::{Probe, RetryPolicy, parse_reading};
use crate::error::{Result, ThermaboxError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message,
};

type Session = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Request frame understood by the probe firmware.
const REQUEST: &str = "temp";

/// How long to wait for the reply frame.
const REPLY_TIMEOUT: Duration = Duration::from_secs(1);

pub struct WsProbe {
    name: String,
    url: String,
    session: Mutex<Option<Session>>,
    retry: RetryPolicy,
}

impl WsProbe {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            session: Mutex::new(None),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn connect(&self) -> Result<Session> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ThermaboxError::ProbeConnect {
                name: self.name.clone(),
                reason: format!("failed to connect to {}: {}", self.url, e),
            })?;
        Ok(stream)
    }

    async fn request_once(&self) -> Result<f64> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            debug!("[Probe] {} re-opening WebSocket session", self.name);
            *guard = Some(self.connect().await?);
        }
        let Some(session) = guard.as_mut() else {
            return Err(ThermaboxError::probe_read(&self.name, "no session"));
        };

        let result = Self::exchange(&self.name, session).await;
        if result.is_err() {
            // Drop the session so the next attempt starts clean
            *guard = None;
        }
        result
    }

    async fn exchange(name: &str, session: &mut Session) -> Result<f64> {
        session
            .send(Message::Text(REQUEST.into()))
            .await
            .map_err(|e| ThermaboxError::probe_read(name, format!("failed to request temperature: {}", e)))?;

        let reply = tokio::time::timeout(REPLY_TIMEOUT, async {
            while let Some(msg) = session.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let text_str: &str = &text;
                        return Ok(text_str.to_string());
                    }
                    Ok(Message::Binary(data)) => {
                        return Ok(String::from_utf8_lossy(&data).into_owned());
                    }
                    Ok(Message::Close(_)) => {
                        return Err(ThermaboxError::probe_read(name, "probe closed the session"));
                    }
                    Err(e) => return Err(ThermaboxError::probe_read(name, e)),
                    _ => {}
                }
            }
            Err(ThermaboxError::probe_read(name, "session ended"))
        })
        .await
        .map_err(|_| ThermaboxError::probe_read(name, "timed out waiting for reply"))??;

        parse_reading(name, &reply)
    }
}

#[async_trait]
impl Probe for WsProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> Result<()> {
        let session = self.connect().await?;
        *self.session.lock().await = Some(session);
        info!("[Probe] {} connected to {}", self.name, self.url);
        Ok(())
    }

    async fn temperature(&self) -> Result<f64> {
        self.retry.run(&self.name, || self.request_once()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// Accept WebSocket sessions and answer each `temp` request with the next reply.
    async fn serve(replies: Vec<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let mut replies = replies.into_iter();
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(mut ws) = accept_async(stream).await else {
                    continue;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_text() && msg.to_text().unwrap() == REQUEST {
                        let Some(reply) = replies.next() else {
                            return;
                        };
                        if ws.send(Message::Text(reply.into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        format!("ws://{}", addr)
    }

    #[tokio::test]
    async fn test_request_reply() {
        let url = serve(vec!["21.5", "22.0"]).await;
        let probe = WsProbe::new("ws-probe", url);
        probe.initialize().await.unwrap();
        assert_eq!(probe.temperature().await.unwrap(), 21.5);
        assert_eq!(probe.temperature().await.unwrap(), 22.0);
    }

    #[tokio::test]
    async fn test_bad_reply_is_retried() {
        let url = serve(vec!["not-a-number", "19.25"]).await;
        let probe = WsProbe::new("ws-probe", url);
        probe.initialize().await.unwrap();
        assert_eq!(probe.temperature().await.unwrap(), 19.25);
    }

    #[tokio::test]
    async fn test_initialize_fails_without_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = WsProbe::new("ws-probe", format!("ws://{}", addr));
        assert!(matches!(
            probe.initialize().await,
            Err(ThermaboxError::ProbeConnect { .. })
        ));
    }
}
