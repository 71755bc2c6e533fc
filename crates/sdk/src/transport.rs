//! WebSocket transport with bounded reconnect.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use tracker_core::{Error, Result};

use crate::config::SdkConfig;

/// Where serialized frames go. The production sink is [`WsTransport`];
/// tests substitute their own.
#[async_trait]
pub trait EventSink: Send {
    async fn send(&mut self, frame: String) -> Result<()>;
    async fn close(&mut self) {}
}

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// `tokio-tungstenite` transport. Reconnects with capped exponential
/// backoff; after the retry budget is spent the frame is dropped.
pub struct WsTransport {
    url: String,
    max_retries: u32,
    backoff_base: Duration,
    backoff_cap: Duration,
    writer: Option<WsWriter>,
    reader: Option<JoinHandle<()>>,
}

impl WsTransport {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            url: config.url(),
            max_retries: config.max_retries,
            backoff_base: config.backoff_base,
            backoff_cap: config.backoff_cap,
            writer: None,
            reader: None,
        }
    }

    /// Establish the initial connection, failing fast on a bad endpoint or
    /// rejected handshake.
    pub async fn connect(config: &SdkConfig) -> Result<Self> {
        let mut transport = Self::new(config);
        transport.reconnect().await?;
        Ok(transport)
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.teardown().await;

        let (stream, _response) = connect_async(&self.url)
            .await
            .map_err(|e| Error::internal(format!("WebSocket connect failed: {}", e)))?;
        let (writer, mut reader) = stream.split();

        // Server frames (acks, fan-out) are drained and logged; the SDK
        // fires and forgets.
        self.reader = Some(tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => debug!(frame = %text, "Server frame"),
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
        }));
        self.writer = Some(writer);
        debug!(url = %self.url, "Connected");
        Ok(())
    }

    async fn teardown(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.close().await;
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.backoff_base.saturating_mul(1u32 << attempt.min(16));
        exp.min(self.backoff_cap)
    }

    async fn try_send(&mut self, frame: &str) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::internal("not connected"))?;
        writer
            .send(Message::Text(frame.to_string()))
            .await
            .map_err(|e| Error::internal(format!("WebSocket send failed: {}", e)))
    }
}

#[async_trait]
impl EventSink for WsTransport {
    async fn send(&mut self, frame: String) -> Result<()> {
        if self.writer.is_some() {
            if self.try_send(&frame).await.is_ok() {
                return Ok(());
            }
            self.teardown().await;
        }

        for attempt in 0..self.max_retries {
            tokio::time::sleep(self.backoff(attempt)).await;
            match self.reconnect().await {
                Ok(()) => {
                    if self.try_send(&frame).await.is_ok() {
                        return Ok(());
                    }
                    self.teardown().await;
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "Reconnect failed");
                }
            }
        }

        Err(Error::internal(format!(
            "dropped frame after {} reconnect attempts",
            self.max_retries
        )))
    }

    async fn close(&mut self) {
        self.teardown().await;
    }
}
