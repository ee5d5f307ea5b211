//! Text-frame transport underneath the push channel.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};
use url::Url;

use crate::config::StreamConfig;
use crate::{Result, StreamError};

/// One open connection carrying Engine.IO text packets.
#[async_trait]
pub trait ControlTransport: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next text frame, or `None` once the peer closed the connection.
    async fn next_text(&mut self) -> Result<Option<String>>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens transports; called again for every reconnection attempt.
#[async_trait]
pub trait ControlConnector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn ControlTransport>>;
}

/// Connects to the service's Engine.IO endpoint over WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: Url,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(config: &StreamConfig) -> Result<Self> {
        let url = Url::parse(&config.server.control_url())
            .map_err(|e| StreamError::config(format!("invalid control channel URL: {}", e)))?;
        Ok(Self { url, connect_timeout: config.network.connect_timeout() })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ControlConnector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn ControlTransport>> {
        debug!("Opening control channel to {}", self.url);
        let (socket, response) = tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| StreamError::Timeout { duration: self.connect_timeout })??;
        trace!("WebSocket upgrade answered with {}", response.status());
        Ok(Box::new(WebSocketTransport { socket }))
    }
}

struct WebSocketTransport {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl ControlTransport for WebSocketTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.socket.send(Message::text(text)).await?;
        Ok(())
    }

    async fn next_text(&mut self) -> Result<Option<String>> {
        loop {
            match self.socket.next().await {
                None | Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_owned())),
                Some(Ok(Message::Binary(data))) => {
                    trace!("Ignoring binary frame ({} bytes)", data.len());
                }
                // ping/pong frames are answered by tungstenite itself
                Some(Ok(_)) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.socket.close(None).await?;
        Ok(())
    }
}
