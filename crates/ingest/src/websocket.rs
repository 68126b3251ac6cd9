//! Exchange WebSocket client
//!
//! Handles connection, subscription, keepalive and frame receiving for the
//! public ticker feed. No authentication.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame},
    tungstenite::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, trace};
use url::Url;

use crate::error::ConnectorError;
use crate::messages::subscribe_request;
use crate::traits::{FeedSession, FeedTransport};

/// Opens `ExchangeWebSocket` sessions against a fixed URL
pub struct WsTransport {
    url: String,
    read_timeout: Duration,
}

impl WsTransport {
    pub fn new(url: impl Into<String>, read_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            read_timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeedTransport for WsTransport {
    async fn connect(&self) -> Result<Box<dyn FeedSession>, ConnectorError> {
        let ws = ExchangeWebSocket::connect(&self.url, self.read_timeout).await?;
        Ok(Box::new(ws))
    }
}

/// Exchange WebSocket client
pub struct ExchangeWebSocket {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    read_timeout: Duration,
}

impl ExchangeWebSocket {
    pub async fn connect(url: &str, read_timeout: Duration) -> Result<Self, ConnectorError> {
        let url = Url::parse(url).map_err(|e| ConnectorError::ConnectionFailed(e.to_string()))?;

        info!(url = %url, "Connecting to exchange WebSocket");

        let (ws, response) = connect_async(url.as_str()).await?;

        info!(status = ?response.status(), "Exchange WebSocket connected");

        Ok(Self { ws, read_timeout })
    }
}

#[async_trait]
impl FeedSession for ExchangeWebSocket {
    /// Sends: `{"type":"subscribe","channel":"ticker","product_ids":["BTC-USD",...]}`
    async fn subscribe(&mut self, symbols: &[String]) -> Result<(), ConnectorError> {
        let msg = subscribe_request(symbols).to_string();
        debug!(cmd = %msg, "Sending subscribe command");
        self.ws
            .send(Message::Text(msg))
            .await
            .map_err(|e| ConnectorError::SubscribeFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Result<String, ConnectorError> {
        loop {
            let next = tokio::time::timeout(self.read_timeout, self.ws.next())
                .await
                .map_err(|_| ConnectorError::ReadTimeout(self.read_timeout.as_secs()))?;

            match next {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(data))) => {
                    return Ok(String::from_utf8_lossy(&data).into_owned())
                }
                Some(Ok(Message::Ping(data))) => {
                    trace!("Received WS ping, sending pong");
                    self.ws.send(Message::Pong(data)).await?;
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(frame = ?frame, "Exchange WebSocket closed by peer");
                    return Err(ConnectorError::Closed);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(ConnectorError::Closed),
            }
        }
    }

    async fn ping(&mut self) -> Result<(), ConnectorError> {
        self.ws.send(Message::Ping(Vec::new())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        self.ws
            .close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: Cow::Borrowed("client shutdown"),
            }))
            .await?;
        Ok(())
    }
}
