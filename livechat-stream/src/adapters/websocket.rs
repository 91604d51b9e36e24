//! WebSocket line transport for the IRC adapter.
//!
//! Twitch may pack several `\r\n`-terminated IRC lines into one text frame;
//! frames are split here so the adapter only ever sees single lines.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::irc::{LineConnector, LineTransport};
use crate::error::AdapterError;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connects over `ws://` or `wss://` using rustls.
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LineConnector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn LineTransport>, AdapterError> {
        let url = url::Url::parse(endpoint)
            .map_err(|e| AdapterError::Protocol(format!("invalid endpoint {endpoint}: {e}")))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(AdapterError::Protocol(format!(
                "unsupported scheme '{}' for {endpoint}",
                url.scheme()
            )));
        }

        let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| AdapterError::Connection(format!("connect to {endpoint}: {e}")))?;

        tracing::debug!("WebSocket connected to {}", endpoint);

        Ok(Box::new(WebSocketTransport {
            ws,
            pending: VecDeque::new(),
        }))
    }
}

/// One WebSocket connection, read line by line.
pub struct WebSocketTransport {
    ws: WsStream,
    pending: VecDeque<String>,
}

#[async_trait]
impl LineTransport for WebSocketTransport {
    async fn send_line(&mut self, line: &str) -> Result<(), AdapterError> {
        self.ws
            .send(Message::Text(line.to_string()))
            .await
            .map_err(|e| AdapterError::Connection(e.to_string()))
    }

    async fn recv_line(&mut self) -> Result<Option<String>, AdapterError> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Ok(Some(line));
            }

            let Some(msg) = self.ws.next().await else {
                return Ok(None);
            };

            match msg.map_err(|e| AdapterError::Connection(e.to_string()))? {
                Message::Text(text) => {
                    self.pending.extend(
                        text.lines()
                            .filter(|line| !line.is_empty())
                            .map(str::to_string),
                    );
                }
                Message::Close(frame) => {
                    tracing::debug!("WebSocket closed by peer: {:?}", frame);
                    return Ok(None);
                }
                Message::Binary(_) => {
                    return Err(AdapterError::Protocol(
                        "unexpected binary frame".to_string(),
                    ));
                }
                // Ping/Pong are answered by tungstenite itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            tracing::trace!("WebSocket close: {}", e);
        }
    }
}
