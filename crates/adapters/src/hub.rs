use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use relview_core::listener::{HubInvocation, HubTransport, HubTransportError};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

pub const RECORD_SEPARATOR: char = '\u{1e}';
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

const HANDSHAKE_REQUEST: &str = r#"{"protocol":"json","version":1}"#;
const PING_RECORD: &str = r#"{"type":6}"#;

const MESSAGE_INVOCATION: u64 = 1;
const MESSAGE_PING: u64 = 6;
const MESSAGE_CLOSE: u64 = 7;

type HubSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One decoded hub protocol record.
#[derive(Debug, Clone, PartialEq)]
pub enum HubFrame {
    Invocation(HubInvocation),
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    Other(u64),
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    message_type: u64,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    arguments: Option<Vec<Value>>,
    #[serde(default)]
    error: Option<String>,
    #[serde(rename = "allowReconnect", default)]
    allow_reconnect: bool,
}

#[derive(Debug, Default, Deserialize)]
struct HandshakeResponse {
    #[serde(default)]
    error: Option<String>,
}

impl HubFrame {
    pub fn decode(record: &str) -> Result<Self, HubTransportError> {
        let raw: RawFrame = serde_json::from_str(record)
            .map_err(|error| HubTransportError::new(format!("malformed hub record: {error}")))?;

        Ok(match raw.message_type {
            MESSAGE_INVOCATION => {
                let target = raw
                    .target
                    .ok_or_else(|| HubTransportError::new("hub invocation without target"))?;
                Self::Invocation(HubInvocation::new(
                    target,
                    raw.arguments.unwrap_or_default(),
                ))
            }
            MESSAGE_PING => Self::Ping,
            MESSAGE_CLOSE => Self::Close {
                error: raw.error,
                allow_reconnect: raw.allow_reconnect,
            },
            other => Self::Other(other),
        })
    }
}

/// Appends `chunk` to `buffer` and returns every complete record. A trailing
/// partial record stays buffered for the next chunk.
pub fn split_records(buffer: &mut String, chunk: &str) -> Vec<String> {
    buffer.push_str(chunk);
    let Some(last_separator) = buffer.rfind(RECORD_SEPARATOR) else {
        return Vec::new();
    };

    let rest = buffer.split_off(last_separator + RECORD_SEPARATOR.len_utf8());
    let complete = std::mem::replace(buffer, rest);
    complete
        .split(RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
        .map(str::to_string)
        .collect()
}

#[must_use]
pub fn frame_record(record: &str) -> String {
    let mut framed = String::with_capacity(record.len() + 1);
    framed.push_str(record);
    framed.push(RECORD_SEPARATOR);
    framed
}

/// Hub transport over a WebSocket speaking the JSON hub protocol.
pub struct WebSocketHubTransport {
    url: String,
    keepalive: Duration,
    socket: Option<HubSocket>,
    buffer: String,
    pending: VecDeque<HubFrame>,
    last_sent: Instant,
}

impl fmt::Debug for WebSocketHubTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketHubTransport")
            .field("url", &self.url)
            .field("keepalive", &self.keepalive)
            .field("open", &self.socket.is_some())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl WebSocketHubTransport {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            keepalive: KEEPALIVE_INTERVAL,
            socket: None,
            buffer: String::new(),
            pending: VecDeque::new(),
            last_sent: Instant::now(),
        }
    }

    #[must_use]
    pub fn with_keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = keepalive;
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send_record(&mut self, record: &str) -> Result<(), HubTransportError> {
        let socket = self
            .socket
            .as_mut()
            .ok_or_else(|| HubTransportError::new("hub connection is not open"))?;
        socket
            .send(Message::Text(frame_record(record)))
            .await
            .map_err(to_transport_error)?;
        self.last_sent = Instant::now();
        Ok(())
    }

    async fn handshake(&mut self) -> Result<(), HubTransportError> {
        self.send_record(HANDSHAKE_REQUEST).await?;

        loop {
            let socket = self
                .socket
                .as_mut()
                .ok_or_else(|| HubTransportError::new("hub connection is not open"))?;
            let text = match socket.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(bytes))) => String::from_utf8(bytes).map_err(|_| {
                    HubTransportError::new("hub handshake response is not valid utf-8")
                })?,
                Some(Ok(Message::Close(_))) | None => {
                    return Err(HubTransportError::new(
                        "hub closed the connection during handshake",
                    ))
                }
                Some(Ok(_)) => continue,
                Some(Err(error)) => return Err(to_transport_error(error)),
            };

            let mut records = split_records(&mut self.buffer, &text).into_iter();
            let Some(response) = records.next() else {
                continue;
            };
            let response: HandshakeResponse = serde_json::from_str(&response).map_err(|error| {
                HubTransportError::new(format!("malformed hub handshake response: {error}"))
            })?;
            if let Some(error) = response.error {
                return Err(HubTransportError::new(format!(
                    "hub rejected handshake: {error}"
                )));
            }

            for record in records {
                self.queue_record(&record);
            }
            return Ok(());
        }
    }

    fn ingest(&mut self, chunk: &str) {
        for record in split_records(&mut self.buffer, chunk) {
            self.queue_record(&record);
        }
    }

    fn queue_record(&mut self, record: &str) {
        match HubFrame::decode(record) {
            Ok(frame) => self.pending.push_back(frame),
            Err(error) => warn!(%error, "skipping hub record"),
        }
    }

    fn reset(&mut self) {
        self.socket = None;
        self.buffer.clear();
        self.pending.clear();
    }
}

#[async_trait]
impl HubTransport for WebSocketHubTransport {
    async fn open(&mut self) -> Result<(), HubTransportError> {
        self.reset();
        debug!(url = %self.url, "opening hub connection");

        let (socket, _response) = timeout(HANDSHAKE_TIMEOUT, connect_async(self.url.as_str()))
            .await
            .map_err(|_| HubTransportError::new("timed out connecting to hub"))?
            .map_err(to_transport_error)?;
        self.socket = Some(socket);

        match timeout(HANDSHAKE_TIMEOUT, self.handshake()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => {
                self.reset();
                Err(error)
            }
            Err(_) => {
                self.reset();
                Err(HubTransportError::new("timed out waiting for hub handshake"))
            }
        }
    }

    async fn next_invocation(&mut self) -> Result<Option<HubInvocation>, HubTransportError> {
        loop {
            while let Some(frame) = self.pending.pop_front() {
                match frame {
                    HubFrame::Invocation(invocation) => return Ok(Some(invocation)),
                    HubFrame::Ping => {}
                    HubFrame::Other(message_type) => {
                        debug!(message_type, "ignoring hub message");
                    }
                    HubFrame::Close {
                        error,
                        allow_reconnect,
                    } => {
                        if let Some(error) = &error {
                            warn!(%error, "hub closed the connection with an error");
                        }
                        self.reset();
                        if allow_reconnect {
                            // Reported as a lost connection so the listener reconnects.
                            return Err(HubTransportError::new(format!(
                                "hub closed the connection and allows reconnecting: {}",
                                error.as_deref().unwrap_or("no reason given")
                            )));
                        }
                        return Ok(None);
                    }
                }
            }

            let deadline = self.last_sent + self.keepalive;
            let socket = self
                .socket
                .as_mut()
                .ok_or_else(|| HubTransportError::new("hub connection is not open"))?;

            let message = match timeout_at(deadline, socket.next()).await {
                Err(_) => {
                    self.send_record(PING_RECORD).await?;
                    continue;
                }
                Ok(message) => message,
            };

            match message {
                Some(Ok(Message::Text(text))) => self.ingest(&text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => self.ingest(&text),
                    Err(_) => warn!("skipping non utf-8 hub message"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    self.reset();
                    return Err(HubTransportError::new("hub connection closed unexpectedly"));
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    self.reset();
                    return Err(to_transport_error(error));
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), HubTransportError> {
        let Some(mut socket) = self.socket.take() else {
            return Ok(());
        };
        self.reset();
        if let Err(error) = socket.close(None).await {
            debug!(%error, "hub socket close failed");
        }
        Ok(())
    }
}

fn to_transport_error(error: tokio_tungstenite::tungstenite::Error) -> HubTransportError {
    HubTransportError::new(error.to_string())
}
