//! Gemini Live WebSocket client
//!
//! Manages the WebSocket connection lifecycle for one advisor session.
//!
//! # Connection Flow
//!
//! 1. `connect()` - Establish WebSocket, send `setup`
//! 2. `setupComplete` arrives on the incoming channel like any other message
//! 3. `send_frame()` - Stream microphone frames
//! 4. `disconnect()` - Clean shutdown
//!
//! There is no retry: a failed connection ends the session.

use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{client::IntoClientRequest, Message},
    MaybeTlsStream, WebSocketStream,
};

use super::protocol::{ClientMessage, ServerMessage, SetupConfig};
use super::LiveError;
use crate::audio::EncodedFrame;

/// Connection timeout for the initial WebSocket handshake
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// What the receiver task forwards to the controller
#[derive(Debug, Clone)]
pub enum Inbound {
    Message(ServerMessage),
    /// Server closed the socket (close reason, if any)
    Closed(Option<String>),
    /// Transport failed mid-session
    Error(String),
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Handle to an open Live API socket
pub struct LiveConnection {
    write: WsSink,
    incoming_rx: Option<mpsc::Receiver<Inbound>>,
    receiver_task: tokio::task::JoinHandle<()>,
    frames_sent: u64,
}

/// Parse a text or binary frame as a server message
pub fn parse_frame(message: &Message) -> Option<Result<ServerMessage, serde_json::Error>> {
    match message {
        Message::Text(text) => Some(serde_json::from_str(text)),
        Message::Binary(bytes) => Some(serde_json::from_slice(bytes)),
        _ => None,
    }
}

impl LiveConnection {
    /// Open the socket and send the `setup` message.
    ///
    /// Returns as soon as setup is sent; `setupComplete` (or a close) shows
    /// up on the incoming channel.
    pub async fn connect(url: &str, api_key: &str, setup: SetupConfig) -> Result<Self, LiveError> {
        let separator = if url.contains('?') { '&' } else { '?' };
        let request = format!("{}{}key={}", url, separator, api_key)
            .into_client_request()
            .map_err(|e| LiveError::TransportOpenFailure(e.to_string()))?;

        log::info!("Connecting to Gemini Live API...");

        let (ws_stream, _response) = timeout(
            CONNECTION_TIMEOUT,
            connect_async_with_config(request, None, true),
        )
        .await
        .map_err(|_| LiveError::TransportOpenFailure("Connection timeout".to_string()))?
        .map_err(|e| LiveError::TransportOpenFailure(e.to_string()))?;

        log::info!("WebSocket connected, sending setup for {}", setup.model);

        let (write, mut read) = ws_stream.split();
        let (incoming_tx, incoming_rx) = mpsc::channel(100);

        let receiver_task = tokio::spawn(async move {
            let mut received = 0u64;
            let terminal = loop {
                let Some(msg_result) = read.next().await else {
                    break Inbound::Closed(None);
                };
                match msg_result {
                    Ok(Message::Close(frame)) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty());
                        log::info!("WebSocket closed by server: {:?}", reason);
                        break Inbound::Closed(reason);
                    }
                    Ok(message) => match parse_frame(&message) {
                        Some(Ok(msg)) => {
                            received += 1;
                            if incoming_tx.send(Inbound::Message(msg)).await.is_err() {
                                log::debug!("Receiver channel closed");
                                return;
                            }
                        }
                        Some(Err(e)) => log::warn!("Failed to parse message: {}", e),
                        None => {} // ping/pong
                    },
                    Err(e) => {
                        log::warn!("WebSocket error: {}", e);
                        break Inbound::Error(e.to_string());
                    }
                }
            };
            let _ = incoming_tx.send(terminal).await;
            log::debug!("Receiver task exiting after {} messages", received);
        });

        let mut connection = Self {
            write,
            incoming_rx: Some(incoming_rx),
            receiver_task,
            frames_sent: 0,
        };

        connection
            .send_message(&ClientMessage::Setup(setup))
            .await
            .map_err(|e| LiveError::TransportOpenFailure(e.to_string()))?;

        Ok(connection)
    }

    async fn send_message(&mut self, msg: &ClientMessage) -> Result<(), LiveError> {
        let json = serde_json::to_string(msg)
            .map_err(|e| LiveError::TransportRuntimeError(e.to_string()))?;

        self.write
            .send(Message::Text(json))
            .await
            .map_err(|e| LiveError::TransportRuntimeError(e.to_string()))
    }

    /// Send one encoded microphone frame
    pub async fn send_frame(&mut self, frame: EncodedFrame) -> Result<(), LiveError> {
        self.send_message(&ClientMessage::audio_chunk(frame.mime_type, frame.data))
            .await?;
        self.frames_sent += 1;
        if self.frames_sent % 50 == 0 {
            log::debug!("Live: {} frames sent", self.frames_sent);
        }
        Ok(())
    }

    /// Take ownership of the incoming message receiver
    pub fn take_incoming_receiver(&mut self) -> Option<mpsc::Receiver<Inbound>> {
        self.incoming_rx.take()
    }

    /// Close the socket and stop the receiver task
    pub async fn disconnect(mut self) {
        log::info!("Disconnecting from Live API ({} frames sent)", self.frames_sent);
        self.receiver_task.abort();

        if let Err(e) = self.write.close().await {
            log::debug!("Error closing WebSocket: {}", e);
        }
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        self.receiver_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_and_binary_frames() {
        let text = Message::Text(r#"{"setupComplete":{}}"#.to_string());
        assert!(parse_frame(&text).unwrap().unwrap().is_setup_complete());

        let binary = Message::Binary(br#"{"setupComplete":{}}"#.to_vec());
        assert!(parse_frame(&binary).unwrap().unwrap().is_setup_complete());
    }

    #[test]
    fn test_parse_ignores_control_frames() {
        assert!(parse_frame(&Message::Ping(vec![])).is_none());
        assert!(parse_frame(&Message::Pong(vec![])).is_none());
    }

    #[test]
    fn test_parse_reports_bad_json() {
        let text = Message::Text("not json".to_string());
        assert!(parse_frame(&text).unwrap().is_err());
    }

    #[tokio::test]
    async fn test_connect_failure_is_open_failure() {
        let setup = SetupConfig::audio("m", "Zephyr", String::new());
        let result = LiveConnection::connect("ws://127.0.0.1:9/live", "k", setup).await;
        assert!(matches!(result, Err(LiveError::TransportOpenFailure(_))));
    }
}
