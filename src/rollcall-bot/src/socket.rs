//! Socket Mode transport.
//!
//! [`SocketModeClient`]:
//! - Opens a WebSocket URL with the app-level token
//! - Acknowledges every envelope before doing anything else
//! - Decodes envelopes and hands them to the [`Dispatcher`], one task each
//! - Reconnects after errors and Slack-initiated disconnects
//!
//! # Example
//!
//! ```rust,ignore
//! let client = SocketModeClient::new(&config, dispatcher)?;
//! client.run().await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

use crate::config::BotConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{SlackError, SlackResult};
use crate::events::{SocketModeAck, SocketModeEnvelope, decode_envelope};

type WsConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection tuning for Socket Mode.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Delay between reconnection attempts.
    pub reconnect_delay: Duration,
    /// Ping interval for WebSocket keep-alive.
    pub ping_interval: Duration,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// How a single connection ended.
enum ConnectionEnd {
    /// Shutdown was requested.
    Shutdown,
    /// Slack closed or asked us to reconnect.
    Reconnect,
}

/// Socket Mode connection owner.
pub struct SocketModeClient {
    client: reqwest::Client,
    api_base: String,
    app_token: String,
    options: SocketOptions,
    dispatcher: Arc<Dispatcher>,
    shutdown_tx: broadcast::Sender<()>,
}

impl SocketModeClient {
    /// Create a client; the configuration must carry an app token.
    pub fn new(config: &BotConfig, dispatcher: Arc<Dispatcher>) -> SlackResult<Self> {
        let app_token = config
            .app_token()
            .ok_or_else(|| SlackError::Config("Socket Mode requires SLACK_APP_TOKEN".to_string()))?
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SlackError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            app_token,
            options: SocketOptions::default(),
            dispatcher,
            shutdown_tx,
        })
    }

    /// A handle that stops [`run`](Self::run) when sent to.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Run until shutdown.
    pub async fn run(&self) -> SlackResult<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            let result = match self.get_socket_mode_url().await {
                Ok(ws_url) => {
                    info!("Connecting to Socket Mode...");
                    self.connect_and_run(&ws_url, &mut shutdown_rx).await
                }
                Err(SlackError::Auth(msg)) => return Err(SlackError::Auth(msg)),
                Err(e) => Err(e),
            };

            match result {
                Ok(ConnectionEnd::Shutdown) => {
                    info!("Socket Mode connection closed gracefully");
                    return Ok(());
                }
                Ok(ConnectionEnd::Reconnect) => {
                    info!("Reconnecting to Socket Mode");
                }
                Err(e) => {
                    error!("Socket Mode connection error: {}", e);
                    info!("Reconnecting in {:?}...", self.options.reconnect_delay);
                    tokio::select! {
                        _ = shutdown_rx.recv() => return Ok(()),
                        _ = tokio::time::sleep(self.options.reconnect_delay) => {}
                    }
                }
            }
        }
    }

    /// Get the WebSocket URL for Socket Mode.
    async fn get_socket_mode_url(&self) -> SlackResult<String> {
        let response = self
            .client
            .post(format!("{}/apps.connections.open", self.api_base))
            .bearer_auth(&self.app_token)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .send()
            .await?;

        let json: serde_json::Value = response.json().await?;

        if json.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let error = json
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown");
            let message = format!("apps.connections.open failed: {}", error);
            return Err(match error {
                "invalid_auth" | "not_authed" | "not_allowed_token_type" => {
                    SlackError::Auth(message)
                }
                _ => SlackError::Api(message),
            });
        }

        json.get("url")
            .and_then(|u| u.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| SlackError::Api("Missing url in response".to_string()))
    }

    /// Connect to WebSocket and run the event loop.
    async fn connect_and_run(
        &self,
        ws_url: &str,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> SlackResult<ConnectionEnd> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (mut write, read) = ws_stream.split();

        let (msg_tx, mut msg_rx) = mpsc::channel::<WsMessage>(100);

        let write_task = tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    error!("Failed to send WebSocket message: {}", e);
                    break;
                }
            }
        });

        let ping_tx = msg_tx.clone();
        let ping_interval = self.options.ping_interval;
        let ping_task = tokio::spawn(async move {
            let mut interval = interval(ping_interval);
            loop {
                interval.tick().await;
                if ping_tx.send(WsMessage::Ping(vec![])).await.is_err() {
                    break;
                }
            }
        });

        let result = self.process_messages(read, msg_tx, shutdown_rx).await;

        ping_task.abort();
        write_task.abort();

        result
    }

    /// Process incoming WebSocket messages.
    async fn process_messages(
        &self,
        mut read: SplitStream<WsConnection>,
        msg_tx: mpsc::Sender<WsMessage>,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> SlackResult<ConnectionEnd> {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal");
                    return Ok(ConnectionEnd::Shutdown);
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            if self.handle_socket_message(&text, &msg_tx).await {
                                return Ok(ConnectionEnd::Reconnect);
                            }
                        }
                        Some(Ok(WsMessage::Ping(data))) => {
                            let _ = msg_tx.send(WsMessage::Pong(data)).await;
                        }
                        Some(Ok(WsMessage::Close(_))) => {
                            info!("WebSocket closed by server");
                            return Ok(ConnectionEnd::Reconnect);
                        }
                        Some(Err(e)) => {
                            return Err(SlackError::WebSocket(e.to_string()));
                        }
                        None => {
                            return Ok(ConnectionEnd::Reconnect);
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Handle one Socket Mode message. Returns `true` on a disconnect request.
    async fn handle_socket_message(&self, text: &str, msg_tx: &mpsc::Sender<WsMessage>) -> bool {
        debug!("Received Socket Mode message: {}", text);

        let envelope: SocketModeEnvelope = match serde_json::from_str(text) {
            Ok(env) => env,
            Err(e) => {
                warn!("Failed to parse Socket Mode envelope: {}", e);
                return false;
            }
        };

        // Ack before handling; Slack redelivers anything unacked within 3s.
        if let Some(envelope_id) = &envelope.envelope_id {
            match serde_json::to_string(&SocketModeAck::new(envelope_id)) {
                Ok(ack_json) => {
                    if msg_tx.send(WsMessage::Text(ack_json)).await.is_err() {
                        warn!("Failed to queue ack for envelope {}", envelope_id);
                    }
                }
                Err(e) => error!("Failed to encode ack: {}", e),
            }
        }

        match envelope.envelope_type.as_str() {
            "hello" => {
                info!("Socket Mode connection established");
                return false;
            }
            "disconnect" => {
                info!(
                    "Received disconnect request from Slack: {}",
                    envelope.reason.as_deref().unwrap_or("unspecified")
                );
                return true;
            }
            _ => {}
        }

        match decode_envelope(&envelope) {
            Ok(Some(inbound)) => {
                let dispatcher = self.dispatcher.clone();
                tokio::spawn(async move {
                    let handled = dispatcher.dispatch(inbound).await;
                    debug!("Dispatched Socket Mode envelope: {:?}", handled);
                });
            }
            Ok(None) => {
                debug!("Nothing to do for envelope type {}", envelope.envelope_type);
            }
            Err(e) => {
                warn!("Failed to decode {} envelope: {}", envelope.envelope_type, e);
            }
        }

        false
    }
}
