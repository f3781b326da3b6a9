//! WebSocket client with automatic reconnection
//!
//! The connection loop is a bounded iterative backoff loop: the delay grows
//! by a fixed multiplier per consecutive failure, is capped, and carries
//! ±10% jitter so a fleet of clients does not retry in lockstep. A
//! successful connect resets the backoff state and re-issues the configured
//! subscription payload. Every sleep and read races the shutdown signal.

use super::types::{WsConfig, WsError, WsMessage};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Reusable WebSocket client with automatic reconnection and keep-alive
pub struct WsClient {
    config: WsConfig,
}

impl WsClient {
    /// Create a new WebSocket client with the given configuration
    pub fn new(config: WsConfig) -> Self {
        Self { config }
    }

    /// Get the configured URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Connect and return a receiver for messages
    ///
    /// Spawns a background task that handles connection management,
    /// reconnection with jittered exponential backoff, subscription
    /// re-issue, and ping/pong keepalive. The task exits promptly when the
    /// shutdown signal flips, even mid-backoff.
    pub fn connect(&self, shutdown: watch::Receiver<bool>) -> mpsc::Receiver<WsMessage> {
        let (tx, rx) = mpsc::channel(1024);
        let config = self.config.clone();

        tokio::spawn(async move {
            if let Err(e) = Self::run_connection_loop(config, tx, shutdown).await {
                tracing::error!(error = %e, "WebSocket connection loop failed");
            }
        });

        rx
    }

    /// Run the connection loop with bounded reconnection
    async fn run_connection_loop(
        config: WsConfig,
        tx: mpsc::Sender<WsMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), WsError> {
        let mut reconnect_attempts: u32 = 0;
        let mut reconnect_delay = config.initial_reconnect_delay;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match Self::connect_and_stream(
                &config,
                &tx,
                &mut shutdown,
                &mut reconnect_attempts,
                &mut reconnect_delay,
            )
            .await
            {
                Ok(()) => {
                    tracing::info!(url = %config.url, "WebSocket connection closed cleanly");
                    let _ = tx.send(WsMessage::Disconnected).await;
                    break;
                }
                Err(e) => {
                    reconnect_attempts += 1;
                    tracing::warn!(
                        error = %e,
                        attempt = reconnect_attempts,
                        "WebSocket connection error, reconnecting..."
                    );

                    // Check max reconnects (0 = infinite)
                    if config.max_reconnect_attempts > 0
                        && reconnect_attempts >= config.max_reconnect_attempts
                    {
                        tracing::error!(url = %config.url, "Max reconnection attempts reached");
                        let _ = tx.send(WsMessage::Disconnected).await;
                        return Err(WsError::MaxReconnectsExceeded);
                    }

                    // Check if receiver is still alive
                    if tx.is_closed() {
                        tracing::info!("Receiver dropped, stopping reconnection");
                        break;
                    }

                    let _ = tx
                        .send(WsMessage::Reconnecting {
                            attempt: reconnect_attempts,
                        })
                        .await;

                    let wait = jittered(reconnect_delay);
                    tokio::select! {
                        _ = sleep(wait) => {}
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                break;
                            }
                        }
                    }

                    reconnect_delay = reconnect_delay
                        .mul_f64(config.backoff_multiplier)
                        .min(config.max_reconnect_delay);
                }
            }
        }

        Ok(())
    }

    /// Connect, re-issue subscriptions, and stream messages
    async fn connect_and_stream(
        config: &WsConfig,
        tx: &mpsc::Sender<WsMessage>,
        shutdown: &mut watch::Receiver<bool>,
        reconnect_attempts: &mut u32,
        reconnect_delay: &mut Duration,
    ) -> Result<(), WsError> {
        tracing::info!(url = %config.url, "Connecting to WebSocket");

        let (ws_stream, _response) = connect_async(&config.url)
            .await
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

        // Connection established: reset the backoff state
        *reconnect_attempts = 0;
        *reconnect_delay = config.initial_reconnect_delay;

        let (mut write, mut read) = ws_stream.split();

        tracing::info!("WebSocket connected");

        // Re-issue subscriptions on every connect
        if let Some(ref payload) = config.subscribe_payload {
            write
                .send(Message::Text(payload.clone()))
                .await
                .map_err(|e| WsError::SendFailed(e.to_string()))?;
            tracing::debug!("Subscription payload sent");
        }

        if tx.send(WsMessage::Connected).await.is_err() {
            return Ok(());
        }

        let mut ping_interval = tokio::time::interval(config.ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut waiting_for_pong = false;

        loop {
            tokio::select! {
                // Handle incoming messages, enforcing the idle timeout
                result = tokio::time::timeout(config.idle_timeout, read.next()) => {
                    let msg = match result {
                        Ok(msg) => msg,
                        Err(_) => {
                            return Err(WsError::ConnectionFailed(
                                "Idle timeout, no frames received".into(),
                            ));
                        }
                    };

                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if tx.send(WsMessage::Text(text)).await.is_err() {
                                tracing::debug!("Receiver dropped, closing connection");
                                return Ok(());
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            if tx.send(WsMessage::Binary(data)).await.is_err() {
                                tracing::debug!("Receiver dropped, closing connection");
                                return Ok(());
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await
                                .map_err(|e| WsError::SendFailed(e.to_string()))?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            waiting_for_pong = false;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Received close frame");
                            return Ok(());
                        }
                        Some(Err(e)) => {
                            return Err(WsError::ConnectionFailed(e.to_string()));
                        }
                        None => {
                            return Err(WsError::ConnectionFailed("Stream ended unexpectedly".into()));
                        }
                        _ => {}
                    }
                }

                // Send periodic pings; a missing pong forces a reconnect
                _ = ping_interval.tick() => {
                    if waiting_for_pong {
                        return Err(WsError::ConnectionFailed("Pong timeout".into()));
                    }
                    write.send(Message::Ping(vec![])).await
                        .map_err(|e| WsError::SendFailed(e.to_string()))?;
                    waiting_for_pong = true;
                }

                // Cooperative shutdown, observed even mid-read
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("Shutdown requested, closing connection");
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Apply ±10% uniform jitter to a delay
fn jittered(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.9..=1.1);
    delay.mul_f64(factor)
}
