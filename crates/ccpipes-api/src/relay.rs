//! WebSocket relay transport with auto-reconnect.
//!
//! Connects to the session relay, forwards outbound [`Request`]s as JSON text
//! frames and delivers parsed [`ServerMessage`]s through a bounded
//! [`tokio::sync::mpsc`] channel. Inbound delivery is ordered and lossless:
//! factory diffs are only meaningful in sequence, so a lagging consumer
//! applies backpressure instead of dropping frames.
//!
//! # Example
//!
//! ```rust,ignore
//! use ccpipes_api::relay::{RelayHandle, ReconnectConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let (relay, mut inbound) =
//!     RelayHandle::connect("ws://localhost:3000", ReconnectConfig::default(), CancellationToken::new())?;
//!
//! while let Some(msg) = inbound.recv().await {
//!     println!("{msg:?}");
//! }
//! relay.shutdown();
//! ```

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::message::{Request, ServerMessage};

// ── Channel capacities ──────────────────────────────────────────────

const INBOUND_CHANNEL_CAPACITY: usize = 256;
const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── ReconnectConfig ─────────────────────────────────────────────────

/// Exponential backoff configuration for relay reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Consecutive failed attempts before giving up. `None` retries forever.
    /// Default: 10.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: Some(10),
        }
    }
}

// ── RelayState ──────────────────────────────────────────────────────

/// Connection state of the relay transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Connecting,
    /// Connected; `generation` increments on every successful (re)connect.
    Connected { generation: u64 },
    Disconnected,
    /// The retry budget was exhausted.
    Failed,
}

// ── RelayHandle ─────────────────────────────────────────────────────

/// Handle to a running relay connection.
///
/// Requests queued while disconnected are delivered after the next
/// successful reconnect.
pub struct RelayHandle {
    outbound: mpsc::Sender<Request>,
    state: watch::Receiver<RelayState>,
    cancel: CancellationToken,
}

impl RelayHandle {
    /// Spawn the connection loop for `url` and return the handle plus the
    /// inbound message receiver.
    ///
    /// Returns immediately; the first connection attempt happens in the
    /// background. Must be called from within a Tokio runtime.
    pub fn connect(
        url: &str,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<ServerMessage>), Error> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::RelayConnect(format!(
                "unsupported scheme '{}', expected ws or wss",
                url.scheme()
            )));
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(RelayState::Connecting);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            relay_loop(url, outbound_rx, inbound_tx, state_tx, reconnect, task_cancel).await;
        });

        let handle = Self {
            outbound: outbound_tx,
            state: state_rx,
            cancel,
        };
        Ok((handle, inbound_rx))
    }

    /// A sender for outbound requests, for wiring into an editor.
    pub fn sender(&self) -> mpsc::Sender<Request> {
        self.outbound.clone()
    }

    /// Queue a request for delivery.
    pub async fn send(&self, request: Request) -> Result<(), Error> {
        self.outbound
            .send(request)
            .await
            .map_err(|_| Error::RelayShutdown)
    }

    /// Subscribe to connection state changes.
    pub fn state(&self) -> watch::Receiver<RelayState> {
        self.state.clone()
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ────────────────────────────────────

/// How a single connection ended without a transport error.
enum ConnectionEnd {
    /// The relay closed the socket normally; reconnect.
    Closed,
    /// Cancellation or every local endpoint dropped; stop for good.
    Shutdown,
}

/// Main loop: connect → serve → on disconnect, backoff → reconnect.
async fn relay_loop(
    url: Url,
    mut outbound_rx: mpsc::Receiver<Request>,
    inbound_tx: mpsc::Sender<ServerMessage>,
    state_tx: watch::Sender<RelayState>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;
    let mut generation: u64 = 0;

    loop {
        state_tx.send_replace(RelayState::Connecting);

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = open(&url) => result,
        };

        match opened {
            Ok(stream) => {
                attempt = 0;
                generation += 1;
                state_tx.send_replace(RelayState::Connected { generation });
                tracing::info!(url = %url, generation, "Relay connected");

                match serve(stream, &mut outbound_rx, &inbound_tx, &cancel).await {
                    Ok(ConnectionEnd::Shutdown) => break,
                    Ok(ConnectionEnd::Closed) => {
                        tracing::info!("Relay disconnected cleanly, reconnecting");
                    }
                    Err(e) => tracing::warn!(error = %e, "Relay connection lost"),
                }
            }
            Err(e) => tracing::warn!(error = %e, attempt, "Relay connection failed"),
        }

        state_tx.send_replace(RelayState::Disconnected);

        if let Some(max) = reconnect.max_retries {
            if attempt >= max {
                tracing::error!(max_retries = max, "Relay reconnection limit reached, giving up");
                state_tx.send_replace(RelayState::Failed);
                return;
            }
        }

        let delay = calculate_backoff(attempt, &reconnect);
        tracing::info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "Waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        attempt = attempt.saturating_add(1);
    }

    state_tx.send_replace(RelayState::Disconnected);
    tracing::debug!("Relay loop exiting");
}

async fn open(url: &Url) -> Result<WsStream, Error> {
    tracing::debug!(url = %url, "Connecting to relay");
    let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::RelayConnect(e.to_string()))?;
    Ok(stream)
}

// ── Single connection lifecycle ─────────────────────────────────────

/// Pump frames in both directions until the connection drops.
///
/// At most one decoded frame is held while the inbound queue is full. Socket
/// reads pause until it is delivered, but outbound requests keep draining, so
/// a consumer that sends while handling a message never waits on this task.
async fn serve(
    stream: WsStream,
    outbound_rx: &mut mpsc::Receiver<Request>,
    inbound_tx: &mpsc::Sender<ServerMessage>,
    cancel: &CancellationToken,
) -> Result<ConnectionEnd, Error> {
    let (mut write, mut read) = stream.split();
    let mut held: Option<ServerMessage> = None;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(ConnectionEnd::Shutdown);
            }
            permit = inbound_tx.reserve(), if held.is_some() => {
                let Ok(permit) = permit else {
                    tracing::debug!("Inbound receiver dropped, closing relay");
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(ConnectionEnd::Shutdown);
                };
                if let Some(msg) = held.take() {
                    permit.send(msg);
                }
            }
            frame = read.next(), if held.is_none() => match frame {
                Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                    Ok(msg) => held = Some(msg),
                    Err(e) => tracing::warn!(error = %e, "Skipping undecodable relay frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    return match frame {
                        Some(cf) if cf.code != tungstenite::protocol::frame::coding::CloseCode::Normal => {
                            Err(Error::RelayClosed {
                                code: u16::from(cf.code),
                                reason: cf.reason.as_str().to_owned(),
                            })
                        }
                        _ => Ok(ConnectionEnd::Closed),
                    };
                }
                Some(Ok(Message::Ping(_))) => tracing::trace!("Relay ping"),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(Error::RelayConnect(e.to_string())),
                None => {
                    tracing::info!("Relay stream ended");
                    return Ok(ConnectionEnd::Closed);
                }
            },
            request = outbound_rx.recv() => {
                let Some(request) = request else {
                    tracing::debug!("All request senders dropped, closing relay");
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(ConnectionEnd::Shutdown);
                };
                let json = match serde_json::to_string(&request) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(error = %e, req_id = %request.req_id, "Failed to encode request");
                        continue;
                    }
                };
                tracing::debug!(req_id = %request.req_id, kind = %request.message_type(), "Sending request");
                write
                    .send(Message::text(json))
                    .await
                    .map_err(|e| Error::RelayConnect(e.to_string()))?;
            }
        }
    }
}

// ── Frame parsing ───────────────────────────────────────────────────

/// Decode a text frame, keeping the raw text on failure.
fn parse_frame(text: &str) -> Result<ServerMessage, Error> {
    serde_json::from_str(text).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: text.to_owned(),
    })
}

// ── Backoff calculation ─────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 ± 0.25)`
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter_factor).max(0.0))
}

// ── Tests ───────────────────────────────────────────────────────────
