use thiserror::Error;

/// Top-level error type for the `ccpipes-api` crate.
///
/// Covers the relay transport and message encoding. `ccpipes-core` maps
/// these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Relay ───────────────────────────────────────────────────────
    /// WebSocket connection to the relay failed.
    #[error("Relay connection failed: {0}")]
    RelayConnect(String),

    /// The relay closed the connection unexpectedly.
    #[error("Relay closed (code {code}): {reason}")]
    RelayClosed { code: u16, reason: String },

    /// The relay task has shut down and no longer accepts requests.
    #[error("Relay is shut down")]
    RelayShutdown,

    // ── Data ────────────────────────────────────────────────────────
    /// A frame could not be decoded, with the raw text for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// An outbound message could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Relay URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
