//! Error types for gateway sessions.

use crate::protocol::close_code;

/// Errors produced while opening or running a gateway connection.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// `WebSocket` transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Socket-level I/O error outside the `WebSocket` layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The gateway sent a close frame.
    #[error("Connection closed with code {code}: {reason}")]
    Closed {
        /// Close code from the frame (1000 when the frame carried none).
        code: u16,
        /// Close reason from the frame, possibly empty.
        reason: String,
    },

    /// The gateway rejected the credential (close code 4004).
    #[error("Authentication rejected (close code 4004), try a new credential")]
    AuthenticationRejected,

    /// A dropped connection could not be re-established.
    #[error("Failed to re-establish connection: {source}")]
    ReconnectFailed {
        /// Why the replacement connection could not be opened.
        #[source]
        source: Box<GatewayError>,
    },

    /// The gateway did not send a Hello payload in time.
    #[error("Timed out waiting for Hello from gateway")]
    HelloTimeout,

    /// A heartbeat went unacknowledged.
    #[error("Heartbeat ACK missed, connection is a zombie")]
    ZombieConnection,

    /// The gateway asked the client to reconnect.
    #[error("Gateway requested a reconnect")]
    ReconnectRequested,

    /// The gateway invalidated the session.
    #[error("Gateway invalidated the session")]
    InvalidSession,

    /// The proxy tunnel could not be established.
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// A URL could not be used to open a connection.
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        message: String,
    },

    /// Protocol violation from the gateway.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// The close code carried by this error, if it came from a close frame.
    #[must_use]
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::Closed { code, .. } => Some(*code),
            Self::AuthenticationRejected => Some(close_code::AUTHENTICATION_REJECTED),
            _ => None,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}
