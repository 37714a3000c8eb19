//! Gateway wire protocol: opcodes, close codes and payload builders.
//!
//! Only the opcodes needed to keep a session alive are modelled; dispatch
//! event payloads are carried as opaque `serde_json::Value`.

use serde::{Deserialize, Serialize};

use crate::identity::IdentityMaterial;

// ── Opcodes ──────────────────────────────────────────────────

/// Gateway opcodes.
pub mod opcode {
    /// Event dispatch (receive only).
    pub const DISPATCH: u8 = 0;
    /// Heartbeat (bidirectional).
    pub const HEARTBEAT: u8 = 1;
    /// Identify (send only).
    pub const IDENTIFY: u8 = 2;
    /// Server requests reconnect (receive only).
    pub const RECONNECT: u8 = 7;
    /// Invalid session (receive only).
    pub const INVALID_SESSION: u8 = 9;
    /// Hello, carries the heartbeat interval (receive only).
    pub const HELLO: u8 = 10;
    /// Heartbeat ACK (receive only).
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// `WebSocket` close codes with a defined meaning for sessions.
pub mod close_code {
    /// Normal closure; also assumed when a close frame carries no code.
    pub const NORMAL: u16 = 1000;
    /// The gateway rejected the credential.
    pub const AUTHENTICATION_REJECTED: u16 = 4004;
}

// ── Wire Types ───────────────────────────────────────────────

/// Raw gateway payload as received/sent over `WebSocket`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayload {
    /// Opcode for the payload.
    pub op: u8,
    /// Event data (opcode-dependent).
    #[serde(default)]
    pub d: Option<serde_json::Value>,
    /// Sequence number (only for `op=0` dispatch events).
    #[serde(default)]
    pub s: Option<u64>,
    /// Event name (only for `op=0` dispatch events).
    #[serde(default)]
    pub t: Option<String>,
}

/// Hello payload (`op=10`).
#[derive(Debug, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval: u64,
}

// ── Builders ─────────────────────────────────────────────────

/// Build an Identify payload (`op=2`).
///
/// The client properties come from the session's identity material so every
/// connection of a run describes the same client.
#[must_use]
pub fn build_identify(token: &str, intents: u32, identity: &IdentityMaterial) -> GatewayPayload {
    GatewayPayload {
        op: opcode::IDENTIFY,
        d: Some(serde_json::json!({
            "token": token,
            "intents": intents,
            "properties": identity.properties(),
            "client_blob": identity.blob(),
        })),
        s: None,
        t: None,
    }
}

/// Build a Heartbeat payload (`op=1`).
#[must_use]
pub fn build_heartbeat(sequence: Option<u64>) -> GatewayPayload {
    GatewayPayload {
        op: opcode::HEARTBEAT,
        d: sequence.map(serde_json::Value::from),
        s: None,
        t: None,
    }
}
