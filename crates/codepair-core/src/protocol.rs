//! Relay wire protocol: one JSON object per text frame, discriminated by
//! `type`. Relayed payloads are opaque to the server.

use codepair_common::{ConnectionId, PairingError, PairingErrorKind, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pairing::{CodeStatus, IssuedCode};

/// Messages a client sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Ask for a fresh code; `ttl_secs` falls back to the server default.
    IssueCode {
        #[serde(default)]
        ttl_secs: Option<u64>,
    },
    /// Read-only joinability check.
    ValidateCode { code: String },
    JoinWithCode { code: String },
    Relay {
        event: String,
        #[serde(default)]
        payload: Value,
    },
    Leave,
    Ping,
}

/// Messages the relay sends back to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    CodeIssued {
        code: String,
        expires_in_seconds: u64,
    },
    CodeStatus {
        code: String,
        joinable: bool,
    },
    Paired {
        session_id: SessionId,
    },
    PairingError {
        kind: PairingErrorKind,
        message: String,
    },
    Relay {
        event: String,
        payload: Value,
        sender_id: ConnectionId,
    },
    PeerJoined {
        connection_id: ConnectionId,
    },
    PeerLeft {
        connection_id: ConnectionId,
    },
    Pong,
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to encode server message");
            r#"{"type":"error","message":"internal encoding error"}"#.to_string()
        })
    }
}

impl From<&PairingError> for ServerMessage {
    fn from(err: &PairingError) -> Self {
        Self::PairingError {
            kind: err.kind(),
            message: err.user_message().to_string(),
        }
    }
}

impl From<&IssuedCode> for ServerMessage {
    fn from(issued: &IssuedCode) -> Self {
        Self::CodeIssued {
            code: issued.code.to_string(),
            expires_in_seconds: issued.expires_in_seconds,
        }
    }
}

impl From<CodeStatus> for ServerMessage {
    fn from(status: CodeStatus) -> Self {
        Self::CodeStatus {
            code: status.code,
            joinable: status.joinable,
        }
    }
}
