use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),

    #[error("cannot write config file {0}: {1}")]
    WriteFailed(PathBuf, String),
}

/// Failures of the code store backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("code store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt pairing record: {0}")]
    Corrupt(String),
}

/// Wire discriminant for [`PairingError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PairingErrorKind {
    NotFoundOrExpired,
    AlreadyClaimed,
    ExhaustedCodeSpace,
    StoreUnavailable,
}

/// Outcome taxonomy for pairing operations. Each kind asks the user (or the
/// operator) for a different corrective action, so they are never collapsed
/// into a generic failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PairingError {
    #[error("code not found or expired")]
    NotFoundOrExpired,

    #[error("code already claimed")]
    AlreadyClaimed,

    #[error("no free code after {attempts} attempts")]
    ExhaustedCodeSpace { attempts: u32 },

    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
}

impl PairingError {
    pub fn kind(&self) -> PairingErrorKind {
        match self {
            Self::NotFoundOrExpired => PairingErrorKind::NotFoundOrExpired,
            Self::AlreadyClaimed => PairingErrorKind::AlreadyClaimed,
            Self::ExhaustedCodeSpace { .. } => PairingErrorKind::ExhaustedCodeSpace,
            Self::StoreUnavailable(_) => PairingErrorKind::StoreUnavailable,
        }
    }

    /// Only store outages are worth retrying; every other kind is final for
    /// the call that produced it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Message shown to the person who typed the code.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotFoundOrExpired => {
                "That code doesn't exist or has expired. Check it for typos or ask for a new one."
            }
            Self::AlreadyClaimed => "That code has already been used. Ask for a new one.",
            Self::ExhaustedCodeSpace { .. } => {
                "No pairing codes are available right now. Try again shortly."
            }
            Self::StoreUnavailable(_) => "Pairing is temporarily unavailable. Try again.",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodepairError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
