//! Typed failures for relay handlers and the policy applied to each kind.

use teloxide::{DownloadError, RequestError};
use thiserror::Error;
use tracing::{Level, error, info, warn};

use crate::config::ConfigError;
use crate::relay::replies;

/// Broad class of a failure, which decides how it is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input from the user. Reported back, not an error in the logs.
    Validation,
    /// Download, send, forward or storage failure. Logged; handlers never retry.
    Transient,
    /// Broken configuration. The process does not start.
    Configuration,
}

/// What to do with a failure of a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Reply to the sender, when the handler has one.
    pub notify_sender: bool,
    pub level: Level,
    pub fatal: bool,
}

impl ErrorKind {
    pub const fn policy(self) -> Policy {
        match self {
            ErrorKind::Validation => Policy { notify_sender: true, level: Level::INFO, fatal: false },
            ErrorKind::Transient => Policy { notify_sender: true, level: Level::WARN, fatal: false },
            ErrorKind::Configuration => Policy { notify_sender: false, level: Level::ERROR, fatal: true },
        }
    }
}

/// Failure inside a relay handler.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("voice clip is {duration}s long, limit is {limit}s")]
    VoiceTooLong { duration: u32, limit: u32 },
    #[error("telegram request failed: {0}")]
    Telegram(#[from] RequestError),
    #[error("file download failed: {0}")]
    Download(#[from] DownloadError),
    #[error("voice storage failed: {0}")]
    Storage(#[from] std::io::Error),
    #[error("reaction ledger failed: {0}")]
    Ledger(#[from] rusqlite::Error),
}

impl RelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::VoiceTooLong { .. } => ErrorKind::Validation,
            _ => ErrorKind::Transient,
        }
    }

    /// Text shown to the sender. Transient failures get a generic message.
    pub fn user_message(&self) -> String {
        match self {
            RelayError::VoiceTooLong { limit, .. } => replies::voice_too_long(*limit),
            _ => replies::FAILURE.to_string(),
        }
    }
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

/// Log a handler failure at the level its policy asks for.
pub fn log_failure(err: &RelayError, context: &str) {
    let kind = err.kind();
    let level = kind.policy().level;
    if level == Level::ERROR {
        error!(?kind, "{context}: {err}");
    } else if level == Level::WARN {
        warn!(?kind, "{context}: {err}");
    } else {
        info!(?kind, "{context}: {err}");
    }
}
