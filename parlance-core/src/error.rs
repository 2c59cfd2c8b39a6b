use thiserror::Error;

/// All errors produced by parlance-core.
///
/// Provider-facing variants (`NoCredential`, `InvalidResponse`, `Remote`,
/// `Transport`) surface to callers for user-visible reporting. The sync
/// engine absorbs its own failures and never returns these; a failed sync
/// only shows up as a record that stays unsynced.
#[derive(Debug, Error)]
pub enum ParlanceError {
    #[error("no API credential configured for {0}")]
    NoCredential(&'static str),

    #[error("invalid response from remote service")]
    InvalidResponse,

    #[error("remote service error: {0}")]
    Remote(String),

    #[error("network transport error: {0}")]
    Transport(String),

    #[error("sync server is unreachable")]
    Disconnected,

    #[error("store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for ParlanceError {
    fn from(e: rusqlite::Error) -> Self {
        ParlanceError::Store(e.to_string())
    }
}

impl From<reqwest::Error> for ParlanceError {
    fn from(e: reqwest::Error) -> Self {
        ParlanceError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ParlanceError>;
