use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("login data incorrect")]
    InvalidCredentials,

    #[error("{attempts} incorrect login attempts")]
    AuthAttemptsExhausted { attempts: u32 },

    #[error("stored session is no longer valid")]
    SessionInvalid,

    #[error("session accepted but the search API denied access")]
    AccessDenied,

    #[error("flood control: access temporarily suspended by upstream")]
    FloodControl,

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("gave up on {operation} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: Box<Error>,
    },

    #[error("geo file {0:?} not found, run update_geo first")]
    GeoFileMissing(PathBuf),

    #[error("session file error: {0}")]
    SessionStore(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Transient failures: the same request is worth repeating after the short delay.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Decode(_) | Error::Network(_))
    }

    pub fn is_flood_control(&self) -> bool {
        matches!(self, Error::FloodControl)
    }
}
