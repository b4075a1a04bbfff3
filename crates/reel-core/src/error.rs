//! Error types for Reel Core

use thiserror::Error;

/// Result type alias for coordinator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coordinator error types
#[derive(Error, Debug)]
pub enum Error {
    // Request errors
    #[error("Invalid playback request: {0}")]
    InvalidRequest(String),

    #[error("Nothing playable found for {target}")]
    NotFound { target: String },

    #[error("Authentication required")]
    Unauthorized,

    // Transport errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend responded with status {status}: {message}")]
    Http { status: u16, message: String },

    // Manifest errors
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    // Session errors
    #[error("Event {event} not accepted in state {state}")]
    InvalidState { state: String, event: String },

    #[error("Unknown {kind} track: {id}")]
    UnknownTrack { kind: &'static str, id: u64 },

    #[error("Stale response for request #{sequence} (current #{current})")]
    StaleResponse { sequence: u64, current: u64 },

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid state error from displayable parts
    pub fn invalid_state(state: impl ToString, event: impl ToString) -> Self {
        Error::InvalidState {
            state: state.to_string(),
            event: event.to_string(),
        }
    }

    /// Returns true if the failed operation may be retried as-is
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true if the user has to authenticate again
    pub fn requires_auth(&self) -> bool {
        matches!(self, Error::Unauthorized)
    }

    /// Returns the error code for logs and CLI output
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidRequest(_) => "INVALID_REQUEST",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Unauthorized => "UNAUTHORIZED",
            Error::Network(_) => "NETWORK",
            Error::Http { .. } => "HTTP",
            Error::InvalidManifest(_) => "INVALID_MANIFEST",
            Error::Decode(_) => "DECODE",
            Error::InvalidState { .. } => "INVALID_STATE",
            Error::UnknownTrack { .. } => "UNKNOWN_TRACK",
            Error::StaleResponse { .. } => "STALE_RESPONSE",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Io(_) => "IO",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::Decode(err.to_string())
        } else {
            Error::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}
