//! Error taxonomy for the Nudge client
//!
//! Library code returns [`NudgeError`]; the binary wraps it in `anyhow` with
//! command-level context. Ambiguous app matches are not errors: they are
//! reported as an ambiguous [`crate::resolver::AppResolution`] and handled as data.

use reqwest::StatusCode;
use thiserror::Error;

/// Convenience alias used by every library module
pub type Result<T, E = NudgeError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum NudgeError {
    /// A field, allowed value or app could not be located
    #[error("not found: {0}")]
    NotFound(String),

    /// The API answered with a non-2xx status other than a recoverable 401
    #[error("{method} {path} failed with status {status}: {body}")]
    Transport {
        method: &'static str,
        path: String,
        status: StatusCode,
        body: String,
    },

    /// Malformed batch input, detected before any write is issued
    #[error("invalid input: {0}")]
    Validation(String),

    /// Credential missing, unrefreshable, or rejected twice
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The operator prompt could not be shown or read
    #[error("prompt failed: {0}")]
    Prompt(String),
}

impl NudgeError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(what: impl Into<String>) -> Self {
        Self::Validation(what.into())
    }

    /// Whether a retry of the same request could plausibly succeed.
    ///
    /// Rate limiting (429), server errors and connection/timeout failures are
    /// transient; everything else is a property of the request itself.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Transport { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::Request(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Whether the server certainly did not act on the request, so that even
    /// a non-idempotent write may be sent again.
    pub fn is_safe_to_resend(&self) -> bool {
        match self {
            Self::Transport { status, .. } => *status == StatusCode::TOO_MANY_REQUESTS,
            Self::Request(e) => e.is_connect(),
            _ => false,
        }
    }
}

impl From<dialoguer::Error> for NudgeError {
    fn from(err: dialoguer::Error) -> Self {
        Self::Prompt(err.to_string())
    }
}
