// Error types shared by the library. The binary wraps these in
// `anyhow::Error`; inside the library every fallible call returns one of
// the enums below so callers can match on the kind.

use crate::models::ValidationError;

/// Every failure the API client can report.
#[derive(Debug, thiserror::Error)]
pub enum SeaError {
    /// A model failed validation, inbound or outbound.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A credential or URL needed for the operation is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A numeric argument is outside the range the API accepts.
    #[error("{name} must be between {min} and {max}, got {value}")]
    Range {
        name: &'static str,
        min: u32,
        max: u32,
        value: u32,
    },

    /// The server answered with a non-2xx status.
    #[error("remote error ({status}): {body}")]
    Remote {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl SeaError {
    /// True for both remote kinds: a non-2xx answer or a transport failure.
    pub fn is_remote(&self) -> bool {
        matches!(self, SeaError::Remote { .. } | SeaError::Transport(_))
    }
}

/// A frame on the streaming socket that the listener cannot accept. These
/// stay inside the listener and surface as the reason of a `Close` event.
#[derive(Debug, thiserror::Error)]
pub enum StreamProtocolError {
    /// The frame is not JSON or has no `type`.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The frame has a `type` the listener does not know.
    #[error("unrecognized frame type `{0}`")]
    UnknownType(String),

    /// The server sent an `error` frame.
    #[error("server error frame: {0}")]
    Server(String),

    /// A `message` frame whose content is not a valid post.
    #[error("invalid post in message frame: {0}")]
    InvalidPost(#[source] ValidationError),
}
