//! Error types for the voice agent client

/// Result type alias using the client Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while establishing or holding a voice session
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Local audio capture was denied or no input device is available
    #[error("Media acquisition failed: {0}")]
    MediaAcquisition(String),

    /// Signaling server answered with a non-success HTTP status
    #[error("Signaling failed: server returned HTTP {status}")]
    SignalingStatus {
        /// HTTP status code returned by the server
        status: u16,
        /// Response body, if any was readable
        body: String,
    },

    /// Signaling server answered 2xx with a body that is not a session description
    #[error("Signaling failed: malformed answer: {0}")]
    SignalingMalformed(String),

    /// The signaling request never produced a response
    #[error("Signaling failed: {0}")]
    SignalingTransport(String),

    /// Offer/answer negotiation or transport setup failed
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// Operation not allowed in the current session state
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Operation timeout
    #[error("Operation timeout: {0}")]
    OperationTimeout(String),

    /// Opus encoder or decoder failure
    #[error("Audio codec error: {0}")]
    Codec(String),

    /// I/O error, e.g. failing to start an audio device thread
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Permission denied or no capture device
    MediaAcquisition,
    /// HTTP signaling round trip failed
    Signaling,
    /// Local transport rejected a description or could not be set up
    Negotiation,
    /// Configuration rejected before any work started
    Config,
    /// Call not allowed in the current state
    State,
    /// Anything else
    Other,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MediaAcquisition(_) => ErrorKind::MediaAcquisition,
            Error::SignalingStatus { .. }
            | Error::SignalingMalformed(_)
            | Error::SignalingTransport(_) => ErrorKind::Signaling,
            Error::Negotiation(_) | Error::OperationTimeout(_) => ErrorKind::Negotiation,
            Error::InvalidConfig(_) => ErrorKind::Config,
            Error::InvalidState(_) => ErrorKind::State,
            Error::Codec(_) | Error::Io(_) | Error::Other(_) => ErrorKind::Other,
        }
    }

    /// Check if this error came from the signaling round trip
    pub fn is_signaling_error(&self) -> bool {
        self.kind() == ErrorKind::Signaling
    }

    /// Check if a fresh `connect()` may succeed after this error
    ///
    /// The controller never retries on its own; this only tells the caller
    /// whether the controller is still usable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::MediaAcquisition | ErrorKind::Signaling | ErrorKind::Negotiation
        )
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    pub(crate) fn negotiation(context: &str, err: impl std::fmt::Display) -> Self {
        Error::Negotiation(format!("{}: {}", context, err))
    }
}
