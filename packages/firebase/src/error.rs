use crate::executor::{TransportError, TransportErrorKind};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The connection or the wait for response headers ran past the
    /// reference's timeout budget.
    #[error("Request timed out: {source}")]
    Timeout {
        #[source]
        source: TransportError,
    },

    #[error("Transport error: {source}")]
    Transport {
        #[source]
        source: TransportError,
    },

    /// The store answered with a non-2xx status. `message` is the raw body.
    #[error("Remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Malformed URL {url:?}: {source}")]
    MalformedUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Too many redirects: stopped after {hops} requests")]
    TooManyRedirects { hops: usize },

    #[error("Invalid header {name:?}: {message}")]
    InvalidHeader { name: String, message: String },
}

impl Error {
    /// True for deadline failures, the only kind worth retrying with backoff.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Raw response body for [`Error::Remote`].
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            Error::Remote { message, .. } => Some(message),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization {
            message: error.to_string(),
        }
    }
}

impl From<TransportError> for Error {
    fn from(error: TransportError) -> Self {
        match error.kind() {
            TransportErrorKind::Timeout => Error::Timeout { source: error },
            TransportErrorKind::TooManyRedirects { hops } => Error::TooManyRedirects { hops },
            TransportErrorKind::Other => Error::Transport { source: error },
        }
    }
}
