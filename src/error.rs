//! Error types for the stub client.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while configuring stubs or answering a request.
#[derive(Debug, Error)]
pub enum Error {
    /// A constructor or builder received an argument it cannot work with.
    #[error("{0}")]
    InvalidArgument(String),

    /// A URI could not be parsed.
    #[error("invalid uri '{uri}': {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    /// A header name or value is not valid HTTP.
    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    /// A body pattern did not compile.
    #[error("invalid body pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// A file backing a stubbed response could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A request body publisher neither completed nor failed in time.
    #[error("timed out after {0:?} waiting for the request body")]
    Timeout(Duration),

    /// The matched stub asked for a simulated transport failure.
    #[error("network error for {0}")]
    Network(Url),

    /// No registered stub accepted the request.
    #[error("no stub found for request\n\n{request}\n\nin {stubs}")]
    NoMatch { request: String, stubs: String },

    /// The operation exists on the client surface but is not emulated.
    #[error("{0} is not supported")]
    Unsupported(&'static str),

    /// Body delivery or decoding failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub(crate) fn invalid_uri(uri: &str, source: url::ParseError) -> Self {
        Error::InvalidUri {
            uri: uri.to_string(),
            source,
        }
    }

    pub(crate) fn invalid_header(name: &str, reason: impl ToString) -> Self {
        Error::InvalidHeader {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error was raised while building stubs, matchers or requests.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidArgument(_)
                | Error::InvalidUri { .. }
                | Error::InvalidHeader { .. }
                | Error::InvalidPattern(_)
        )
    }

    /// Whether a bounded wait expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Io(e) => e,
            Error::Resource { source, .. } => source,
            Error::Timeout(_) => io::Error::new(io::ErrorKind::TimedOut, error),
            Error::Unsupported(_) => io::Error::new(io::ErrorKind::Unsupported, error),
            e if e.is_configuration() => io::Error::new(io::ErrorKind::InvalidInput, e),
            e => io::Error::other(e),
        }
    }
}
