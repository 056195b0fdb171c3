//! Error types for the backend communication layer.
//!
//! # Design
//! A failed remote call produces exactly one `RemoteError`. `Network` and
//! `Http` are the two kinds callers branch on: the first means the server was
//! never reached, the second means it answered with a non-2xx status. A
//! transport failure that is not a reachability problem is re-raised
//! unchanged as `Transport`.
//!
//! Transform failures are not part of this taxonomy. `RemoteClient::call` is
//! generic over the caller's error type, so a failing transform surfaces as
//! whatever the transform returned; `CallError` is a ready-made error type
//! for callers that do not need their own.

use thiserror::Error;
use url::Url;

/// Boxed error produced by a caller-supplied transform.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure reported by a `Transport` when no response could be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server could not be reached (DNS, connect, I/O, timeout).
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// Any other transport-side failure.
    #[error("{0}")]
    Other(String),
}

/// Failure of a remote call between issuing the request and decoding the
/// response body.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The transport never completed the exchange.
    #[error("could not fetch from {url}: unable to reach '{url}', cause: {cause}")]
    Network { url: Url, cause: String },

    /// The server answered with a non-success status.
    #[error(
        "could not fetch from {url}: requested resource '{url}' answered with status {status}, headers: {}",
        headers_json(.headers)
    )]
    Http {
        url: Url,
        status: u16,
        headers: Vec<(String, String)>,
    },

    /// A transport failure that is not a reachability problem.
    #[error(transparent)]
    Transport(TransportError),

    /// A success response whose body is not valid JSON.
    #[error("could not fetch from {url}: response body is not JSON: {cause}")]
    MalformedBody {
        url: Url,
        #[source]
        cause: serde_json::Error,
    },
}

impl RemoteError {
    /// Target URL of the failed call, when the failure is tied to one.
    pub fn url(&self) -> Option<&Url> {
        match self {
            RemoteError::Network { url, .. }
            | RemoteError::Http { url, .. }
            | RemoteError::MalformedBody { url, .. } => Some(url),
            RemoteError::Transport(_) => None,
        }
    }

    /// HTTP status for `Http` failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Error type for calls whose transform may fail.
#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The caller-supplied transform rejected the decoded JSON.
    #[error("transform failed: {0}")]
    Transform(#[source] BoxError),
}

impl CallError {
    pub fn transform(err: impl Into<BoxError>) -> Self {
        CallError::Transform(err.into())
    }
}

/// A query parameter was present in the address but could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not decode query parameter value {name}={raw}")]
pub struct DecodeError {
    pub name: String,
    pub raw: String,
}

/// Invalid client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid origin '{value}': {reason}")]
    InvalidOrigin { value: String, reason: String },

    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

/// Serialize headers as a JSON array of `[name, value]` pairs.
fn headers_json(headers: &[(String, String)]) -> String {
    serde_json::to_string(headers).unwrap_or_default()
}
