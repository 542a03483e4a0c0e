//! Error taxonomy for the rewriting proxy
//! Every failure is scoped to a single request and mapped to an HTTP status

use hyper::StatusCode;
use thiserror::Error;

/// Errors produced while verifying, fetching, rewriting or minifying a target
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    /// A required query parameter was not supplied
    #[error("missing required parameter '{0}'")]
    MissingParameter(&'static str),

    /// The supplied token does not match the target URL
    #[error("signature does not match target url")]
    InvalidSignature,

    /// The target URL could not be parsed
    #[error("invalid target url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Only http and https targets are fetched
    #[error("unsupported url scheme '{0}'")]
    UnsupportedScheme(String),

    /// Network-level failure talking to the remote origin
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// The remote origin did not answer within the configured timeout
    #[error("timed out fetching {url}")]
    Timeout { url: String },

    /// The remote origin answered with a non-success status
    #[error("upstream {url} answered with status {status}")]
    UpstreamStatus { url: String, status: u16 },

    /// The fetched body exceeded the configured size cap
    #[error("response body from {url} exceeds {limit} bytes")]
    BodyTooLarge { url: String, limit: usize },

    /// The image endpoint fetched something that is not an image
    #[error("upstream {url} returned '{content_type}' where an image was expected")]
    NotAnImage { url: String, content_type: String },

    /// Remote markup could not be processed
    #[error("failed to parse {kind}: {reason}")]
    Parse { kind: &'static str, reason: String },

    /// Output normalization failed
    #[error("failed to minify {content_type}: {reason}")]
    Minify { content_type: String, reason: String },
}

impl ProxyError {
    /// HTTP status the response layer should answer with
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingParameter(_)
            | ProxyError::InvalidUrl { .. }
            | ProxyError::UnsupportedScheme(_) => StatusCode::BAD_REQUEST,
            ProxyError::InvalidSignature => StatusCode::FORBIDDEN,
            ProxyError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Fetch { .. }
            | ProxyError::UpstreamStatus { .. }
            | ProxyError::BodyTooLarge { .. }
            | ProxyError::NotAnImage { .. }
            | ProxyError::Parse { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::Minify { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True when the caller, not the proxy or the remote origin, is at fault
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}
