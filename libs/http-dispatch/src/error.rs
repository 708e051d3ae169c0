use crate::cancel::Cancel;
use crate::descriptor::RequestDescriptor;
use crate::response::{NormalizedResponse, RequestHandle};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Message used for every transport-level failure
pub const NETWORK_ERROR_MESSAGE: &str = "Network Error";

/// Stable machine-readable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCode {
    /// Descriptor contained an unusable method, header or option
    BadOptionValue,
    /// URL could not be assembled or parsed
    InvalidUrl,
    /// Request timed out or was aborted without a cancel reason
    ConnectionAborted,
    /// Settlement rejected a 4xx response
    BadRequest,
    /// Settlement rejected a 5xx (or otherwise unaccepted) response
    BadResponse,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadOptionValue => "ERR_BAD_OPTION_VALUE",
            Self::InvalidUrl => "ERR_INVALID_URL",
            Self::ConnectionAborted => "ECONNABORTED",
            Self::BadRequest => "ERR_BAD_REQUEST",
            Self::BadResponse => "ERR_BAD_RESPONSE",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured request failure
///
/// Carries the original descriptor (`config`), an optional [`ErrorCode`],
/// the in-flight request handle when the transport was reached, and the
/// response when the failure came from settlement.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct RequestError {
    pub message: String,
    pub code: Option<ErrorCode>,
    pub config: Arc<RequestDescriptor>,
    pub request: Option<RequestHandle>,
    pub response: Option<Box<NormalizedResponse>>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RequestError {
    #[must_use]
    pub fn new(
        message: impl Into<String>,
        config: Arc<RequestDescriptor>,
        code: Option<ErrorCode>,
        request: Option<RequestHandle>,
    ) -> Self {
        Self {
            message: message.into(),
            code,
            config,
            request,
            response: None,
            source: None,
        }
    }

    #[must_use]
    pub fn with_response(mut self, response: NormalizedResponse) -> Self {
        self.response = Some(Box::new(response));
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl From<RequestError> for DispatchError {
    fn from(err: RequestError) -> Self {
        DispatchError::Request(Box::new(err))
    }
}

/// Dispatch outcome error
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DispatchError {
    /// The descriptor's cancel token fired before the transport settled
    #[error("{0}")]
    Cancelled(Cancel),

    /// Network, timeout, option or settlement failure
    #[error(transparent)]
    Request(Box<RequestError>),

    /// Invalid header name supplied while building a descriptor
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value supplied while building a descriptor
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Invalid option supplied while building a descriptor or dispatcher
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// TLS setup failed while building the default transport
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl DispatchError {
    pub(crate) fn option(reason: impl Into<String>) -> Self {
        Self::InvalidOption(reason.into())
    }

    #[must_use]
    pub fn is_cancel(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Error code of a request failure
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Request(err) => err.code,
            Self::InvalidHeaderName(_) | Self::InvalidHeaderValue(_) | Self::InvalidOption(_) => {
                Some(ErrorCode::BadOptionValue)
            }
            Self::Cancelled(_) | Self::Tls(_) => None,
        }
    }

    #[must_use]
    pub fn as_request_error(&self) -> Option<&RequestError> {
        match self {
            Self::Request(err) => Some(err),
            _ => None,
        }
    }

    #[must_use]
    pub fn cancel_reason(&self) -> Option<&Cancel> {
        match self {
            Self::Cancelled(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Failure reported by a transport
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// Connection, DNS, TLS handshake, protocol or body read failure
    #[error("Transport error: {0}")]
    Network(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The request's timeout elapsed
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The abort signal fired
    #[error("Request aborted")]
    Aborted,

    /// Decoded response body exceeded the configured limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// Request body could not be serialized
    #[error("Failed to encode request body: {0}")]
    Encode(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// URL rejected by the transport (scheme or syntax)
    #[error("URL '{url}' rejected: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Request could not be assembled from its parts
    #[error("Failed to build request: {0}")]
    Build(#[from] http::Error),
}

impl From<hyper_util::client::legacy::Error> for TransportError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        TransportError::Network(Box::new(err))
    }
}
