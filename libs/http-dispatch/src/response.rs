use crate::cancel::AbortSignal;
use crate::descriptor::{RequestDescriptor, ResponseType};
use crate::headers::parse_headers;
use crate::transport::CredentialsMode;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// What a transport reports for a completed exchange
///
/// `status` is a plain `u16` so that transports can report `0`, which some
/// platforms use for "no real response".
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub status_text: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Final URL after redirects, when the transport knows it
    pub url: Option<String>,
}

impl RawResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = Some(status_text.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replace the headers with a parsed raw `name: value` block
    #[must_use]
    pub fn with_raw_headers(mut self, raw: &str) -> Self {
        self.headers = parse_headers(raw);
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    Text(String),
    Json(serde_json::Value),
    Bytes(Bytes),
}

impl ResponseData {
    /// Decode `body` as requested by the descriptor
    ///
    /// Text decoding is lossy. An empty body decodes to JSON `null`.
    ///
    /// # Errors
    /// Returns the JSON error when a `Json` body does not parse.
    pub fn decode(body: Bytes, response_type: Option<ResponseType>) -> Result<Self, serde_json::Error> {
        match response_type.unwrap_or_default() {
            ResponseType::Text => Ok(Self::Text(String::from_utf8_lossy(&body).into_owned())),
            ResponseType::Json if body.is_empty() => Ok(Self::Json(serde_json::Value::Null)),
            ResponseType::Json => serde_json::from_slice(&body).map(Self::Json),
            ResponseType::Bytes => Ok(Self::Bytes(body)),
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct RequestInfo {
    method: Method,
    url: String,
    headers: HeaderMap,
    credentials: CredentialsMode,
}

/// Opaque handle to the request that was handed to the transport
///
/// Exposed for debugging; cloning is cheap.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    inner: Arc<RequestInfo>,
}

impl RequestHandle {
    pub(crate) fn new(
        method: Method,
        url: String,
        headers: HeaderMap,
        credentials: CredentialsMode,
    ) -> Self {
        Self {
            inner: Arc::new(RequestInfo {
                method,
                url,
                headers,
                credentials,
            }),
        }
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Headers as transmitted (sensitive values keep their flag)
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    #[must_use]
    pub fn credentials(&self) -> CredentialsMode {
        self.inner.credentials
    }
}

/// Response handed to the settlement policy and, on success, to the caller
#[derive(Debug)]
pub struct NormalizedResponse {
    pub data: ResponseData,
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    /// The descriptor this response answers
    pub config: Arc<RequestDescriptor>,
    pub request: RequestHandle,
    pub signal: AbortSignal,
}

impl NormalizedResponse {
    /// Deserialize the body into `T`
    ///
    /// # Errors
    /// Returns the JSON error if the data does not deserialize into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.data {
            ResponseData::Json(value) => serde_json::from_value(value.clone()),
            ResponseData::Text(text) => serde_json::from_str(text),
            ResponseData::Bytes(bytes) => serde_json::from_slice(bytes),
        }
    }
}

/// Reason phrase for a status, empty when unknown
#[must_use]
pub fn canonical_status_text(status: u16) -> String {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or_default()
        .to_owned()
}
