use crate::body::RequestBody;
use crate::cancel::CancelToken;
use crate::config::{DEFAULT_XSRF_COOKIE_NAME, DEFAULT_XSRF_HEADER_NAME};
use crate::error::DispatchError;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Custom query string serializer
///
/// Receives the descriptor params in insertion order and returns the encoded
/// query string without a leading `?`.
pub type ParamsSerializer = Arc<dyn Fn(&[(String, String)]) -> String + Send + Sync>;

/// Per-request status predicate used by [`ValidateStatus`](crate::ValidateStatus)
pub type StatusValidator = Arc<dyn Fn(u16) -> bool + Send + Sync>;

/// How the raw response body is decoded into [`ResponseData`](crate::ResponseData)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ResponseType {
    /// UTF-8 text (lossy)
    #[default]
    Text,
    /// Parsed JSON value
    Json,
    /// Raw bytes, untouched
    #[serde(alias = "arraybuffer", alias = "blob")]
    Bytes,
}

impl FromStr for ResponseType {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "bytes" | "arraybuffer" | "blob" => Ok(Self::Bytes),
            other => Err(DispatchError::option(format!(
                "unsupported response type '{other}'"
            ))),
        }
    }
}

/// HTTP Basic credentials
///
/// Missing fields are encoded as empty strings.
#[derive(Clone, Default)]
pub struct BasicAuth {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl BasicAuth {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Transport-agnostic description of one request
///
/// The dispatcher reads the descriptor and never mutates it: the header map
/// sent on the wire is a new map derived from [`headers`](Self::headers).
/// After dispatch the descriptor is available as `config` on the response
/// and on every [`RequestError`](crate::RequestError).
///
/// # Example
///
/// ```ignore
/// let descriptor = RequestDescriptor::new("post", "/users")
///     .base_url("https://api.example.com")
///     .header("x-request-id", "abc123")?
///     .data(RequestBody::json(serde_json::json!({"name": "Alice"})))
///     .auth(BasicAuth::new("alice", "secret"))
///     .timeout(Duration::from_secs(5));
/// ```
#[must_use = "a RequestDescriptor does nothing until dispatched"]
pub struct RequestDescriptor {
    /// HTTP verb in any case; uppercased before transmission
    pub method: String,
    pub url: String,
    pub base_url: Option<String>,
    /// Query parameters in insertion order
    pub params: Vec<(String, String)>,
    pub params_serializer: Option<ParamsSerializer>,
    pub headers: HeaderMap,
    /// Request payload; [`RequestBody::None`] means no body is transmitted
    pub data: RequestBody,
    pub auth: Option<BasicAuth>,
    pub with_credentials: Option<bool>,
    pub xsrf_cookie_name: Option<String>,
    pub xsrf_header_name: Option<String>,
    pub response_type: Option<ResponseType>,
    pub cancel_token: Option<CancelToken>,
    /// Zero is treated as "no timeout"
    pub timeout: Option<Duration>,
    pub timeout_error_message: Option<String>,
    pub validate_status: Option<StatusValidator>,
    /// Cap on the decoded response body; `None` uses the transport default
    pub max_content_length: Option<usize>,
}

impl RequestDescriptor {
    /// Descriptor with the default XSRF cookie/header names and no body
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            base_url: None,
            params: Vec::new(),
            params_serializer: None,
            headers: HeaderMap::new(),
            data: RequestBody::None,
            auth: None,
            with_credentials: None,
            xsrf_cookie_name: Some(DEFAULT_XSRF_COOKIE_NAME.to_owned()),
            xsrf_header_name: Some(DEFAULT_XSRF_HEADER_NAME.to_owned()),
            response_type: None,
            cancel_token: None,
            timeout: None,
            timeout_error_message: None,
            validate_status: None,
            max_content_length: None,
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn params_serializer(
        mut self,
        serializer: impl Fn(&[(String, String)]) -> String + Send + Sync + 'static,
    ) -> Self {
        self.params_serializer = Some(Arc::new(serializer));
        self
    }

    /// Append a header
    ///
    /// # Errors
    /// Returns `ERR_BAD_OPTION_VALUE` if the name or value is not a valid header.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, DispatchError> {
        let name = http::header::HeaderName::try_from(name)?;
        let value = http::header::HeaderValue::try_from(value)?;
        self.headers.append(name, value);
        Ok(self)
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn data(mut self, data: RequestBody) -> Self {
        self.data = data;
        self
    }

    pub fn auth(mut self, auth: BasicAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = Some(with_credentials);
        self
    }

    /// Set or clear the XSRF cookie name; `None` disables XSRF injection
    pub fn xsrf_cookie_name(mut self, name: Option<&str>) -> Self {
        self.xsrf_cookie_name = name.map(str::to_owned);
        self
    }

    pub fn xsrf_header_name(mut self, name: Option<&str>) -> Self {
        self.xsrf_header_name = name.map(str::to_owned);
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout_error_message(mut self, message: impl Into<String>) -> Self {
        self.timeout_error_message = Some(message.into());
        self
    }

    pub fn validate_status(mut self, validator: impl Fn(u16) -> bool + Send + Sync + 'static) -> Self {
        self.validate_status = Some(Arc::new(validator));
        self
    }

    pub fn max_content_length(mut self, limit: usize) -> Self {
        self.max_content_length = Some(limit);
        self
    }

    /// Effective timeout; zero durations count as unset
    #[must_use]
    pub fn effective_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }
}

impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("base_url", &self.base_url)
            .field("params", &self.params)
            .field("params_serializer", &self.params_serializer.is_some())
            .field("headers", &self.headers)
            .field("data", &self.data)
            .field("auth", &self.auth)
            .field("with_credentials", &self.with_credentials)
            .field("xsrf_cookie_name", &self.xsrf_cookie_name)
            .field("xsrf_header_name", &self.xsrf_header_name)
            .field("response_type", &self.response_type)
            .field("cancel_token", &self.cancel_token)
            .field("timeout", &self.timeout)
            .field("timeout_error_message", &self.timeout_error_message)
            .field("validate_status", &self.validate_status.is_some())
            .field("max_content_length", &self.max_content_length)
            .finish()
    }
}
