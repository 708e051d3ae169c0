use crate::body::RequestBody;
use crate::cancel::AbortSignal;
use crate::config::{TransportConfig, TransportSecurity};
use crate::context::CookieJar;
use crate::error::TransportError;
use crate::response::{RawResponse, canonical_status_text};
use bytes::Bytes;
use http::header::{CONTENT_TYPE, COOKIE, HeaderValue};
use http::{HeaderMap, Method, Request, Response};
use http_body_util::{BodyExt, Full};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceExt};

/// Boxed response body after decompression
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// Type-erased hyper service stack used by [`HyperTransport`]
pub type HyperService =
    BoxCloneSyncService<Request<Full<Bytes>>, Response<ResponseBody>, TransportError>;

type TransportFuture = Pin<Box<dyn Future<Output = Result<RawResponse, TransportError>> + Send>>;

/// Any transport the dispatcher can drive
///
/// Use [`boxed`] to erase a concrete `tower::Service`.
pub type Transport = BoxCloneSyncService<TransportRequest, RawResponse, TransportError>;

/// Erase a concrete transport service into a [`Transport`]
///
/// # Example
///
/// ```ignore
/// let transport = http_dispatch::boxed(tower::service_fn(|req: TransportRequest| async move {
///     Ok::<_, TransportError>(RawResponse::new(200, "ok"))
/// }));
/// ```
#[must_use]
pub fn boxed<S>(service: S) -> Transport
where
    S: Service<TransportRequest, Response = RawResponse, Error = TransportError>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    BoxCloneSyncService::new(service)
}

/// Transport-level credential policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialsMode {
    /// Never attach credentials
    #[default]
    Omit,
    /// Attach credentials to same-origin requests only
    SameOrigin,
    /// Always attach credentials
    Include,
}

impl CredentialsMode {
    /// Map a descriptor's `with_credentials`: only `Some(true)` includes
    #[must_use]
    pub fn from_with_credentials(with_credentials: Option<bool>) -> Self {
        match with_credentials {
            Some(true) => Self::Include,
            Some(false) | None => Self::Omit,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Omit => "omit",
            Self::SameOrigin => "same-origin",
            Self::Include => "include",
        }
    }
}

/// Fully assembled request handed to a transport
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Uppercase method
    pub method: Method,
    /// Absolute URL including the serialized query string
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
    pub credentials: CredentialsMode,
    /// Aborted when the dispatch is cancelled
    pub signal: AbortSignal,
    pub timeout: Option<Duration>,
    pub timeout_error_message: Option<String>,
    pub max_content_length: Option<usize>,
}

/// Default transport: hyper over rustls
///
/// Stack (outer to inner): `UserAgent → Decompression → hyper client`.
/// Per request it encodes the body, applies the request (or configured
/// default) timeout, races the exchange against the abort signal, and reads
/// the whole decoded body up to the size limit. Redirects are not followed.
#[derive(Clone)]
pub struct HyperTransport {
    pub(crate) service: HyperService,
    pub(crate) config: Arc<TransportConfig>,
    pub(crate) cookies: Option<Arc<CookieJar>>,
}

impl HyperTransport {
    /// Transport with default configuration
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn new() -> Result<Self, crate::DispatchError> {
        crate::HyperTransportBuilder::new().build()
    }

    #[must_use]
    pub fn builder() -> crate::HyperTransportBuilder {
        crate::HyperTransportBuilder::new()
    }

    fn validate_url(&self, url: &str) -> Result<http::Uri, TransportError> {
        let uri: http::Uri = url.parse().map_err(|e: http::uri::InvalidUri| {
            TransportError::InvalidUrl {
                url: url.to_owned(),
                reason: e.to_string(),
            }
        })?;

        if uri.authority().is_none() {
            return Err(TransportError::InvalidUrl {
                url: url.to_owned(),
                reason: "missing host/authority".to_owned(),
            });
        }

        match uri.scheme_str() {
            Some("https") => Ok(uri),
            Some("http") if self.config.transport == TransportSecurity::AllowInsecureHttp => Ok(uri),
            Some("http") => Err(TransportError::InvalidUrl {
                url: url.to_owned(),
                reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
            }),
            Some(scheme) => Err(TransportError::InvalidUrl {
                url: url.to_owned(),
                reason: format!("scheme '{scheme}' is not supported"),
            }),
            None => Err(TransportError::InvalidUrl {
                url: url.to_owned(),
                reason: "missing scheme".to_owned(),
            }),
        }
    }

    fn build_request(&self, req: &TransportRequest) -> Result<Request<Full<Bytes>>, TransportError> {
        let uri = self.validate_url(&req.url)?;
        let (body, implied_content_type) = req.body.encode()?;

        let mut headers = req.headers.clone();
        if let Some(content_type) = implied_content_type {
            if req.body.is_form_data() {
                // Boundary must match the encoded body
                headers.insert(CONTENT_TYPE, content_type);
            } else {
                headers.entry(CONTENT_TYPE).or_insert(content_type);
            }
        }

        if req.credentials == CredentialsMode::Include
            && !headers.contains_key(COOKIE)
            && let Some(cookie) = self.cookies.as_ref().and_then(|jar| jar.header_value())
        {
            let mut value = HeaderValue::try_from(cookie).map_err(|e| TransportError::Build(e.into()))?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }

        let mut request = Request::builder()
            .method(req.method.clone())
            .uri(uri)
            .body(Full::new(body))?;
        *request.headers_mut() = headers;
        Ok(request)
    }

    async fn execute(self, req: TransportRequest) -> Result<RawResponse, TransportError> {
        let request = self.build_request(&req)?;
        let limit = req.max_content_length.unwrap_or(self.config.max_body_size);
        let timeout = req
            .timeout
            .or(self.config.default_timeout)
            .filter(|t| !t.is_zero());

        let mut service = self.service.clone();
        let url = req.url.clone();
        let exchange = async move {
            let response = service.ready().await?.call(request).await?;
            let status = response.status();
            let (parts, body) = response.into_parts();
            let body = read_body_limited(body, limit).await?;
            Ok(RawResponse {
                status: status.as_u16(),
                status_text: Some(canonical_status_text(status.as_u16())),
                headers: parts.headers,
                body,
                url: Some(url),
            })
        };

        let timed = async move {
            match timeout {
                Some(duration) => tokio::time::timeout(duration, exchange)
                    .await
                    .map_err(|_| TransportError::Timeout(duration))?,
                None => exchange.await,
            }
        };

        tokio::select! {
            biased;
            () = req.signal.aborted() => {
                tracing::debug!(url = %req.url, "transport aborted by signal");
                Err(TransportError::Aborted)
            }
            result = timed => result,
        }
    }
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("config", &self.config)
            .field("cookies", &self.cookies)
            .finish_non_exhaustive()
    }
}

impl Service<TransportRequest> for HyperTransport {
    type Response = RawResponse;
    type Error = TransportError;
    type Future = TransportFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: TransportRequest) -> Self::Future {
        Box::pin(self.clone().execute(req))
    }
}

/// Read the whole (decompressed) body, failing once `limit` is exceeded
async fn read_body_limited(body: ResponseBody, limit: usize) -> Result<Bytes, TransportError> {
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(TransportError::Network)?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(TransportError::BodyTooLarge {
                    limit,
                    actual: collected.len() + chunk.len(),
                });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}
