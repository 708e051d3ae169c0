use crate::config::{TlsRootConfig, TransportConfig, TransportSecurity};
use crate::context::{CookieJar, ExecutionContext};
use crate::dispatcher::Dispatcher;
use crate::error::{DispatchError, TransportError};
use crate::layers::UserAgentLayer;
use crate::response::RawResponse;
use crate::settle::{SettlementPolicy, ValidateStatus};
use crate::tls;
use crate::transport::{self, HyperService, HyperTransport, ResponseBody, Transport, TransportRequest};
use bytes::Bytes;
use http::Response;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::sync::Arc;
use std::time::Duration;
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

/// Builder for [`HyperTransport`]
#[derive(Debug, Default)]
pub struct HyperTransportBuilder {
    config: TransportConfig,
    cookies: Option<Arc<CookieJar>>,
}

impl HyperTransportBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: TransportConfig) -> Self {
        Self {
            config,
            cookies: None,
        }
    }

    /// Timeout for requests whose descriptor does not set one
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Use `TransportSecurity::AllowInsecureHttp` only for testing with mock servers.
    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Allow plain `http://` URLs (testing only)
    ///
    /// Available in debug builds or with the `allow-insecure-http` feature.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "http_dispatch::security",
            "allow_insecure_http() called - HTTP traffic will NOT be encrypted"
        );
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Cookie store consulted for `CredentialsMode::Include` requests
    #[must_use]
    pub fn cookie_jar(mut self, jar: Arc<CookieJar>) -> Self {
        self.cookies = Some(jar);
        self
    }

    /// Build the transport
    ///
    /// Stack (outer to inner): `UserAgent → Decompression → hyper client`.
    /// Timeouts, abort and body limits are applied per request by
    /// [`HyperTransport`] itself.
    ///
    /// # Errors
    /// Returns an error if the User-Agent is not a valid header value or TLS
    /// initialization fails.
    pub fn build(self) -> Result<HyperTransport, DispatchError> {
        if self.config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                target: "http_dispatch::security",
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for testing with mock servers"
            );
        }

        let https = tls::https_connector(self.config.tls_roots, self.config.transport)?;
        let hyper_client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .build::<_, Full<Bytes>>(https);

        let ua_layer = UserAgentLayer::try_new(&self.config.user_agent)?;

        let service = ServiceBuilder::new()
            .layer(ua_layer)
            .layer(DecompressionLayer::new())
            .service(hyper_client)
            .map_response(map_decompression_response)
            .map_err(TransportError::from);
        let service: HyperService = BoxCloneSyncService::new(service);

        Ok(HyperTransport {
            service,
            config: Arc::new(self.config),
            cookies: self.cookies,
        })
    }
}

fn map_decompression_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    let boxed_body: ResponseBody = body.map_err(Into::into).boxed();
    Response::from_parts(parts, boxed_body)
}

/// Builder for [`Dispatcher`]
///
/// Defaults: [`HyperTransport`] with [`TransportConfig::default`], a headless
/// [`ExecutionContext`], and [`ValidateStatus`] settlement.
#[must_use]
#[derive(Default)]
pub struct DispatcherBuilder {
    transport: Option<Transport>,
    transport_config: Option<TransportConfig>,
    context: ExecutionContext,
    settlement: Option<Arc<dyn SettlementPolicy>>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom transport instead of the default [`HyperTransport`]
    pub fn transport<S>(mut self, service: S) -> Self
    where
        S: Service<TransportRequest, Response = RawResponse, Error = TransportError>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        self.transport = Some(transport::boxed(service));
        self
    }

    /// Configuration of the default transport; ignored with a custom one
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = Some(config);
        self
    }

    pub fn context(mut self, context: ExecutionContext) -> Self {
        self.context = context;
        self
    }

    pub fn settlement(mut self, policy: impl SettlementPolicy + 'static) -> Self {
        self.settlement = Some(Arc::new(policy));
        self
    }

    /// # Errors
    /// Returns an error if the default transport cannot be built.
    pub fn build(self) -> Result<Dispatcher, DispatchError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let config = self.transport_config.unwrap_or_default();
                transport::boxed(HyperTransportBuilder::with_config(config).build()?)
            }
        };

        Ok(Dispatcher {
            transport,
            context: Arc::new(self.context),
            settlement: self.settlement.unwrap_or_else(|| Arc::new(ValidateStatus)),
        })
    }
}

impl std::fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("custom_transport", &self.transport.is_some())
            .field("transport_config", &self.transport_config)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = HyperTransportBuilder::new();
        assert_eq!(builder.config.default_timeout, None);
        assert_eq!(builder.config.transport, TransportSecurity::TlsOnly);
        assert!(builder.cookies.is_none());
    }

    #[test]
    fn test_builder_setters() {
        let builder = HyperTransportBuilder::new()
            .timeout(Duration::from_secs(5))
            .user_agent("custom/1.0")
            .max_body_size(1024)
            .tls_roots(TlsRootConfig::Native)
            .transport(TransportSecurity::AllowInsecureHttp);

        assert_eq!(builder.config.default_timeout, Some(Duration::from_secs(5)));
        assert_eq!(builder.config.user_agent, "custom/1.0");
        assert_eq!(builder.config.max_body_size, 1024);
        assert_eq!(builder.config.tls_roots, TlsRootConfig::Native);
        assert_eq!(builder.config.transport, TransportSecurity::AllowInsecureHttp);
    }

    #[test]
    fn test_allow_insecure_http() {
        let builder = HyperTransportBuilder::new().allow_insecure_http();
        assert_eq!(builder.config.transport, TransportSecurity::AllowInsecureHttp);
    }

    #[tokio::test]
    async fn test_build_default_transport() {
        let transport = HyperTransportBuilder::new().build().unwrap();
        assert_eq!(transport.config.transport, TransportSecurity::TlsOnly);
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_user_agent() {
        let result = HyperTransportBuilder::new().user_agent("bad\nagent").build();
        assert!(matches!(result, Err(DispatchError::InvalidHeaderValue(_))));
    }

    #[tokio::test]
    async fn test_dispatcher_builder_default_transport() {
        let dispatcher = DispatcherBuilder::new().build();
        assert!(dispatcher.is_ok());
    }
}
