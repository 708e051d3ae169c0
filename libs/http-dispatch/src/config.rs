use std::time::Duration;

/// Default User-Agent string for the hyper transport
pub const DEFAULT_USER_AGENT: &str = concat!("http-dispatch/", env!("CARGO_PKG_VERSION"));

/// Cookie read for the XSRF token unless the descriptor says otherwise
pub const DEFAULT_XSRF_COOKIE_NAME: &str = "XSRF-TOKEN";

/// Header the XSRF token is copied into unless the descriptor says otherwise
pub const DEFAULT_XSRF_HEADER_NAME: &str = "X-XSRF-TOKEN";

/// Default cap on decoded response bodies (10 MB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport security configuration
///
/// Controls whether the transport enforces TLS or allows insecure HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only) - default and recommended
    #[default]
    TlsOnly,
    /// Allow insecure HTTP connections (for testing with mock servers only)
    ///
    /// **WARNING**: This should only be used for local testing with mock servers.
    /// Never use in production as it exposes traffic to interception.
    AllowInsecureHttp,
}

/// Configuration of the default hyper transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Timeout applied when the descriptor does not set one (default: none)
    pub default_timeout: Option<Duration>,

    /// Maximum decoded response body size in bytes (default: 10 MB)
    ///
    /// A descriptor's `max_content_length` takes precedence.
    pub max_body_size: usize,

    /// User-Agent header value, added when the request has none
    pub user_agent: String,

    /// Transport security mode (default: `TlsOnly`)
    pub transport: TransportSecurity,

    /// TLS root certificate source (default: `WebPki`)
    pub tls_roots: TlsRootConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            default_timeout: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::WebPki,
        }
    }
}

impl TransportConfig {
    /// Configuration for tests against local plain-HTTP mock servers
    ///
    /// **WARNING**: Only use for local testing with mock servers.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            default_timeout: Some(Duration::from_secs(10)),
            transport: TransportSecurity::AllowInsecureHttp,
            ..Default::default()
        }
    }
}
