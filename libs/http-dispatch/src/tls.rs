//! TLS setup for the hyper transport.
//!
//! Native root certificates are loaded from the OS store once per process and
//! cached; some platforms make that lookup slow.

use crate::config::{TlsRootConfig, TransportSecurity};
use crate::error::DispatchError;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls_pki_types::CertificateDer;
use std::sync::{Arc, OnceLock};

static NATIVE_ROOTS: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

fn load_native_roots() -> Vec<CertificateDer<'static>> {
    let result = rustls_native_certs::load_native_certs();
    for err in &result.errors {
        tracing::warn!(error = %err, "error loading native root certificate");
    }
    if result.certs.is_empty() {
        tracing::warn!("no native root CA certificates found");
    } else {
        tracing::debug!(count = result.certs.len(), "loaded native root certificates");
    }
    result.certs
}

/// Cached native root certificates (possibly empty)
#[must_use]
pub fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS.get_or_init(load_native_roots).as_slice()
}

/// Globally installed crypto provider, or aws-lc-rs without installing it
fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

fn native_client_config() -> Result<rustls::ClientConfig, DispatchError> {
    let certs = native_root_certs();
    if certs.is_empty() {
        return Err(tls_error("no native root CA certificates found in OS certificate store"));
    }

    let mut roots = rustls::RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs.iter().cloned());
    if ignored > 0 {
        tracing::warn!(added, ignored, "some native root certificates could not be parsed");
    }
    if added == 0 {
        return Err(tls_error("no valid native root CA certificates could be parsed"));
    }

    rustls::ClientConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| DispatchError::Tls(Box::new(e)))
        .map(|builder| builder.with_root_certificates(roots).with_no_client_auth())
}

fn tls_error(reason: &str) -> DispatchError {
    DispatchError::Tls(reason.into())
}

/// HTTPS connector honouring the root source and transport security mode
///
/// Plain `http://` is only accepted by the connector with
/// [`TransportSecurity::AllowInsecureHttp`].
///
/// # Errors
/// Returns `DispatchError::Tls` when the selected root store cannot be used.
pub fn https_connector(
    roots: TlsRootConfig,
    security: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, DispatchError> {
    let builder = match roots {
        TlsRootConfig::WebPki => HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(crypto_provider())
            .map_err(|e| DispatchError::Tls(Box::new(e)))?,
        TlsRootConfig::Native => HttpsConnectorBuilder::new().with_tls_config(native_client_config()?),
    };

    let connector = match security {
        TransportSecurity::AllowInsecureHttp => builder.https_or_http().enable_http1().build(),
        TransportSecurity::TlsOnly => builder.https_only().enable_http1().build(),
    };
    Ok(connector)
}
