//! Execution context capabilities.
//!
//! XSRF injection only makes sense where there is a cookie store and a
//! notion of "current origin", i.e. a browser-like host. Instead of sniffing
//! the environment, the dispatcher is handed an [`ExecutionContext`] that
//! states which of these capabilities exist.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use url::Url;

/// Read access to the cookie store used for XSRF tokens
pub trait CookieReader: Send + Sync {
    /// Value of the named cookie, if present
    fn read(&self, name: &str) -> Option<String>;
}

/// In-memory cookie store for a single origin
///
/// Accepts `document.cookie`-style input (`a=1; b=2`). Values are stored
/// percent-decoded. Internally synchronized, so it can be shared between a
/// context and a transport via `Arc`.
#[derive(Default)]
pub struct CookieJar {
    cookies: RwLock<BTreeMap<String, String>>,
}

impl CookieJar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a jar from a `name=value; name2=value2` string
    #[must_use]
    pub fn parse(cookie_string: &str) -> Self {
        let jar = Self::new();
        for pair in cookie_string.split(';') {
            if let Some((name, value)) = pair.split_once('=') {
                jar.set(name.trim(), value.trim());
            }
        }
        jar
    }

    /// Insert or replace a cookie; the value is percent-decoded
    pub fn set(&self, name: &str, value: &str) {
        if name.is_empty() {
            return;
        }
        let decoded = urlencoding::decode(value).map_or_else(|_| value.to_owned(), |v| v.into_owned());
        if let Ok(mut cookies) = self.cookies.write() {
            cookies.insert(name.to_owned(), decoded);
        }
    }

    pub fn remove(&self, name: &str) {
        if let Ok(mut cookies) = self.cookies.write() {
            cookies.remove(name);
        }
    }

    /// Render as a `Cookie` request header value
    #[must_use]
    pub fn header_value(&self) -> Option<String> {
        let cookies = self.cookies.read().ok()?;
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|(name, value)| format!("{name}={}", urlencoding::encode(value)))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

impl CookieReader for CookieJar {
    fn read(&self, name: &str) -> Option<String> {
        self.cookies.read().ok()?.get(name).cloned()
    }
}

impl fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.cookies.read().map_or(0, |c| c.len());
        f.debug_struct("CookieJar").field("cookies", &count).finish()
    }
}

/// Capability descriptor of the host the dispatcher runs in
///
/// The default context has neither a cookie store nor an origin, which makes
/// XSRF injection a no-op (server, worker or CLI hosts).
#[derive(Clone, Default)]
pub struct ExecutionContext {
    origin: Option<Url>,
    cookies: Option<Arc<dyn CookieReader>>,
}

impl ExecutionContext {
    /// Context without browser capabilities
    #[must_use]
    pub fn headless() -> Self {
        Self::default()
    }

    /// Browser-like context: a current origin plus a cookie store
    #[must_use]
    pub fn browser(origin: Url, cookies: Arc<dyn CookieReader>) -> Self {
        Self {
            origin: Some(origin),
            cookies: Some(cookies),
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = Some(origin);
        self
    }

    #[must_use]
    pub fn with_cookies(mut self, cookies: Arc<dyn CookieReader>) -> Self {
        self.cookies = Some(cookies);
        self
    }

    #[must_use]
    pub fn has_cookie_store(&self) -> bool {
        self.cookies.is_some()
    }

    #[must_use]
    pub fn has_same_origin_check(&self) -> bool {
        self.origin.is_some()
    }

    /// Both capabilities needed for XSRF injection are present
    #[must_use]
    pub fn is_standard_browser(&self) -> bool {
        self.has_cookie_store() && self.has_same_origin_check()
    }

    /// Compare the URL's origin with the context origin
    ///
    /// Relative URLs are resolved against the context origin and are
    /// therefore same-origin. Without an origin nothing is same-origin.
    #[must_use]
    pub fn is_same_origin(&self, url: &str) -> bool {
        let Some(origin) = &self.origin else {
            return false;
        };
        match origin.join(url) {
            Ok(resolved) => resolved.origin() == origin.origin(),
            Err(_) => false,
        }
    }

    /// Resolve `url` to an absolute URL
    ///
    /// Relative and protocol-relative URLs need a context origin.
    ///
    /// # Errors
    /// Returns the parse error when the URL cannot be resolved.
    pub fn resolve_url(&self, url: &str) -> Result<Url, url::ParseError> {
        match &self.origin {
            Some(origin) => origin.join(url),
            None => Url::parse(url),
        }
    }

    /// Read a cookie through the configured store
    #[must_use]
    pub fn read_cookie(&self, name: &str) -> Option<String> {
        self.cookies.as_ref()?.read(name)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("origin", &self.origin.as_ref().map(Url::as_str))
            .field("has_cookie_store", &self.has_cookie_store())
            .finish()
    }
}
