//! Request header assembly and response header parsing.
//!
//! [`assemble`] derives the header map that goes on the wire from the
//! descriptor. Each policy step consumes the map produced by the previous one
//! and returns a new map; the descriptor's own headers are never touched.
//!
//! Step order:
//! 1. multipart bodies drop the caller `Content-Type`
//! 2. Basic `Authorization` from descriptor credentials
//! 3. XSRF token copied from the cookie store
//! 4. bodiless requests drop `Content-Type`

use crate::config::DEFAULT_XSRF_HEADER_NAME;
use crate::context::ExecutionContext;
use crate::descriptor::{BasicAuth, RequestDescriptor};
use crate::error::DispatchError;
use base64::{Engine as _, engine::general_purpose};
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderName, HeaderValue};
use http::HeaderMap;

/// Headers whose duplicates are ignored when parsing a raw header block
const SINGLE_VALUE_HEADERS: &[&str] = &[
    "age",
    "authorization",
    "content-length",
    "content-type",
    "etag",
    "expires",
    "from",
    "host",
    "if-modified-since",
    "if-unmodified-since",
    "last-modified",
    "location",
    "max-forwards",
    "proxy-authorization",
    "referer",
    "retry-after",
    "user-agent",
];

/// Build the outgoing header map for `descriptor`
///
/// `full_path` is the URL after base/relative joining; it is the URL used
/// for the same-origin check.
///
/// # Errors
/// Returns `InvalidHeaderName` / `InvalidHeaderValue` if the XSRF header name
/// or cookie value cannot be represented as an HTTP header.
pub fn assemble(
    descriptor: &RequestDescriptor,
    context: &ExecutionContext,
    full_path: &str,
) -> Result<HeaderMap, DispatchError> {
    let headers = descriptor.headers.clone();
    let headers = strip_multipart_content_type(headers, descriptor);
    let headers = apply_basic_auth(headers, descriptor.auth.as_ref());
    let headers = apply_xsrf(headers, descriptor, context, full_path)?;
    Ok(strip_bodiless_content_type(headers, descriptor))
}

fn strip_multipart_content_type(mut headers: HeaderMap, descriptor: &RequestDescriptor) -> HeaderMap {
    if descriptor.data.is_form_data() {
        headers.remove(CONTENT_TYPE);
    }
    headers
}

fn apply_basic_auth(mut headers: HeaderMap, auth: Option<&BasicAuth>) -> HeaderMap {
    if let Some(auth) = auth {
        headers.insert(AUTHORIZATION, basic_auth_value(auth));
    }
    headers
}

/// `Basic base64(username:password)`, missing parts encoded as empty strings
#[must_use]
pub fn basic_auth_value(auth: &BasicAuth) -> HeaderValue {
    let credentials = format!(
        "{}:{}",
        auth.username.as_deref().unwrap_or_default(),
        auth.password.as_deref().unwrap_or_default()
    );
    let encoded = general_purpose::STANDARD.encode(credentials.as_bytes());
    let mut value = HeaderValue::try_from(format!("Basic {encoded}"))
        .unwrap_or_else(|_| HeaderValue::from_static("Basic"));
    value.set_sensitive(true);
    value
}

fn apply_xsrf(
    mut headers: HeaderMap,
    descriptor: &RequestDescriptor,
    context: &ExecutionContext,
    full_path: &str,
) -> Result<HeaderMap, DispatchError> {
    if !context.is_standard_browser() {
        return Ok(headers);
    }
    let Some(cookie_name) = descriptor.xsrf_cookie_name.as_deref() else {
        return Ok(headers);
    };
    let eligible =
        descriptor.with_credentials == Some(true) || context.is_same_origin(full_path);
    if !eligible {
        return Ok(headers);
    }

    let Some(token) = context.read_cookie(cookie_name).filter(|v| !v.is_empty()) else {
        return Ok(headers);
    };

    let header_name = descriptor
        .xsrf_header_name
        .as_deref()
        .unwrap_or(DEFAULT_XSRF_HEADER_NAME);
    let name = HeaderName::try_from(header_name)?;
    let mut value = HeaderValue::try_from(token)?;
    value.set_sensitive(true);
    headers.insert(name, value);
    tracing::trace!(header = header_name, "xsrf header injected");
    Ok(headers)
}

fn strip_bodiless_content_type(mut headers: HeaderMap, descriptor: &RequestDescriptor) -> HeaderMap {
    if descriptor.data.is_none() {
        headers.remove(CONTENT_TYPE);
    }
    headers
}

/// Parse a raw `name: value` header block
///
/// Lines may end with CRLF or LF. Lines without a colon or with an invalid
/// name/value are skipped. Duplicates are appended, except for headers that
/// only carry a single value, where the first occurrence is kept.
#[must_use]
pub fn parse_headers(raw: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for line in raw.lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            continue;
        }
        let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.trim()),
        ) else {
            continue;
        };
        if headers.contains_key(&name) && SINGLE_VALUE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        headers.append(name, value);
    }
    headers
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::body::{FormData, RequestBody};
    use crate::context::CookieJar;
    use std::sync::Arc;
    use url::Url;

    fn browser(cookies: &str) -> ExecutionContext {
        ExecutionContext::browser(
            Url::parse("https://app.example.com").unwrap(),
            Arc::new(CookieJar::parse(cookies)),
        )
    }

    fn descriptor() -> RequestDescriptor {
        RequestDescriptor::new("post", "/x")
    }

    #[test]
    fn test_multipart_drops_caller_content_type() {
        let d = descriptor()
            .header("Content-Type", "multipart/form-data")
            .unwrap()
            .data(FormData::new().text("a", "b").into());

        let headers = assemble(&d, &ExecutionContext::headless(), "https://a/x").unwrap();
        assert!(!headers.contains_key(CONTENT_TYPE));
        // Caller map untouched
        assert!(d.headers.contains_key(CONTENT_TYPE));
    }

    #[test]
    fn test_json_body_keeps_content_type() {
        let d = descriptor()
            .header("content-type", "application/vnd.api+json")
            .unwrap()
            .data(RequestBody::json(serde_json::json!({})));

        let headers = assemble(&d, &ExecutionContext::headless(), "https://a/x").unwrap();
        assert_eq!(headers[CONTENT_TYPE], "application/vnd.api+json");
    }

    #[test]
    fn test_bodiless_drops_content_type_any_case() {
        let d = descriptor()
            .header("CoNtEnT-TyPe", "application/json")
            .unwrap();

        let headers = assemble(&d, &ExecutionContext::headless(), "https://a/x").unwrap();
        assert!(headers.get("content-type").is_none());
    }

    #[test]
    fn test_basic_auth_overwrites_existing() {
        let d = descriptor()
            .header("authorization", "Bearer old")
            .unwrap()
            .auth(BasicAuth::new("u", "p"));

        let headers = assemble(&d, &ExecutionContext::headless(), "https://a/x").unwrap();
        assert_eq!(headers.get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(headers[AUTHORIZATION], "Basic dTpw");
    }

    #[test]
    fn test_basic_auth_missing_fields_default_to_empty() {
        let only_user = BasicAuth {
            username: Some("u".to_owned()),
            password: None,
        };
        assert_eq!(basic_auth_value(&only_user), "Basic dTo=");
        assert_eq!(basic_auth_value(&BasicAuth::default()), "Basic Og==");
    }

    #[test]
    fn test_basic_auth_value_is_sensitive() {
        assert!(basic_auth_value(&BasicAuth::new("u", "p")).is_sensitive());
    }

    #[test]
    fn test_xsrf_same_origin() {
        let d = descriptor();
        let headers = assemble(&d, &browser("XSRF-TOKEN=tok"), "https://app.example.com/x").unwrap();
        assert_eq!(headers["x-xsrf-token"], "tok");
    }

    #[test]
    fn test_xsrf_cross_origin_requires_credentials() {
        let ctx = browser("XSRF-TOKEN=tok");

        let headers = assemble(&descriptor(), &ctx, "https://other.example.com/x").unwrap();
        assert!(!headers.contains_key("x-xsrf-token"));

        let d = descriptor().with_credentials(true);
        let headers = assemble(&d, &ctx, "https://other.example.com/x").unwrap();
        assert_eq!(headers["x-xsrf-token"], "tok");
    }

    #[test]
    fn test_xsrf_requires_cookie_name() {
        let d = descriptor().xsrf_cookie_name(None);
        let headers = assemble(&d, &browser("XSRF-TOKEN=tok"), "https://app.example.com/x").unwrap();
        assert!(!headers.contains_key("x-xsrf-token"));
    }

    #[test]
    fn test_xsrf_absent_or_empty_cookie_sets_nothing() {
        let d = descriptor();
        let headers = assemble(&d, &browser("other=1"), "https://app.example.com/x").unwrap();
        assert!(!headers.contains_key("x-xsrf-token"));

        let headers = assemble(&d, &browser("XSRF-TOKEN="), "https://app.example.com/x").unwrap();
        assert!(!headers.contains_key("x-xsrf-token"));
    }

    #[test]
    fn test_xsrf_custom_names_and_default_header() {
        let d = descriptor()
            .xsrf_cookie_name(Some("csrftoken"))
            .xsrf_header_name(Some("X-CSRFToken"));
        let headers = assemble(&d, &browser("csrftoken=abc"), "https://app.example.com/x").unwrap();
        assert_eq!(headers["x-csrftoken"], "abc");

        let d = descriptor().xsrf_header_name(None);
        let headers = assemble(&d, &browser("XSRF-TOKEN=abc"), "https://app.example.com/x").unwrap();
        assert_eq!(headers["x-xsrf-token"], "abc");
    }

    #[test]
    fn test_xsrf_skipped_without_browser_capabilities() {
        let ctx = ExecutionContext::headless().with_cookies(Arc::new(CookieJar::parse("XSRF-TOKEN=tok")));
        let d = descriptor().with_credentials(true);
        let headers = assemble(&d, &ctx, "https://app.example.com/x").unwrap();
        assert!(!headers.contains_key("x-xsrf-token"));
    }

    #[test]
    fn test_xsrf_invalid_header_name_is_error() {
        let d = descriptor().xsrf_header_name(Some("bad header"));
        let result = assemble(&d, &browser("XSRF-TOKEN=tok"), "https://app.example.com/x");
        assert!(matches!(result, Err(DispatchError::InvalidHeaderName(_))));
    }

    #[test]
    fn test_parse_headers() {
        let raw = "Content-Type: text/plain\r\nSet-Cookie: a=1\r\nset-cookie: b=2\r\ncontent-type: text/html\r\ngarbage\r\nX-Empty:\r\n";
        let headers = parse_headers(raw);

        assert_eq!(headers["content-type"], "text/plain");
        let cookies: Vec<_> = headers.get_all("set-cookie").iter().collect();
        assert_eq!(cookies, ["a=1", "b=2"]);
        assert_eq!(headers["x-empty"], "");
        assert_eq!(headers.len(), 4);
    }

    #[test]
    fn test_parse_headers_value_with_colon() {
        let headers = parse_headers("Location: https://a.example/x\n");
        assert_eq!(headers["location"], "https://a.example/x");
    }
}
