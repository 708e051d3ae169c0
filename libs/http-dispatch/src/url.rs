//! URL assembly helpers.
//!
//! `build_full_path` joins a base URL and a request URL; `build_url` appends
//! the serialized query parameters. Neither validates the result, the
//! transport does.

use crate::descriptor::ParamsSerializer;

/// `true` for `scheme://...` and protocol-relative `//host/...` URLs
#[must_use]
pub fn is_absolute_url(url: &str) -> bool {
    if url.starts_with("//") {
        return true;
    }
    let Some((scheme, rest)) = url.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    let valid_scheme = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid_scheme && rest.starts_with("//")
}

/// Join with exactly one `/` between the parts
#[must_use]
pub fn combine_urls(base_url: &str, relative_url: &str) -> String {
    if relative_url.is_empty() {
        return base_url.to_owned();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        relative_url.trim_start_matches('/')
    )
}

/// Resolve `requested_url` against `base_url` unless it is already absolute
#[must_use]
pub fn build_full_path(base_url: Option<&str>, requested_url: &str) -> String {
    match base_url {
        Some(base) if !base.is_empty() && !is_absolute_url(requested_url) => {
            combine_urls(base, requested_url)
        }
        _ => requested_url.to_owned(),
    }
}

/// Append serialized query parameters
///
/// Any `#fragment` is dropped. Parameters go after an existing query string
/// with `&`. A custom serializer replaces the default
/// `application/x-www-form-urlencoded` encoding.
#[must_use]
pub fn build_url(
    url: &str,
    params: &[(String, String)],
    serializer: Option<&ParamsSerializer>,
) -> String {
    let url = url.split_once('#').map_or(url, |(before, _)| before);

    let serialized = match serializer {
        Some(serialize) => serialize(params),
        None => encode_params(params),
    };

    if serialized.is_empty() {
        return url.to_owned();
    }

    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{serialized}")
}

fn encode_params(params: &[(String, String)]) -> String {
    // Serializing string pairs cannot fail.
    serde_urlencoded::to_string(params).unwrap_or_default()
}
