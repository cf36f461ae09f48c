//! URL helpers for source base URLs and host matching.

use url::Url;

use crate::{Error, Result};

/// Extracts the lowercase host from an absolute http(s) URL.
///
/// Returns `None` when the URL is not absolute http(s) or has no host.
pub fn extract_host(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.host_str().map(|h| h.to_ascii_lowercase())
}

/// Whether `host` equals `pattern` or is a subdomain of it.
pub fn host_matches(host: &str, pattern: &str) -> bool {
    let pattern = pattern.trim().trim_start_matches("*.").to_ascii_lowercase();
    if pattern.is_empty() {
        return false;
    }
    host == pattern || host.ends_with(&format!(".{pattern}"))
}

/// Canonical form of an absolute http(s) base URL: scheme + host (+ port)
/// + path without a trailing slash; query and fragment are dropped.
pub fn canonical_base_url(raw: &str) -> Result<String> {
    let mut parsed = Url::parse(raw.trim())
        .map_err(|e| Error::validation(format!("invalid source URL '{raw}': {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::validation(format!(
            "unsupported scheme '{}' in source URL",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(Error::validation(format!("source URL '{raw}' has no host")));
    }
    parsed.set_query(None);
    parsed.set_fragment(None);
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

/// Candidate base URLs for user input, in the order they should be probed.
///
/// Input with an explicit scheme yields exactly that URL. A bare host (with
/// optional port/path) yields the HTTPS form followed by the HTTP form.
pub fn base_url_candidates(raw: &str) -> Result<Vec<String>> {
    let input = raw.trim();
    if input.is_empty() {
        return Err(Error::validation("source address must not be empty"));
    }

    let lower = input.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(vec![canonical_base_url(input)?]);
    }
    if input.contains("://") {
        return Err(Error::validation(format!(
            "unsupported scheme in source address '{input}'"
        )));
    }

    let bare = input.trim_start_matches('/');
    Ok(vec![
        canonical_base_url(&format!("https://{bare}"))?,
        canonical_base_url(&format!("http://{bare}"))?,
    ])
}

/// Join an API path onto a canonical base URL.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
