//! JSON helpers for values stored as text columns, with consistent warning logs.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

/// Where a stored JSON value came from, for log context.
#[derive(Debug, Clone, Copy)]
pub enum JsonContext<'a> {
    Setting { key: &'a str },
    CacheEntry { fingerprint: &'a str, kind: &'a str },
}

fn warn_parse_error(raw_len: usize, error: serde_json::Error, ctx: JsonContext<'_>, msg: &str) {
    match ctx {
        JsonContext::Setting { key } => {
            warn!(key = %key, raw_len, error = %error, "{msg}");
        }
        JsonContext::CacheEntry { fingerprint, kind } => {
            warn!(fingerprint = %fingerprint, kind, raw_len, error = %error, "{msg}");
        }
    }
}

/// Parse a stored value, logging and returning `None` on malformed input.
pub fn parse_logged<T: DeserializeOwned>(
    raw: &str,
    ctx: JsonContext<'_>,
    msg: &'static str,
) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(error) => {
            warn_parse_error(raw.len(), error, ctx, msg);
            None
        }
    }
}

/// Parse a stored value, falling back to `T::default()` on malformed input.
pub fn parse_or_default<T: DeserializeOwned + Default>(
    raw: &str,
    ctx: JsonContext<'_>,
    msg: &'static str,
) -> T {
    parse_logged(raw, ctx, msg).unwrap_or_default()
}

/// Serialize a value that is about to be stored.
pub fn to_string<T: Serialize>(value: &T) -> crate::Result<String> {
    Ok(serde_json::to_string(value)?)
}
