//! Turning extractor output into a [`PlaybackResolution`].
//!
//! Two dialects are accepted on stdout:
//! - the normalized object (`streamUrl`, `requestHeaders`, ...) emitted by
//!   wrapper scripts;
//! - the raw `yt-dlp -J` info dict, from which the best format is picked.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::domain::{PlaybackResolution, clean_headers};
use crate::{Error, Result};

/// Context applied to every parsed resolution.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    pub page_url: &'a str,
    pub user_agent: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct NormalizedOutput {
    id: Option<String>,
    title: Option<String>,
    page_url: Option<String>,
    stream_url: Option<String>,
    request_headers: Map<String, Value>,
    thumbnail_url: Option<String>,
    author_name: Option<String>,
    extractor: Option<String>,
    format_id: Option<String>,
    ext: Option<String>,
    protocol: Option<String>,
    duration_seconds: Option<f64>,
    yt_dlp_version: Option<String>,
    diagnostics: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct YtDlpInfo {
    id: Option<Value>,
    title: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    format_id: Option<String>,
    ext: Option<String>,
    protocol: Option<String>,
    thumbnail: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    extractor: Option<String>,
    extractor_key: Option<String>,
    duration: Option<f64>,
    http_headers: Map<String, Value>,
    formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct YtDlpFormat {
    url: Option<String>,
    format_id: Option<String>,
    ext: Option<String>,
    protocol: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    http_headers: Map<String, Value>,
}

impl YtDlpFormat {
    fn stream_url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    /// Preference score: progressive MP4 over HTTP with both tracks ranks highest.
    fn score(&self) -> u32 {
        let has_codec = |codec: &Option<String>| {
            codec
                .as_deref()
                .is_some_and(|c| !c.is_empty() && c != "none")
        };
        let mut score = 0;
        if self.ext.as_deref() == Some("mp4") {
            score += 50;
        }
        if self
            .protocol
            .as_deref()
            .is_some_and(|p| p.starts_with("http"))
        {
            score += 20;
        }
        if has_codec(&self.vcodec) {
            score += 20;
        }
        if has_codec(&self.acodec) {
            score += 10;
        }
        score
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn string_headers(map: &Map<String, Value>) -> BTreeMap<String, String> {
    clean_headers(
        map.iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.as_str(), v))),
    )
}

fn with_default_headers(
    mut headers: BTreeMap<String, String>,
    ctx: &ParseContext<'_>,
    referer: &str,
) -> BTreeMap<String, String> {
    let has = |headers: &BTreeMap<String, String>, name: &str| {
        headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    };
    if !has(&headers, "User-Agent") && !ctx.user_agent.trim().is_empty() {
        headers.insert("User-Agent".to_string(), ctx.user_agent.trim().to_string());
    }
    if !has(&headers, "Referer") && !referer.trim().is_empty() {
        headers.insert("Referer".to_string(), referer.trim().to_string());
    }
    headers
}

/// Locate the JSON document in extractor stdout. Usually the whole output,
/// otherwise the last line that looks like an object.
fn json_document(stdout: &str) -> Option<Value> {
    let trimmed = stdout.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    trimmed
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| serde_json::from_str(line).ok())
}

fn missing_stream_url(diagnostics: Vec<String>) -> Error {
    Error::resolution_with("extractor output is missing stream URL", diagnostics)
}

/// Parse extractor stdout into a resolution.
pub fn parse_extractor_output(stdout: &str, ctx: ParseContext<'_>) -> Result<PlaybackResolution> {
    let Some(Value::Object(fields)) = json_document(stdout) else {
        return Err(Error::resolution("extractor produced no JSON object"));
    };

    if fields.contains_key("streamUrl") || fields.contains_key("requestHeaders") {
        parse_normalized(Value::Object(fields), ctx)
    } else {
        parse_info_dict(Value::Object(fields), ctx)
    }
}

fn parse_normalized(value: Value, ctx: ParseContext<'_>) -> Result<PlaybackResolution> {
    let out: NormalizedOutput = serde_json::from_value(value)
        .map_err(|e| Error::resolution(format!("malformed extractor output: {e}")))?;

    let Some(stream_url) = non_blank(out.stream_url) else {
        return Err(missing_stream_url(out.diagnostics));
    };
    let page_url = non_blank(out.page_url).unwrap_or_else(|| ctx.page_url.to_string());
    let headers = with_default_headers(string_headers(&out.request_headers), &ctx, &page_url);

    Ok(PlaybackResolution {
        id: non_blank(out.id).unwrap_or_else(|| page_url.clone()),
        title: non_blank(out.title).unwrap_or_else(|| "Untitled".to_string()),
        page_url,
        stream_url,
        request_headers: headers,
        thumbnail_url: non_blank(out.thumbnail_url),
        author_name: non_blank(out.author_name),
        extractor: non_blank(out.extractor),
        format_id: non_blank(out.format_id),
        ext: non_blank(out.ext),
        protocol: non_blank(out.protocol),
        duration_seconds: out.duration_seconds.filter(|d| d.is_finite() && *d >= 0.0),
        yt_dlp_version: non_blank(out.yt_dlp_version),
        diagnostics: out.diagnostics,
    })
}

fn parse_info_dict(value: Value, ctx: ParseContext<'_>) -> Result<PlaybackResolution> {
    let info: YtDlpInfo = serde_json::from_value(value)
        .map_err(|e| Error::resolution(format!("malformed extractor output: {e}")))?;

    let best = info
        .formats
        .iter()
        .filter(|f| f.stream_url().is_some())
        .fold(None::<&YtDlpFormat>, |best, f| match best {
            // Later formats are better in yt-dlp's ordering, so ties go to them.
            Some(b) if b.score() > f.score() => Some(b),
            _ => Some(f),
        });

    let direct = non_blank(info.url.clone());
    let (stream_url, format_id, ext, protocol, headers) = match (direct, best) {
        (Some(url), _) => (
            url,
            non_blank(info.format_id),
            non_blank(info.ext),
            non_blank(info.protocol),
            string_headers(&info.http_headers),
        ),
        (None, Some(format)) => {
            let mut headers = string_headers(&info.http_headers);
            headers.extend(string_headers(&format.http_headers));
            (
                format.stream_url().unwrap_or_default().to_string(),
                non_blank(format.format_id.clone()),
                non_blank(format.ext.clone()),
                non_blank(format.protocol.clone()),
                headers,
            )
        }
        (None, None) => return Err(missing_stream_url(Vec::new())),
    };

    let page_url = non_blank(info.webpage_url).unwrap_or_else(|| ctx.page_url.to_string());
    let id = match info.id {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => page_url.clone(),
    };

    Ok(PlaybackResolution {
        id,
        title: non_blank(info.title).unwrap_or_else(|| "Untitled".to_string()),
        request_headers: with_default_headers(headers, &ctx, &page_url),
        page_url,
        stream_url,
        thumbnail_url: non_blank(info.thumbnail),
        author_name: non_blank(info.uploader).or(non_blank(info.channel)),
        extractor: non_blank(info.extractor).or(non_blank(info.extractor_key)),
        format_id,
        ext,
        protocol,
        duration_seconds: info.duration.filter(|d| d.is_finite() && *d >= 0.0),
        yt_dlp_version: None,
        diagnostics: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CTX: ParseContext<'static> = ParseContext {
        page_url: "https://example.org/watch/1",
        user_agent: "whirlpool-test",
    };

    #[test]
    fn test_empty_stream_url_fails() {
        let err = parse_extractor_output(r#"{"streamUrl": ""}"#, CTX).unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
        assert!(err.to_string().contains("missing stream URL"));
    }

    #[test]
    fn test_normalized_output_preserves_headers() {
        let resolution = parse_extractor_output(
            r#"{"streamUrl": "https://x/y.m3u8", "requestHeaders": {"User-Agent": "UA", "X-Blank": " "}}"#,
            CTX,
        )
        .unwrap();
        assert_eq!(resolution.stream_url, "https://x/y.m3u8");
        assert_eq!(resolution.request_headers["User-Agent"], "UA");
        assert_eq!(
            resolution.request_headers["Referer"],
            "https://example.org/watch/1"
        );
        assert!(!resolution.request_headers.contains_key("X-Blank"));
        assert_eq!(resolution.page_url, CTX.page_url);
    }

    #[test]
    fn test_info_dict_prefers_progressive_mp4() {
        let stdout = r#"{
            "id": 77, "title": "Clip", "webpage_url": "https://example.org/watch/77",
            "formats": [
                {"format_id": "hls", "url": "https://cdn/x.m3u8", "ext": "mp4", "protocol": "m3u8_native", "vcodec": "avc1", "acodec": "mp4a"},
                {"format_id": "18", "url": "https://cdn/x.mp4", "ext": "mp4", "protocol": "https", "vcodec": "avc1", "acodec": "mp4a",
                 "http_headers": {"User-Agent": "yt"}},
                {"format_id": "audio", "url": "https://cdn/a.webm", "ext": "webm", "protocol": "https", "vcodec": "none", "acodec": "opus"},
                {"format_id": "broken", "url": ""}
            ]
        }"#;
        let resolution = parse_extractor_output(stdout, CTX).unwrap();
        assert_eq!(resolution.id, "77");
        assert_eq!(resolution.format_id.as_deref(), Some("18"));
        assert_eq!(resolution.stream_url, "https://cdn/x.mp4");
        assert_eq!(resolution.request_headers["User-Agent"], "yt");
        assert_eq!(
            resolution.request_headers["Referer"],
            "https://example.org/watch/77"
        );
    }

    #[test]
    fn test_info_dict_top_level_url() {
        let resolution = parse_extractor_output(
            r#"{"id": "a", "url": "https://cdn/direct.mp4", "ext": "mp4", "duration": 12.5}"#,
            CTX,
        )
        .unwrap();
        assert_eq!(resolution.stream_url, "https://cdn/direct.mp4");
        assert_eq!(resolution.duration_seconds, Some(12.5));
        assert_eq!(resolution.request_headers["User-Agent"], "whirlpool-test");
    }

    #[test]
    fn test_info_dict_without_formats_fails() {
        let err = parse_extractor_output(r#"{"id": "a", "formats": []}"#, CTX).unwrap_err();
        assert!(err.to_string().contains("missing stream URL"));
    }

    #[test]
    fn test_non_json_fails() {
        assert!(parse_extractor_output("ERROR: unsupported URL", CTX).is_err());
        assert!(parse_extractor_output("[1, 2]", CTX).is_err());
    }

    #[test]
    fn test_json_after_noise() {
        let resolution = parse_extractor_output(
            "[debug] something\n{\"streamUrl\": \"https://x/z.mp4\"}\n",
            CTX,
        )
        .unwrap();
        assert_eq!(resolution.stream_url, "https://x/z.mp4");
    }
}
