//! Response shapes of the discovery protocol and their mapping into domain
//! types. Servers in the wild disagree on field names, so several spellings
//! are accepted for the same concept.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::{StatusChannel, StatusChoice, StatusFilterOption, StatusSummary, VideoItem};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct StatusResponse {
    name: Option<String>,
    api_version: Option<String>,
    icon_url: Option<String>,
    primary_color: Option<String>,
    secondary_color: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    sources: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    categories: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    channels: Vec<ChannelEntry>,
    #[serde(deserialize_with = "null_as_default")]
    channel_details: Vec<WireChannel>,
    adblock_required: Option<bool>,
    source_releases_url: Option<String>,
}

/// `channels` holds plain ids in older servers and full objects in newer ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChannelEntry {
    Id(String),
    Detailed(WireChannel),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChannel {
    id: String,
    name: Option<String>,
    title: Option<String>,
    description: Option<String>,
    favicon: Option<String>,
    favicon_url: Option<String>,
    ytdlp_command: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    options: Vec<WireOption>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOption {
    id: String,
    title: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    multi_select: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    options: Vec<WireChoice>,
    #[serde(default, deserialize_with = "null_as_default")]
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    id: String,
    title: Option<String>,
    label: Option<String>,
}

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl From<WireChannel> for StatusChannel {
    fn from(wire: WireChannel) -> Self {
        let title = non_blank(wire.name)
            .or(non_blank(wire.title))
            .unwrap_or_else(|| wire.id.clone());
        Self {
            id: wire.id,
            title,
            description: non_blank(wire.description),
            favicon_url: non_blank(wire.favicon_url).or(non_blank(wire.favicon)),
            ytdlp_command: non_blank(wire.ytdlp_command),
            options: wire.options.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<WireOption> for StatusFilterOption {
    fn from(wire: WireOption) -> Self {
        let choices = if wire.options.is_empty() {
            wire.choices
        } else {
            wire.options
        };
        Self {
            title: non_blank(wire.title).unwrap_or_else(|| wire.id.clone()),
            id: wire.id,
            multi_select: wire.multi_select,
            choices: choices
                .into_iter()
                .map(|c| StatusChoice {
                    label: non_blank(c.title)
                        .or(non_blank(c.label))
                        .unwrap_or_else(|| c.id.clone()),
                    id: c.id,
                })
                .collect(),
        }
    }
}

impl From<StatusResponse> for StatusSummary {
    fn from(wire: StatusResponse) -> Self {
        let mut ids: Vec<String> = Vec::new();
        let mut details: Vec<StatusChannel> = Vec::new();

        let mut push_detail = |channel: StatusChannel, ids: &mut Vec<String>| {
            if !ids.contains(&channel.id) {
                ids.push(channel.id.clone());
            }
            match details.iter_mut().find(|d| d.id == channel.id) {
                Some(existing) => *existing = channel,
                None => details.push(channel),
            }
        };

        for entry in wire.channels {
            match entry {
                ChannelEntry::Id(id) => {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                ChannelEntry::Detailed(channel) => push_detail(channel.into(), &mut ids),
            }
        }
        // Explicit details win over objects embedded in `channels`.
        for channel in wire.channel_details {
            push_detail(channel.into(), &mut ids);
        }

        let channel_details = ids
            .iter()
            .map(|id| {
                details
                    .iter()
                    .find(|d| &d.id == id)
                    .cloned()
                    .unwrap_or_else(|| StatusChannel::bare(id.clone()))
            })
            .collect();

        let sources = if wire.sources.is_empty() {
            wire.categories
        } else {
            wire.sources
        };

        Self {
            name: non_blank(wire.name).unwrap_or_else(|| "unknown".to_string()),
            api_version: non_blank(wire.api_version),
            icon_url: non_blank(wire.icon_url),
            primary_color: non_blank(wire.primary_color),
            secondary_color: non_blank(wire.secondary_color),
            sources,
            channels: ids,
            channel_details,
            adblock_required: wire.adblock_required.unwrap_or(false),
            source_releases_url: non_blank(wire.source_releases_url),
        }
    }
}

/// Outcome of reading a listing body.
#[derive(Debug)]
pub(crate) enum ListingBody {
    Items(Vec<VideoItem>),
    Malformed(String),
}

/// Extract listing items from a response body.
///
/// Accepts `{"items": [...]}`, `{"videos": [...]}` or a bare array. An object
/// carrying neither field is an empty listing.
pub(crate) fn parse_listing(body: &str) -> ListingBody {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => return ListingBody::Malformed(format!("invalid JSON: {e}")),
    };

    let records = match value {
        Value::Array(records) => records,
        Value::Object(mut envelope) => {
            let field = |envelope: &mut Map<String, Value>, name: &str| match envelope.remove(name)
            {
                Some(Value::Array(records)) => Ok(Some(records)),
                Some(Value::Null) | None => Ok(None),
                Some(other) => Err(format!("field '{name}' is not a list: {other}")),
            };
            let items = match field(&mut envelope, "items") {
                Ok(items) => items,
                Err(e) => return ListingBody::Malformed(e),
            };
            match items {
                Some(records) => records,
                None => match field(&mut envelope, "videos") {
                    Ok(videos) => videos.unwrap_or_default(),
                    Err(e) => return ListingBody::Malformed(e),
                },
            }
        }
        other => {
            return ListingBody::Malformed(format!("unexpected listing payload: {other}"));
        }
    };

    ListingBody::Items(records.into_iter().filter_map(map_video_record).collect())
}

fn text_field(record: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match record.get(*name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn number_field(record: &Map<String, Value>, names: &[&str]) -> Option<f64> {
    names.iter().find_map(|name| match record.get(*name)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn map_video_record(record: Value) -> Option<VideoItem> {
    let Value::Object(fields) = &record else {
        debug!(record = %record, "Skipping non-object listing record");
        return None;
    };

    let page_url = text_field(fields, &["url", "pageUrl", "page_url", "webpage_url"])
        .unwrap_or_default();
    let id = text_field(fields, &["id", "hashedUrl"]).unwrap_or_else(|| page_url.clone());
    if id.is_empty() {
        debug!("Skipping listing record without id or url");
        return None;
    }

    Some(VideoItem {
        title: text_field(fields, &["title"]).unwrap_or_else(|| "Untitled".to_string()),
        duration_seconds: number_field(fields, &["duration", "durationSeconds"])
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(|d| d.round() as u32),
        thumbnail_url: text_field(fields, &["image", "thumb", "thumbnail", "thumbnailUrl"]),
        network: text_field(fields, &["network", "channel"]),
        author_name: text_field(fields, &["authorName", "author_name", "uploader", "author"]),
        extractor: text_field(fields, &["extractor"]),
        view_count: number_field(fields, &["viewCount", "view_count", "views"])
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v as u64),
        id,
        page_url,
        raw: Some(record),
    })
}
