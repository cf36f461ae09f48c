//! Filter selection normalization.
//!
//! A channel declares its filter options at runtime; a caller holds a
//! selection (option id to chosen choice ids) that may have been stored
//! against an older declaration. [`normalize`] reconciles the two: the
//! declaration always wins and stale ids are dropped silently.
//!
//! Defaults when nothing valid survives:
//! - single-select options fall back to their first declared choice;
//! - multi-select options keep an empty set only when the caller had stored
//!   the option explicitly (the user cleared it), otherwise they fall back to
//!   the first declared choice.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::StatusFilterOption;

/// Stored selection: option id to chosen choice ids.
pub type FilterSelections = BTreeMap<String, Vec<String>>;

/// Settings key prefix under which per-channel selections are stored.
pub const FILTER_SETTING_PREFIX: &str = "filters:";

/// A validated selection for one declared option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedFilter {
    pub option_id: String,
    pub multi_select: bool,
    pub choice_ids: Vec<String>,
}

/// Declared options of a channel together with the normalized selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelFilters {
    pub channel_id: String,
    pub options: Vec<StatusFilterOption>,
    pub applied: Vec<AppliedFilter>,
}

/// Reconcile `stored` against the channel's declared `options`.
///
/// The result follows declaration order and contains one entry per declared
/// option that has at least one choice.
pub fn normalize(options: &[StatusFilterOption], stored: &FilterSelections) -> Vec<AppliedFilter> {
    let mut seen_options = HashSet::new();
    let mut applied = Vec::with_capacity(options.len());

    for option in options {
        if option.choices.is_empty() || !seen_options.insert(option.id.as_str()) {
            continue;
        }

        let first_declared = option.choices[0].id.clone();
        let requested = stored.get(&option.id);
        let is_requested = |choice_id: &str| {
            requested.is_some_and(|ids| ids.iter().any(|id| id == choice_id))
        };

        let choice_ids = if option.multi_select {
            // Declared order, deduplicated.
            let mut seen = HashSet::new();
            let retained: Vec<String> = option
                .choices
                .iter()
                .filter(|c| is_requested(&c.id) && seen.insert(c.id.as_str()))
                .map(|c| c.id.clone())
                .collect();
            if retained.is_empty() && requested.is_none() {
                vec![first_declared]
            } else {
                retained
            }
        } else {
            // First stored id that is still declared.
            let valid = requested.and_then(|ids| {
                ids.iter()
                    .find(|id| option.choices.iter().any(|c| &c.id == *id))
                    .cloned()
            });
            vec![valid.unwrap_or(first_declared)]
        };

        applied.push(AppliedFilter {
            option_id: option.id.clone(),
            multi_select: option.multi_select,
            choice_ids,
        });
    }

    applied
}

/// Convert a normalized selection back into the stored form.
pub fn to_selections(applied: &[AppliedFilter]) -> FilterSelections {
    applied
        .iter()
        .map(|f| (f.option_id.clone(), f.choice_ids.clone()))
        .collect()
}

/// Request body fields for a normalized selection: single-select options
/// become a string, multi-select options a list.
pub fn request_fields(applied: &[AppliedFilter]) -> serde_json::Map<String, serde_json::Value> {
    applied
        .iter()
        .filter_map(|f| {
            let value = if f.multi_select {
                serde_json::Value::from(f.choice_ids.clone())
            } else {
                serde_json::Value::from(f.choice_ids.first()?.clone())
            };
            Some((f.option_id.clone(), value))
        })
        .collect()
}

/// Settings key holding the selection for `channel_id` on `base_url`.
pub fn selection_key(base_url: &str, channel_id: &str) -> String {
    format!("{FILTER_SETTING_PREFIX}{base_url}:{channel_id}")
}
