use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::models::SourceServerDbModel;
use crate::database::time::ms_to_datetime;

/// A configured remote catalog server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceServerConfig {
    pub base_url: String,
    pub title: String,
    pub icon_url: Option<String>,
    pub color: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<SourceServerDbModel> for SourceServerConfig {
    fn from(model: SourceServerDbModel) -> Self {
        Self {
            base_url: model.base_url,
            title: model.title,
            icon_url: model.icon_url,
            color: model.color,
            is_active: model.is_active == 1,
            created_at: ms_to_datetime(model.created_at),
        }
    }
}
