//! Source server database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A configured remote catalog server.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SourceServerDbModel {
    pub base_url: String,
    pub title: String,
    pub icon_url: Option<String>,
    pub color: Option<String>,
    /// 1 for the single active source, 0 otherwise.
    pub is_active: i64,
    pub created_at: i64,
}
