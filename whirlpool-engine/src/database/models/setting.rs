//! Settings database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SettingDbModel {
    pub key: String,
    pub value: String,
    pub updated_at: i64,
}
