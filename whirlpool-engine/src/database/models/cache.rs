//! Cache entry database model.

use sqlx::FromRow;

/// Serialized discovery or resolution result keyed by request fingerprint.
#[derive(Debug, Clone, FromRow)]
pub struct CacheEntryDbModel {
    pub fingerprint: String,
    /// `status`, `listing` or `resolution`.
    pub kind: String,
    pub payload: String,
    pub created_at: i64,
}
