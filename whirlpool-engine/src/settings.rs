//! Typed access to the key/value settings table.
//!
//! Composite values (string lists, filter selections) are stored as JSON
//! text so they round-trip exactly.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::database::repositories::SettingRepository;
use crate::database::time::ms_to_datetime;
use crate::utils::json::{JsonContext, parse_logged, to_string};
use crate::{Error, Result};

/// Settings key prefix for a source's category labels.
pub const CATEGORIES_PREFIX: &str = "categories:";
/// Settings key prefix for a source's channel ids.
pub const CHANNELS_PREFIX: &str = "channels:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingEntry {
    pub key: String,
    pub value: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Encode an ordered string list for storage.
pub fn encode_string_list(values: &[String]) -> Result<String> {
    to_string(&values)
}

/// Decode a stored string list. `None` if the value is not a JSON array of
/// strings.
pub fn decode_string_list(raw: &str) -> Option<Vec<String>> {
    serde_json::from_str(raw).ok()
}

#[derive(Clone)]
pub struct SettingsStore {
    repo: Arc<dyn SettingRepository>,
}

impl SettingsStore {
    pub fn new(repo: Arc<dyn SettingRepository>) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> Arc<dyn SettingRepository> {
        self.repo.clone()
    }

    fn check_key(key: &str) -> Result<()> {
        if key.trim().is_empty() {
            return Err(Error::validation("setting key must not be empty"));
        }
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.repo.get_setting(key).await
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        Self::check_key(key)?;
        self.repo.set_setting(key, value).await
    }

    pub async fn remove(&self, key: &str) -> Result<bool> {
        self.repo.remove_setting(key).await
    }

    /// Settings whose key starts with `prefix`, ordered by key.
    pub async fn list(&self, prefix: &str) -> Result<Vec<SettingEntry>> {
        Ok(self
            .repo
            .list_settings(prefix)
            .await?
            .into_iter()
            .map(|m| SettingEntry {
                key: m.key,
                value: m.value,
                updated_at: ms_to_datetime(m.updated_at),
            })
            .collect())
    }

    /// Read a JSON value. Malformed values are logged and read as absent.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        Ok(self.repo.get_setting(key).await?.and_then(|raw| {
            parse_logged(
                &raw,
                JsonContext::Setting { key },
                "Ignoring malformed setting value",
            )
        }))
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, &to_string(value)?).await
    }

    pub async fn get_string_list(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.get_json(key).await?.unwrap_or_default())
    }

    pub async fn set_string_list(&self, key: &str, values: &[String]) -> Result<()> {
        self.set(key, &encode_string_list(values)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::database::repositories::SqlxSettingRepository;
    use std::collections::BTreeMap;

    async fn store(dir: &std::path::Path) -> (Database, SettingsStore) {
        let db = Database::open(dir.join("db.sqlite")).await.unwrap();
        let repo = SqlxSettingRepository::new(db.pool().clone(), db.write_pool().clone());
        (db, SettingsStore::new(Arc::new(repo)))
    }

    #[test]
    fn test_string_list_encoding_is_reversible() {
        let values = vec!["a,b".to_string(), "\"quoted\"".to_string(), String::new()];
        let encoded = encode_string_list(&values).unwrap();
        assert_eq!(decode_string_list(&encoded), Some(values));
        assert_eq!(decode_string_list("not a list"), None);
    }

    #[tokio::test]
    async fn test_json_and_prefix_listing() {
        let dir = tempfile::tempdir().unwrap();
        let (_db, store) = store(dir.path()).await;

        let selection: BTreeMap<String, Vec<String>> =
            BTreeMap::from([("sort".to_string(), vec!["top".to_string()])]);
        store.set_json("filters:x:news", &selection).await.unwrap();
        store
            .set_string_list("channels:x", &["news".to_string()])
            .await
            .unwrap();
        store.set("filters:x:sports", "{broken").await.unwrap();

        let loaded: Option<BTreeMap<String, Vec<String>>> =
            store.get_json("filters:x:news").await.unwrap();
        assert_eq!(loaded, Some(selection));
        let broken: Option<BTreeMap<String, Vec<String>>> =
            store.get_json("filters:x:sports").await.unwrap();
        assert!(broken.is_none());

        let keys: Vec<String> = store
            .list("filters:")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["filters:x:news", "filters:x:sports"]);
        assert_eq!(store.get_string_list("channels:x").await.unwrap(), vec!["news"]);
        assert!(store.set(" ", "v").await.is_err());
        assert!(store.remove("channels:x").await.unwrap());
    }
}
