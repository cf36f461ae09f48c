//! Engine configuration.
//!
//! Built in code with [`EngineConfig::new`], loaded from `WHIRLPOOL_*`
//! environment variables (a `.env` file is honored) or from a TOML file.
//! Every field has a default except the database path.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheTtls;
use crate::updater::DEFAULT_RELEASES_API;
use crate::{Error, Result};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; whirlpool-engine/0.1)";

const ENV_PREFIX: &str = "WHIRLPOOL_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub db_path: PathBuf,
    pub yt_dlp_path: String,
    pub python_executable: String,
    /// Impersonation bridge script. No bridge is used when unset.
    pub bridge_script_path: Option<PathBuf>,
    /// Hosts whose pages are fetched through the bridge during resolution.
    pub bridge_hosts: Vec<String>,
    pub release_api_url: String,
    /// Defaults to `downloads/` next to the database file.
    pub download_dir: Option<PathBuf>,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub extractor_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub max_concurrent_extractions: usize,
    pub status_cache_ttl_secs: u64,
    pub listing_cache_ttl_secs: u64,
    pub resolution_cache_ttl_secs: u64,
    pub max_watch_history: u32,
    pub max_search_history: u32,
    pub check_updates_on_boot: bool,
    pub boot_check_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("whirlpool.db"),
            yt_dlp_path: "yt-dlp".to_string(),
            python_executable: if cfg!(windows) { "python" } else { "python3" }.to_string(),
            bridge_script_path: None,
            bridge_hosts: Vec::new(),
            release_api_url: DEFAULT_RELEASES_API.to_string(),
            download_dir: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_secs: 20,
            extractor_timeout_secs: 90,
            download_timeout_secs: 60 * 60,
            max_concurrent_extractions: 2,
            status_cache_ttl_secs: 10 * 60,
            listing_cache_ttl_secs: 2 * 60,
            resolution_cache_ttl_secs: 6 * 60 * 60,
            max_watch_history: 500,
            max_search_history: 100,
            check_updates_on_boot: true,
            boot_check_timeout_secs: 15,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, raw: Option<String>) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|e| Error::config(format!("{name}={value}: {e}"))),
    }
}

fn parse_bool(name: &str, raw: Option<String>) -> Result<Option<bool>> {
    match raw.as_deref().map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        None | Some("") => Ok(None),
        Some("1" | "true" | "yes" | "on") => Ok(Some(true)),
        Some("0" | "false" | "no" | "off") => Ok(Some(false)),
        Some(other) => Err(Error::config(format!("{name}={other}: expected a boolean"))),
    }
}

impl EngineConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    /// Load from the process environment after reading `.env` if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from `WHIRLPOOL_*` variables provided by `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));
        let mut config = Self::default();

        macro_rules! set {
            ($field:ident, $suffix:literal) => {
                if let Some(v) = parse_var(concat!("WHIRLPOOL_", $suffix), var($suffix))? {
                    config.$field = v;
                }
            };
        }

        set!(db_path, "DB_PATH");
        set!(yt_dlp_path, "YT_DLP_PATH");
        set!(python_executable, "PYTHON_EXECUTABLE");
        set!(release_api_url, "RELEASE_API_URL");
        set!(user_agent, "USER_AGENT");
        set!(http_timeout_secs, "HTTP_TIMEOUT_SECS");
        set!(extractor_timeout_secs, "EXTRACTOR_TIMEOUT_SECS");
        set!(download_timeout_secs, "DOWNLOAD_TIMEOUT_SECS");
        set!(max_concurrent_extractions, "MAX_CONCURRENT_EXTRACTIONS");
        set!(status_cache_ttl_secs, "STATUS_CACHE_TTL_SECS");
        set!(listing_cache_ttl_secs, "LISTING_CACHE_TTL_SECS");
        set!(resolution_cache_ttl_secs, "RESOLUTION_CACHE_TTL_SECS");
        set!(max_watch_history, "MAX_WATCH_HISTORY");
        set!(max_search_history, "MAX_SEARCH_HISTORY");
        set!(boot_check_timeout_secs, "BOOT_CHECK_TIMEOUT_SECS");

        if let Some(path) = parse_var("WHIRLPOOL_BRIDGE_SCRIPT", var("BRIDGE_SCRIPT"))? {
            config.bridge_script_path = Some(path);
        }
        if let Some(path) = parse_var("WHIRLPOOL_DOWNLOAD_DIR", var("DOWNLOAD_DIR"))? {
            config.download_dir = Some(path);
        }
        if let Some(hosts) = var("BRIDGE_HOSTS") {
            config.bridge_hosts = hosts
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(check) = parse_bool("WHIRLPOOL_CHECK_UPDATES_ON_BOOT", var("CHECK_UPDATES_ON_BOOT"))? {
            config.check_updates_on_boot = check;
        }

        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::io_path("reading config file", path, e))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::config(format!("invalid config file: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(Error::config("db_path cannot be empty"));
        }
        if self.yt_dlp_path.trim().is_empty() {
            return Err(Error::config("yt_dlp_path cannot be empty"));
        }
        if self.python_executable.trim().is_empty() {
            return Err(Error::config("python_executable cannot be empty"));
        }
        if self
            .bridge_script_path
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            return Err(Error::config("bridge_script_path cannot be empty when set"));
        }
        let release_api = url::Url::parse(&self.release_api_url)
            .map_err(|e| Error::config(format!("release_api_url is invalid: {e}")))?;
        if !matches!(release_api.scheme(), "http" | "https") {
            return Err(Error::config("release_api_url must be http(s)"));
        }
        for (name, value) in [
            ("http_timeout_secs", self.http_timeout_secs),
            ("extractor_timeout_secs", self.extractor_timeout_secs),
            ("download_timeout_secs", self.download_timeout_secs),
            ("boot_check_timeout_secs", self.boot_check_timeout_secs),
        ] {
            if value == 0 {
                return Err(Error::config(format!("{name} must be greater than zero")));
            }
        }
        if self.max_concurrent_extractions == 0 {
            return Err(Error::config("max_concurrent_extractions must be at least 1"));
        }
        Ok(())
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir.clone().unwrap_or_else(|| {
            self.db_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."))
                .join("downloads")
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn extractor_timeout(&self) -> Duration {
        Duration::from_secs(self.extractor_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn boot_check_timeout(&self) -> Duration {
        Duration::from_secs(self.boot_check_timeout_secs)
    }

    pub fn cache_ttls(&self) -> CacheTtls {
        CacheTtls {
            status: Duration::from_secs(self.status_cache_ttl_secs),
            listing: Duration::from_secs(self.listing_cache_ttl_secs),
            resolution: Duration::from_secs(self.resolution_cache_ttl_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::new("/data/whirlpool.db");
        config.validate().unwrap();
        assert_eq!(config.download_dir(), PathBuf::from("/data/downloads"));
        assert_eq!(config.cache_ttls().resolution, Duration::from_secs(6 * 60 * 60));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("WHIRLPOOL_DB_PATH", "/tmp/w.db"),
            ("WHIRLPOOL_BRIDGE_HOSTS", "a.example, b.example,,"),
            ("WHIRLPOOL_LISTING_CACHE_TTL_SECS", "0"),
            ("WHIRLPOOL_CHECK_UPDATES_ON_BOOT", "off"),
        ]);
        let config =
            EngineConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/w.db"));
        assert_eq!(config.bridge_hosts, vec!["a.example", "b.example"]);
        assert_eq!(config.listing_cache_ttl_secs, 0);
        assert!(!config.check_updates_on_boot);
        assert_eq!(config.yt_dlp_path, "yt-dlp");
    }

    #[test]
    fn test_from_lookup_rejects_bad_numbers() {
        let err = EngineConfig::from_lookup(|k| {
            (k == "WHIRLPOOL_HTTP_TIMEOUT_SECS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            db_path = "/var/lib/whirlpool/db.sqlite"
            yt_dlp_path = "/usr/local/bin/yt-dlp"
            bridge_hosts = ["example.org"]
            max_concurrent_extractions = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.max_concurrent_extractions, 4);
        assert_eq!(config.bridge_hosts, vec!["example.org"]);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);

        assert!(EngineConfig::from_toml_str("http_timeout_secs = \"x\"").is_err());
    }

    #[test]
    fn test_validate_rejects_zero_and_empty() {
        let mut config = EngineConfig::new("w.db");
        config.http_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::new("w.db");
        config.yt_dlp_path = "  ".into();
        assert!(config.validate().is_err());

        let mut config = EngineConfig::new("w.db");
        config.release_api_url = "ftp://example.org".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_db_download_dir() {
        assert_eq!(
            EngineConfig::new("w.db").download_dir(),
            PathBuf::from("./downloads")
        );
    }
}
