//! The engine façade.
//!
//! One long-lived [`Engine`] owns every component and is safe to call from
//! many tasks at once. Construction opens the store, wires the components
//! and starts two background tasks: the cache sweeper and the boot-time
//! update check.

mod browse;
mod library;
mod playback;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::bridge::ImpersonationBridge;
use crate::cache::ResponseCache;
use crate::config::EngineConfig;
use crate::database::repositories::{
    FavoriteRepository, HistoryRepository, SqlxCacheRepository, SqlxDownloadRepository,
    SqlxFavoriteRepository, SqlxHistoryRepository, SqlxSettingRepository, SqlxSourceRepository,
};
use crate::database::{Database, MaintenanceService, TransferManager};
use crate::discovery::{CatalogClient, DiscoveryClient};
use crate::resolver::{Downloader, MediaFetcher, ResolutionPipeline, StreamExtractor, YtDlpExtractor};
use crate::settings::SettingsStore;
use crate::sources::SourceRegistry;
use crate::updater::{ExtractorMaintenance, UpdateChecker};
use crate::utils::http_client::build_client;
use crate::Result;

pub use playback::PlaybackRequest;

const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Snapshot of the engine's health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineHealth {
    pub engine_ready: bool,
    pub db_accessible: bool,
    pub extractor_version: Option<String>,
    pub active_source: Option<String>,
    /// Error recorded by the last boot-time update check.
    pub last_error: Option<String>,
}

pub struct Engine {
    config: EngineConfig,
    db: Database,
    registry: SourceRegistry,
    catalog: Arc<dyn CatalogClient>,
    settings: SettingsStore,
    cache: ResponseCache,
    favorites: Arc<dyn FavoriteRepository>,
    history: Arc<dyn HistoryRepository>,
    pipeline: ResolutionPipeline,
    downloader: Downloader,
    maintenance: MaintenanceService,
    transfer: TransferManager,
    updater: Arc<UpdateChecker>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

const _: fn() = || {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Engine>();
};

/// Builds an [`Engine`], optionally replacing the network and subprocess
/// components with other implementations.
pub struct EngineBuilder {
    config: EngineConfig,
    catalog: Option<Arc<dyn CatalogClient>>,
    extractor: Option<Arc<dyn StreamExtractor>>,
    fetcher: Option<Arc<dyn MediaFetcher>>,
    extractor_maintenance: Option<Arc<dyn ExtractorMaintenance>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            catalog: None,
            extractor: None,
            fetcher: None,
            extractor_maintenance: None,
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogClient>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn StreamExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn MediaFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_extractor_maintenance(mut self, tool: Arc<dyn ExtractorMaintenance>) -> Self {
        self.extractor_maintenance = Some(tool);
        self
    }

    pub async fn build(self) -> Result<Arc<Engine>> {
        let config = self.config;
        config.validate()?;

        let http = build_client(&config.user_agent, config.http_timeout())?;
        let db = Database::open(&config.db_path).await?;
        let (pool, write_pool) = (db.pool().clone(), db.write_pool().clone());

        let bridge = config.bridge_script_path.as_ref().map(|script| {
            Arc::new(ImpersonationBridge::new(
                config.python_executable.clone(),
                script.clone(),
                config.bridge_hosts.clone(),
                config.extractor_timeout(),
            ))
        });

        let yt_dlp = Arc::new(
            YtDlpExtractor::new(
                config.yt_dlp_path.clone(),
                config.python_executable.clone(),
                config.user_agent.clone(),
                config.extractor_timeout(),
            )
            .with_download_timeout(config.download_timeout()),
        );
        let catalog = self
            .catalog
            .unwrap_or_else(|| Arc::new(DiscoveryClient::new(http.clone(), bridge.clone())) as _);
        let extractor = self
            .extractor
            .unwrap_or_else(|| yt_dlp.clone() as Arc<dyn StreamExtractor>);
        let fetcher = self
            .fetcher
            .unwrap_or_else(|| yt_dlp.clone() as Arc<dyn MediaFetcher>);
        let tool = self
            .extractor_maintenance
            .unwrap_or_else(|| yt_dlp as Arc<dyn ExtractorMaintenance>);

        let settings = SettingsStore::new(Arc::new(SqlxSettingRepository::new(
            pool.clone(),
            write_pool.clone(),
        )));
        let sources = Arc::new(SqlxSourceRepository::new(pool.clone(), write_pool.clone()));
        let downloads = Arc::new(SqlxDownloadRepository::new(pool.clone(), write_pool.clone()));

        let engine = Arc::new(Engine {
            registry: SourceRegistry::new(sources, catalog.clone()),
            catalog,
            cache: ResponseCache::new(
                Arc::new(SqlxCacheRepository::new(pool.clone(), write_pool.clone())),
                config.cache_ttls(),
            ),
            favorites: Arc::new(SqlxFavoriteRepository::new(pool.clone(), write_pool.clone())),
            history: Arc::new(SqlxHistoryRepository::new(pool, write_pool.clone())),
            pipeline: ResolutionPipeline::new(
                extractor,
                bridge,
                config.user_agent.clone(),
                config.max_concurrent_extractions,
            ),
            downloader: Downloader::new(fetcher, downloads, config.download_dir()),
            maintenance: MaintenanceService::new(write_pool),
            transfer: TransferManager::new(db.clone()),
            updater: Arc::new(UpdateChecker::new(
                http,
                config.release_api_url.clone(),
                tool,
                settings.repository(),
            )),
            settings,
            db,
            config,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        });

        engine.downloader.sweep_staging().await;
        engine.start_background_tasks();
        info!(db = %engine.db.path().display(), "Engine ready");
        Ok(engine)
    }
}

impl Engine {
    /// Build an engine with the default network and subprocess components.
    pub async fn new(config: EngineConfig) -> Result<Arc<Self>> {
        EngineBuilder::new(config).build().await
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn download_dir(&self) -> PathBuf {
        self.downloader.download_dir().to_path_buf()
    }

    fn start_background_tasks(&self) {
        let max_age = self.config.cache_ttls().longest();
        if !max_age.is_zero() {
            let sweeper =
                self.maintenance
                    .start_cache_sweeper(CACHE_SWEEP_INTERVAL, max_age, self.cancel.clone());
            self.tasks.spawn(async move {
                if let Err(e) = sweeper.await {
                    warn!(error = %e, "Cache sweeper task failed");
                }
            });
        }

        if self.config.check_updates_on_boot {
            let updater = self.updater.clone();
            let timeout = self.config.boot_check_timeout();
            let cancel = self.cancel.clone();
            self.tasks.spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    outcome = tokio::time::timeout(timeout, updater.check()) => match outcome {
                        Ok(info) => match info.detail {
                            Some(detail) => updater.record_boot_error(&detail).await,
                            None => {
                                if let Err(e) = updater.clear_boot_error().await {
                                    warn!(error = %e, "Failed to clear boot error");
                                }
                            }
                        },
                        Err(_) => {
                            let message =
                                format!("update check timed out after {}s", timeout.as_secs());
                            warn!("{message}");
                            updater.record_boot_error(&message).await;
                        }
                    },
                }
            });
        }
    }

    pub async fn health(&self) -> EngineHealth {
        let (db_accessible, extractor_version) =
            tokio::join!(self.db.ping(), self.updater.installed_version());
        let active_source = self
            .registry
            .active()
            .await
            .ok()
            .flatten()
            .map(|s| s.base_url);
        let last_error = self.updater.last_boot_error().await.ok().flatten();

        EngineHealth {
            engine_ready: !self.cancel.is_cancelled(),
            db_accessible,
            extractor_version: extractor_version.ok(),
            active_source,
            last_error,
        }
    }

    /// Stop background tasks, refuse new resolutions and close the store.
    pub async fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        info!("Engine shutting down");
        self.cancel.cancel();
        self.pipeline.close();
        self.tasks.close();
        self.tasks.wait().await;
        self.db.close().await;
    }
}
