use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::json;
use whirlpool_engine::domain::VideoItem;
use whirlpool_engine::filters::FilterSelections;
use whirlpool_engine::{Engine, EngineConfig, PlaybackRequest};

use crate::cli::{
    Commands, DownloadCommand, FavoriteCommand, HistoryCommand, ItemArgs, MaintenanceCommand,
    SettingCommand, SourceCommand,
};

const CONFIG_FILE: &str = "config.toml";

/// Resolve the engine configuration: an explicit file, then the per-user
/// config file, then the environment.
pub fn load_config(explicit: Option<&Path>, db: Option<PathBuf>) -> Result<EngineConfig> {
    let user_file = dirs::config_dir().map(|d| d.join("whirlpool").join(CONFIG_FILE));
    let mut config = match explicit {
        Some(path) => EngineConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => match user_file.filter(|p| p.is_file()) {
            Some(path) => EngineConfig::from_toml_file(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => EngineConfig::from_env().context("Failed to read configuration from environment")?,
        },
    };
    if let Some(db) = db {
        config.db_path = db;
    }
    Ok(config)
}

pub struct CommandExecutor {
    engine: Arc<Engine>,
    compact: bool,
}

impl CommandExecutor {
    pub fn new(engine: Arc<Engine>, compact: bool) -> Self {
        Self { engine, compact }
    }

    fn print<T: Serialize>(&self, value: &T) -> Result<()> {
        let text = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        println!("{text}");
        Ok(())
    }

    pub async fn execute(&self, command: Commands) -> Result<()> {
        let engine = &self.engine;
        match command {
            Commands::Sources(cmd) => self.sources(cmd).await,
            Commands::Status { refresh } => {
                let status = if refresh {
                    let base_url = engine
                        .active_source()
                        .await?
                        .context("No active source; add one with `sources add`")?
                        .base_url;
                    engine.refresh_status(&base_url).await?
                } else {
                    engine.status().await?
                };
                self.print(&status)
            }
            Commands::Channels => self.print(&engine.channels().await?),
            Commands::Filters { channel, set, clear } => {
                if clear {
                    engine.clear_filter_selection(&channel).await?;
                    return self.print(&engine.channel_filters(&channel).await?);
                }
                if set.is_empty() {
                    return self.print(&engine.channel_filters(&channel).await?);
                }
                let mut selections = current_selections(engine, &channel).await?;
                for raw in &set {
                    let (option, choices) = parse_assignment(raw)?;
                    selections.insert(option, choices);
                }
                self.print(&engine.save_filter_selection(&channel, &selections).await?)
            }
            Commands::Videos {
                channel,
                query,
                page,
                per_page,
            } => self.print(
                &engine
                    .discover_videos(&channel, &query, page, per_page)
                    .await?,
            ),
            Commands::Resolve { url, item } => {
                let resolution = engine.resolve(&playback_request(url, item)).await?;
                self.print(&resolution)
            }
            Commands::Download { url, item } => {
                let record = engine.download(&playback_request(url, item)).await?;
                self.print(&record)
            }
            Commands::Downloads(cmd) => match cmd {
                DownloadCommand::List => self.print(&engine.list_downloads().await?),
                DownloadCommand::Remove { channel, video } => {
                    let removed = engine.remove_download(&channel, &video).await?;
                    self.print(&json!({ "removed": removed }))
                }
            },
            Commands::Favorites(cmd) => self.favorites(cmd).await,
            Commands::Settings(cmd) => self.settings(cmd).await,
            Commands::History(cmd) => match cmd {
                HistoryCommand::Watch { limit } => {
                    self.print(&engine.list_watch_history(limit).await?)
                }
                HistoryCommand::Search { limit } => {
                    self.print(&engine.list_search_history(limit).await?)
                }
                HistoryCommand::Clear => {
                    let rows = engine.clear_watch_history().await?;
                    self.print(&json!({ "rowsAffected": rows }))
                }
            },
            Commands::Export { path } => {
                let ok = engine.export_database(&path).await?;
                self.print(&json!({ "exported": ok, "path": path }))
            }
            Commands::Import { path } => {
                let ok = engine.import_database(&path).await?;
                self.print(&json!({ "imported": ok, "path": path }))
            }
            Commands::Maintenance(cmd) => match cmd {
                MaintenanceCommand::ClearCache => {
                    let rows = engine.clear_cache().await?;
                    self.print(&json!({ "rowsAffected": rows }))
                }
                MaintenanceCommand::ClearAchievements => {
                    let rows = engine.clear_achievements().await?;
                    self.print(&json!({ "rowsAffected": rows }))
                }
                MaintenanceCommand::ResetAll { yes } => {
                    if !yes {
                        bail!("Refusing to reset without --yes");
                    }
                    engine.reset_all().await?;
                    self.print(&json!({ "reset": true }))
                }
            },
            Commands::Update { run, stored } => {
                if run {
                    let updated = engine.run_update().await?;
                    self.print(&json!({ "updated": updated }))
                } else if stored {
                    self.print(&engine.update_status().await?)
                } else {
                    self.print(&engine.check_for_update().await)
                }
            }
            Commands::Health => self.print(&engine.health().await),
        }
    }

    async fn sources(&self, cmd: SourceCommand) -> Result<()> {
        let engine = &self.engine;
        match cmd {
            SourceCommand::Add { url } => self.print(&engine.add_source(&url).await?),
            SourceCommand::Remove { url } => {
                let removed = engine.remove_source(&url).await?;
                self.print(&json!({ "removed": removed }))
            }
            SourceCommand::List => self.print(&engine.list_sources().await?),
            SourceCommand::Use { url } => {
                if !engine.set_active_source(&url).await? {
                    bail!("Unknown source: {url}");
                }
                self.print(&engine.active_source().await?)
            }
            SourceCommand::Active => self.print(&engine.active_source().await?),
        }
    }

    async fn favorites(&self, cmd: FavoriteCommand) -> Result<()> {
        let engine = &self.engine;
        match cmd {
            FavoriteCommand::List => self.print(&engine.list_favorites().await?),
            FavoriteCommand::Add {
                id,
                url,
                title,
                channel,
            } => {
                let video = VideoItem {
                    title: title.unwrap_or_else(|| id.clone()),
                    id,
                    page_url: url,
                    duration_seconds: None,
                    thumbnail_url: None,
                    network: None,
                    author_name: None,
                    extractor: None,
                    view_count: None,
                    raw: None,
                };
                engine.add_favorite(channel.as_deref(), &video).await?;
                self.print(&video)
            }
            FavoriteCommand::Remove { id } => {
                let removed = engine.remove_favorite(&id).await?;
                self.print(&json!({ "removed": removed }))
            }
            FavoriteCommand::Clear => {
                let rows = engine.clear_favorites().await?;
                self.print(&json!({ "rowsAffected": rows }))
            }
        }
    }

    async fn settings(&self, cmd: SettingCommand) -> Result<()> {
        let engine = &self.engine;
        match cmd {
            SettingCommand::Get { key } => self.print(&engine.get_setting(&key).await?),
            SettingCommand::Set { key, value } => {
                engine.set_setting(&key, &value).await?;
                self.print(&json!({ "key": key, "value": value }))
            }
            SettingCommand::Remove { key } => {
                let removed = engine.remove_setting(&key).await?;
                self.print(&json!({ "removed": removed }))
            }
            SettingCommand::List { prefix } => self.print(&engine.list_settings(&prefix).await?),
        }
    }
}

async fn current_selections(engine: &Engine, channel: &str) -> Result<FilterSelections> {
    let filters = engine.channel_filters(channel).await?;
    Ok(whirlpool_engine::filters::to_selections(&filters.applied))
}

fn playback_request(url: String, item: ItemArgs) -> PlaybackRequest {
    PlaybackRequest {
        channel_id: item.channel,
        video_id: item.video,
        page_url: url,
        title: item.title,
        thumbnail_url: None,
    }
}

/// Parse `option=choice[,choice...]`.
fn parse_assignment(raw: &str) -> Result<(String, Vec<String>)> {
    let Some((option, choices)) = raw.split_once('=') else {
        bail!("Expected OPTION=CHOICES, got `{raw}`");
    };
    let option = option.trim();
    if option.is_empty() {
        bail!("Missing option id in `{raw}`");
    }
    let choices = choices
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    Ok((option.to_string(), choices))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        let (option, choices) = parse_assignment("tags= a, b ,").unwrap();
        assert_eq!(option, "tags");
        assert_eq!(choices, vec!["a", "b"]);

        let (_, cleared) = parse_assignment("tags=").unwrap();
        assert!(cleared.is_empty());

        assert!(parse_assignment("tags").is_err());
        assert!(parse_assignment("=a").is_err());
    }

    #[test]
    fn test_db_override() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(&file, "yt_dlp_path = \"/opt/yt-dlp\"\n").unwrap();

        let config = load_config(Some(&file), Some(PathBuf::from("/tmp/other.db"))).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.yt_dlp_path, "/opt/yt-dlp");
    }
}
