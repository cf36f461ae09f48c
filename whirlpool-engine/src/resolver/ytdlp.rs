//! yt-dlp subprocess driver.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use process_utils::{CapturedOutput, output_with_timeout, tokio_command};
use tracing::{debug, info, warn};

use super::parse::{ParseContext, parse_extractor_output};
use super::{MediaFetcher, StreamExtractor};
use crate::domain::PlaybackResolution;
use crate::updater::{ExtractorMaintenance, SelfUpdateRun};
use crate::{Error, Result};

const VERSION_TIMEOUT: Duration = Duration::from_secs(30);
const SELF_UPDATE_TIMEOUT: Duration = Duration::from_secs(300);
const PYTHON_MODULE: &str = "yt_dlp";

/// Drives the `yt-dlp` executable, falling back to `python -m yt_dlp` when
/// the executable cannot be started.
pub struct YtDlpExtractor {
    binary: String,
    python: String,
    user_agent: String,
    timeout: Duration,
    download_timeout: Duration,
    version: RwLock<Option<String>>,
}

impl YtDlpExtractor {
    pub fn new(
        binary: impl Into<String>,
        python: impl Into<String>,
        user_agent: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            binary: binary.into(),
            python: python.into(),
            user_agent: user_agent.into(),
            timeout,
            download_timeout: timeout,
            version: RwLock::new(None),
        }
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    async fn run(&self, args: &[String], timeout: Duration) -> Result<CapturedOutput> {
        let mut cmd = tokio_command(&self.binary);
        cmd.args(args);
        match output_with_timeout(&mut cmd, timeout).await {
            Err(primary) if primary.is_spawn_failure() => {
                debug!(
                    binary = %self.binary,
                    error = %primary,
                    "yt-dlp executable unavailable, trying python module"
                );
                let mut cmd = tokio_command(&self.python);
                cmd.arg("-m").arg(PYTHON_MODULE).args(args);
                output_with_timeout(&mut cmd, timeout)
                    .await
                    .map_err(|fallback| {
                        if fallback.is_spawn_failure() {
                            Error::resolution(format!(
                                "yt-dlp is not available ({primary}; {fallback})"
                            ))
                        } else {
                            fallback.into()
                        }
                    })
            }
            other => Ok(other?),
        }
    }

    /// Installed yt-dlp version, cached until the next self-update.
    pub async fn version(&self) -> Result<String> {
        if let Some(version) = self.version.read().clone() {
            return Ok(version);
        }
        let output = self.run(&["--version".to_string()], VERSION_TIMEOUT).await?;
        let version = output
            .stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .filter(|_| output.success())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Other(format!(
                    "yt-dlp --version failed: {}",
                    output.stderr_tail(2).join(" | ")
                ))
            })?;
        *self.version.write() = Some(version.clone());
        Ok(version)
    }
}

fn failure_diagnostics(output: &CapturedOutput) -> Vec<String> {
    let mut diagnostics = vec![format!("yt-dlp exited with {}", output.status)];
    diagnostics.extend(output.stderr_tail(5));
    diagnostics
}

#[async_trait]
impl StreamExtractor for YtDlpExtractor {
    async fn extract(&self, page_url: &str, extra_args: &[String]) -> Result<PlaybackResolution> {
        let mut args: Vec<String> = ["-J", "--no-playlist", "--no-warnings"]
            .into_iter()
            .map(String::from)
            .collect();
        args.extend(extra_args.iter().cloned());
        args.push("--".to_string());
        args.push(page_url.to_string());

        debug!(page_url, extra = extra_args.len(), "Running yt-dlp");
        let output = self.run(&args, self.timeout).await?;
        if !output.success() {
            return Err(Error::resolution_with(
                "yt-dlp could not extract a stream",
                failure_diagnostics(&output),
            ));
        }

        let mut resolution = parse_extractor_output(
            &output.stdout,
            ParseContext {
                page_url,
                user_agent: &self.user_agent,
            },
        )?;
        if resolution.extractor.is_none() {
            resolution.extractor = Some("yt-dlp".to_string());
        }
        if resolution.yt_dlp_version.is_none() {
            resolution.yt_dlp_version = self.version().await.ok();
        }
        Ok(resolution)
    }
}

#[async_trait]
impl MediaFetcher for YtDlpExtractor {
    async fn fetch_media(
        &self,
        page_url: &str,
        extra_args: &[String],
        staging_dir: &Path,
        stem: &str,
    ) -> Result<PathBuf> {
        let mut args: Vec<String> = [
            "--no-playlist",
            "--no-warnings",
            "--no-progress",
            "--force-overwrites",
            "--no-simulate",
            "--print",
            "after_move:filepath",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        args.push("-P".to_string());
        args.push(staging_dir.to_string_lossy().into_owned());
        args.push("-o".to_string());
        args.push(format!("{stem}-%(id)s.%(ext)s"));
        args.extend(extra_args.iter().cloned());
        args.push("--".to_string());
        args.push(page_url.to_string());

        info!(page_url, staging = %staging_dir.display(), "Downloading media");
        let output = self.run(&args, self.download_timeout).await?;
        if !output.success() {
            return Err(Error::resolution_with(
                "yt-dlp download failed",
                failure_diagnostics(&output),
            ));
        }

        let printed = output
            .stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(PathBuf::from);
        if let Some(path) = printed
            && tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file())
        {
            return Ok(path);
        }

        warn!(page_url, "yt-dlp did not report the output path, scanning staging directory");
        largest_file(staging_dir)
            .await?
            .ok_or_else(|| Error::resolution("yt-dlp download produced no file"))
    }
}

#[async_trait]
impl ExtractorMaintenance for YtDlpExtractor {
    async fn installed_version(&self) -> Result<String> {
        self.version().await
    }

    async fn self_update(&self) -> Result<SelfUpdateRun> {
        let output = self.run(&["-U".to_string()], SELF_UPDATE_TIMEOUT).await?;
        self.version.write().take();

        let mut text = output.stdout.trim().to_string();
        let stderr = output.stderr.trim();
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(stderr);
        }
        Ok(SelfUpdateRun {
            success: output.success(),
            output: text,
        })
    }
}

/// Largest completed regular file in `dir`, ignoring partial fragments.
async fn largest_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| Error::io_path("reading staging directory", dir, e))?;
    let mut best: Option<(u64, PathBuf)> = None;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io_path("reading staging directory", dir, e))?
    {
        let path = entry.path();
        let partial = path
            .extension()
            .is_some_and(|ext| ext == "part" || ext == "ytdl");
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if partial || !meta.is_file() {
            continue;
        }
        if best.as_ref().is_none_or(|(size, _)| meta.len() > *size) {
            best = Some((meta.len(), path));
        }
    }
    Ok(best.map(|(_, path)| path))
}
