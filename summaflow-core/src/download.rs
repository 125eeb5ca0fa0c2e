//! Dataset download with fixed-delay retries.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Retry behaviour for [`download_file`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadPolicy {
    /// Total number of attempts before giving up.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Fixed pause between attempts, in seconds.
    #[serde(default = "default_delay_secs")]
    pub delay_secs: f64,
}

impl Default for DownloadPolicy {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            delay_secs: default_delay_secs(),
        }
    }
}

fn default_retries() -> u32 {
    3
}

fn default_delay_secs() -> f64 {
    2.0
}

impl DownloadPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_secs.max(0.0))
    }

    fn attempts(&self) -> u32 {
        self.retries.max(1)
    }
}

/// What [`download_file`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The destination already existed; no request was made.
    Skipped,
    /// The file was fetched, taking this many attempts.
    Downloaded { attempts: u32, bytes: u64 },
}

/// Rewrite a GitHub `blob` page URL to the raw-content URL serving the file.
pub fn resolve_source_url(url: &str) -> Cow<'_, str> {
    if url.contains("github.com") && url.contains("/blob/") {
        let raw = url.replace("/blob/", "/raw/");
        tracing::info!(url = %raw, "Converted GitHub blob URL to raw URL");
        Cow::Owned(raw)
    } else {
        Cow::Borrowed(url)
    }
}

/// Download `url` to `dest`, unless `dest` already exists.
///
/// The body is streamed to a `.part` sibling and renamed into place once
/// complete, so an interrupted download is never mistaken for a finished one
/// on the next run.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    policy: &DownloadPolicy,
) -> Result<DownloadOutcome> {
    let url = resolve_source_url(url);

    if dest.exists() {
        tracing::info!(path = %dest.display(), "Dataset already exists, skipping download");
        return Ok(DownloadOutcome::Skipped);
    }
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        tracing::info!(attempt, max = attempts, url = %url, "Attempting dataset download");
        match fetch_to_file(client, &url, dest).await {
            Ok(bytes) => {
                tracing::info!(path = %dest.display(), bytes, "Download successful");
                return Ok(DownloadOutcome::Downloaded { attempts: attempt, bytes });
            }
            Err(e) if attempt < attempts => {
                tracing::warn!(attempt, error = %e, "Download attempt failed");
                tokio::time::sleep(policy.delay()).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(attempt, error = %e, "Download failed after retries");
                return Err(PipelineError::Download {
                    url: url.into_owned(),
                    attempts,
                    source: Box::new(e),
                });
            }
        }
    }
}

async fn fetch_to_file(client: &reqwest::Client, url: &str, dest: &Path) -> Result<u64> {
    let mut response = client.get(url).send().await?.error_for_status()?;

    let part = dest.with_extension("part");
    let mut file = tokio::fs::File::create(&part).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&part, dest).await?;
    Ok(written)
}
