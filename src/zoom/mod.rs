//! Zoom API client: token exchange, recordings listing and media download.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::ZoomConfig;
use crate::delivery::RecordingSource;
use crate::meeting::MeetingDescriptor;
use crate::project::Project;

mod auth;
mod error;
mod recordings;

pub use auth::AccessToken;
pub use error::ZoomError;
pub use recordings::EmptyListingPolicy;

const DEFAULT_PAGE_SIZE: u32 = 300;
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 3600;

pub struct ZoomClient {
    client: reqwest::Client,
    config: ZoomConfig,
    page_size: u32,
    download_timeout: Duration,
}

impl ZoomClient {
    pub fn new(config: ZoomConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        info!(
            "Initialized Zoom client (oauth: {}, api: {})",
            config.oauth_url, config.api_base_url
        );

        Ok(Self {
            client,
            config,
            page_size: DEFAULT_PAGE_SIZE,
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
        })
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, DEFAULT_PAGE_SIZE);
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    /// Streams a recording into `target`.
    ///
    /// Bytes go to `<target>.part` first and are renamed on success, so a
    /// file under the final name is always complete. The partial file is
    /// removed on any failure, including the overall download timeout.
    pub async fn download_recording(
        &self,
        token: &AccessToken,
        meeting: &MeetingDescriptor,
        target: &Path,
    ) -> Result<u64, ZoomError> {
        let partial = partial_path(target);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let result = tokio::time::timeout(
            self.download_timeout,
            self.stream_to_file(token, &meeting.download_url, &partial),
        )
        .await
        .unwrap_or_else(|_| Err(ZoomError::DownloadTimeout(self.download_timeout.as_secs())));

        match result {
            Ok(bytes) => {
                fs::rename(&partial, target).await?;
                info!(
                    "Downloaded recording {} ({} bytes) to {:?}",
                    meeting.recording_id, bytes, target
                );
                Ok(bytes)
            }
            Err(err) => {
                if let Err(e) = fs::remove_file(&partial).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove partial download {:?}: {}", partial, e);
                    }
                }
                Err(err)
            }
        }
    }

    async fn stream_to_file(
        &self,
        token: &AccessToken,
        url: &str,
        destination: &Path,
    ) -> Result<u64, ZoomError> {
        let mut response = self
            .client
            .get(url)
            .bearer_auth(token.bearer())
            .send()
            .await
            .map_err(ZoomError::download)?
            .error_for_status()
            .map_err(ZoomError::download)?;

        let mut file = fs::File::create(destination).await?;
        let mut total: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(ZoomError::download)? {
            file.write_all(&chunk).await?;
            total += chunk.len() as u64;
        }
        file.flush().await?;
        debug!("Wrote {} bytes to {:?}", total, destination);

        Ok(total)
    }
}

#[async_trait]
impl RecordingSource for ZoomClient {
    async fn fetch(
        &self,
        project: &Project,
        meeting: &MeetingDescriptor,
        target: &Path,
    ) -> Result<u64, ZoomError> {
        let token = self.get_access_token(project).await?;
        self.download_recording(&token, meeting, target).await
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    target.with_file_name(name)
}
