//! Logo Fetcher - downloads a client logo into the staging directory
//!
//! [`StagedLogo`] owns the staged file. It is removed by
//! [`StagedLogo::release`] or, failing that, on drop.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Client has no logo URL")]
    MissingUrl,

    #[error("Logo download failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Logo download from {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to stage logo at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait LogoFetcher: Send + Sync {
    /// Download `url` and write it to `dest`.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), DownloadError>;
}

pub struct HttpLogoFetcher {
    client: reqwest::Client,
}

impl HttpLogoFetcher {
    pub fn new(timeout: Duration) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LogoFetcher for HttpLogoFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(DownloadError::MissingUrl);
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|source| DownloadError::Write {
                path: dest.to_path_buf(),
                source,
            })?;

        tracing::debug!(url, path = %dest.display(), bytes = bytes.len(), "Logo staged");
        Ok(())
    }
}

/// A logo staged on disk for the duration of one client's run.
#[derive(Debug)]
pub struct StagedLogo {
    path: PathBuf,
    released: bool,
}

impl StagedLogo {
    /// Fetch `url` into `path`. A partially written file is removed if the
    /// fetch fails.
    pub async fn acquire(
        fetcher: &dyn LogoFetcher,
        url: &str,
        path: PathBuf,
    ) -> Result<Self, DownloadError> {
        let staged = Self {
            path,
            released: false,
        };
        fetcher.fetch(url, &staged.path).await?;
        Ok(staged)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn release(mut self) {
        self.released = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Staged logo removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staged logo")
            }
        }
    }
}

impl Drop for StagedLogo {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staged logo");
            }
        }
    }
}
