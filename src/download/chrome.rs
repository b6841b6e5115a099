use super::Downloader;
use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::DEFAULT_MAX_PACKAGE_SIZE;

const UPDATE_SERVICE_URL: &str = "https://clients2.google.com/service/update2/crx";

/// Browser version reported to the update service. Some packages are only
/// served to recent versions.
const DEFAULT_PROD_VERSION: &str = "130.0.0.0";

/// Fetches packages from the Chrome Web Store update service.
pub struct ChromeDownloader {
    client: reqwest::Client,
    prod_version: String,
    max_size: usize,
}

impl ChromeDownloader {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("crxview/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            prod_version: DEFAULT_PROD_VERSION.to_string(),
            max_size: DEFAULT_MAX_PACKAGE_SIZE,
        })
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_prod_version(mut self, version: impl Into<String>) -> Self {
        self.prod_version = version.into();
        self
    }

    pub fn build_download_url(&self, extension_id: &str) -> String {
        format!(
            "{}?response=redirect&prodversion={}&acceptformat=crx2,crx3&x=id%3D{}%26uc",
            UPDATE_SERVICE_URL, self.prod_version, extension_id
        )
    }

    fn check_size(&self, size: u64) -> Result<()> {
        if size > self.max_size as u64 {
            anyhow::bail!("Package exceeds the size limit of {} bytes", self.max_size);
        }
        Ok(())
    }
}

#[async_trait]
impl Downloader for ChromeDownloader {
    async fn download(&self, extension_id: &str) -> Result<Vec<u8>> {
        let url = self.build_download_url(extension_id);
        tracing::debug!(%url, "Downloading extension");

        let mut response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send download request")?
            .error_for_status()
            .with_context(|| format!("Web Store refused extension {}", extension_id))?;

        if let Some(len) = response.content_length() {
            self.check_size(len)?;
        }

        // Content-Length is optional, so the limit is also enforced per chunk.
        let mut data = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read response body")?
        {
            self.check_size((data.len() + chunk.len()) as u64)?;
            data.extend_from_slice(&chunk);
        }

        if data.is_empty() {
            anyhow::bail!("Web Store returned an empty package for {}", extension_id);
        }
        tracing::debug!(bytes = data.len(), "Download finished");
        Ok(data)
    }
}
