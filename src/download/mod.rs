pub mod chrome;

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Downloader {
    /// Fetch the raw package bytes for an extension id.
    async fn download(&self, id: &str) -> Result<Vec<u8>>;
}
