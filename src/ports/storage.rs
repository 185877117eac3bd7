use async_trait::async_trait;
use std::error::Error;
use std::path::Path;

/// Where finished videos are published.
#[async_trait]
pub trait StoragePort: Send + Sync {
    /// Upload a file from a local path to storage under `key`
    async fn upload(
        &self,
        local_path: &Path,
        key: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Public URL under which `key` can be downloaded
    fn object_url(&self, key: &str) -> String;
}
