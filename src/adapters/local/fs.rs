use crate::ports::storage::StoragePort;
use async_trait::async_trait;
use std::error::Error;
use std::path::{Path, PathBuf};

/// Publishes by copying into a directory that is served under `base_url`.
#[derive(Debug, Clone)]
pub struct FsAdapter {
    root: PathBuf,
    base_url: String,
}

impl FsAdapter {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn destination(&self, key: &str) -> Result<PathBuf, Box<dyn Error + Send + Sync>> {
        let relative = Path::new(key.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)))
        {
            return Err(format!("invalid storage key `{}`", key).into());
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StoragePort for FsAdapter {
    async fn upload(
        &self,
        local_path: &Path,
        key: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let key_path = self.destination(key)?;
        // The default publish dir is the output root itself.
        if key_path != local_path {
            if let Some(parent) = key_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(local_path, &key_path).await?;
        }
        Ok(())
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }
}
