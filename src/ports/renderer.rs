use crate::error::PortError;
use async_trait::async_trait;
use std::path::Path;

/// Turns an image prompt into a raster file at `output`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RendererPort: Send + Sync {
    /// `source` is where a markup-based renderer keeps the document it rasterized.
    async fn render(&self, image_prompt: &str, source: &Path, output: &Path)
        -> Result<(), PortError>;
}
