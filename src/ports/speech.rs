use crate::domain::jobs::SpeechOptions;
use crate::error::PortError;
use async_trait::async_trait;
use std::path::Path;

/// Text-to-speech: writes an MP3 of `text` to `output`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechPort: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        options: &SpeechOptions,
        output: &Path,
    ) -> Result<(), PortError>;
}
