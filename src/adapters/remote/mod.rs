//! HTTP-backed collaborators.

pub mod azure;
pub mod gemini;
pub mod gtts;
pub mod infographic;

pub use azure::AzureSpeech;
pub use gemini::GeminiPlanner;
pub use gtts::GttsSpeech;
pub use infographic::InfographicRenderer;

use crate::domain::jobs::SpeechOptions;
use crate::error::PortError;
use crate::ports::speech::SpeechPort;
use async_trait::async_trait;
use std::path::Path;

/// The speech backend chosen at startup.
#[derive(Debug, Clone)]
pub enum SpeechService {
    Gtts(GttsSpeech),
    Azure(AzureSpeech),
}

#[async_trait]
impl SpeechPort for SpeechService {
    async fn synthesize(
        &self,
        text: &str,
        options: &SpeechOptions,
        output: &Path,
    ) -> Result<(), PortError> {
        match self {
            SpeechService::Gtts(speech) => speech.synthesize(text, options, output).await,
            SpeechService::Azure(speech) => speech.synthesize(text, options, output).await,
        }
    }
}
