use crate::domain::media::EncodeSpec;
use crate::error::EncoderError;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Exit status and diagnostics of one encoder run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodeOutcome {
    /// `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stderr: String,
}

impl EncodeOutcome {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// The external encoder: a duration probe and a single encode primitive.
///
/// Implementations enforce `timeout` themselves and report it as
/// [`EncoderError::TimedOut`]; a non-zero exit is an `Ok` outcome.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EncoderPort: Send + Sync {
    async fn probe_duration(&self, media: &Path, timeout: Duration) -> Result<f64, EncoderError>;

    async fn encode(
        &self,
        spec: &EncodeSpec,
        timeout: Duration,
    ) -> Result<EncodeOutcome, EncoderError>;
}
