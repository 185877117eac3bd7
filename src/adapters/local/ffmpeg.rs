use crate::domain::media::EncodeSpec;
use crate::error::EncoderError;
use crate::ports::encoder::{EncodeOutcome, EncoderPort};
use async_trait::async_trait;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command as TokioCommand;
use tracing::debug;

const STDERR_TAIL: usize = 2000;

/// Encoder backed by the `ffmpeg` and `ffprobe` executables.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    async fn run(
        program: &str,
        mut command: TokioCommand,
        timeout: Duration,
    ) -> Result<Output, EncoderError> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(source)) => Err(EncoderError::Spawn {
                program: program.to_string(),
                source,
            }),
            Err(_) => Err(EncoderError::TimedOut {
                program: program.to_string(),
                timeout,
            }),
        }
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

/// Keep the end of stderr, where ffmpeg prints the actual error.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let skip = text.chars().count().saturating_sub(STDERR_TAIL);
    text.chars().skip(skip).collect()
}

#[async_trait]
impl EncoderPort for FfmpegEncoder {
    async fn probe_duration(&self, media: &Path, timeout: Duration) -> Result<f64, EncoderError> {
        let mut command = TokioCommand::new(&self.ffprobe);
        command
            .arg("-v")
            .arg("quiet")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("csv=p=0")
            .arg(media);

        let output = Self::run(&self.ffprobe, command, timeout).await?;
        let probe_error = |reason: String| EncoderError::Probe {
            path: media.to_path_buf(),
            reason,
        };
        if !output.status.success() {
            return Err(probe_error(format!(
                "exit status {:?}: {}",
                output.status.code(),
                stderr_tail(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let duration: f64 = stdout
            .trim()
            .parse()
            .map_err(|_| probe_error(format!("unparseable duration `{}`", stdout.trim())))?;
        if !duration.is_finite() || duration <= 0.0 {
            return Err(probe_error(format!("non-positive duration {}", duration)));
        }
        debug!(path = %media.display(), duration, "probed media duration");
        Ok(duration)
    }

    async fn encode(
        &self,
        spec: &EncodeSpec,
        timeout: Duration,
    ) -> Result<EncodeOutcome, EncoderError> {
        let mut command = TokioCommand::new(&self.ffmpeg);
        command.args(spec.args());
        debug!(output = %spec.output().display(), "running ffmpeg");

        let output = Self::run(&self.ffmpeg, command, timeout).await?;
        Ok(EncodeOutcome {
            status: output.status.code(),
            stderr: stderr_tail(&output.stderr),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_keeps_the_tail() {
        let long = format!("{}END", "x".repeat(5000));
        let tail = stderr_tail(long.as_bytes());
        assert_eq!(tail.chars().count(), STDERR_TAIL);
        assert!(tail.ends_with("END"));
        assert_eq!(stderr_tail(b"  short\n"), "short");
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let encoder = FfmpegEncoder::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        let err = encoder
            .probe_duration(Path::new("a.mp3"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, EncoderError::Spawn { .. }));
    }
}
