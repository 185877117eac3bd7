//! Media Compiler: one still-image clip per segment, then a stream-copy concat.
//!
//! Each clip lasts exactly as long as its probed narration audio, so the final
//! video's duration is the sum of the actual audio durations rather than the
//! planner's hints.

use crate::domain::media::{concat_manifest, EncodeSpec, EncoderTimeouts, VideoProfile};
use crate::domain::plan::SegmentPlan;
use crate::domain::workspace::JobPaths;
use crate::error::{CompileError, ConcatenationError, EncoderError};
use crate::ports::encoder::EncoderPort;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledClip {
    pub segment_number: u32,
    pub path: PathBuf,
    /// Seconds; the probed audio duration or the profile fallback.
    pub duration: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileOutcome {
    /// Ascending segment order.
    pub clips: Vec<CompiledClip>,
    pub errors: Vec<CompileError>,
    /// Segments lacking a recorded image or audio file.
    pub skipped: Vec<u32>,
    pub final_video: Option<PathBuf>,
    pub concatenation_error: Option<ConcatenationError>,
    pub total_duration: f64,
}

impl CompileOutcome {
    pub fn clip_durations(&self) -> Vec<(u32, f64)> {
        self.clips
            .iter()
            .map(|c| (c.segment_number, c.duration))
            .collect()
    }
}

async fn non_empty(path: &Path) -> bool {
    matches!(tokio::fs::metadata(path).await, Ok(meta) if meta.is_file() && meta.len() > 0)
}

/// Delete a final video the current outcome does not vouch for.
async fn remove_stale(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!(video = %path.display(), "removed stale final video"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(video = %path.display(), error = %e, "could not remove stale final video"),
    }
}

pub struct MediaCompiler<E> {
    encoder: E,
    timeouts: EncoderTimeouts,
    limit: Arc<Semaphore>,
}

impl<E> MediaCompiler<E>
where
    E: EncoderPort,
{
    pub fn new(encoder: E, timeouts: EncoderTimeouts, limit: Arc<Semaphore>) -> Self {
        Self {
            encoder,
            timeouts,
            limit,
        }
    }

    /// Encode one segment's image and audio into `output`.
    #[instrument(skip(self, image, audio, profile, output))]
    pub async fn compile_segment(
        &self,
        segment_number: u32,
        image: &Path,
        audio: &Path,
        profile: &VideoProfile,
        output: &Path,
    ) -> Result<CompiledClip, CompileError> {
        for input in [image, audio] {
            if !non_empty(input).await {
                return Err(CompileError::MissingInput {
                    segment_number,
                    path: input.to_path_buf(),
                });
            }
        }

        let duration = match self.encoder.probe_duration(audio, self.timeouts.probe).await {
            Ok(duration) => duration,
            Err(e) => {
                warn!(
                    error = %e,
                    fallback = profile.fallback_duration,
                    "audio probe failed, using fallback duration"
                );
                profile.fallback_duration
            }
        };

        let spec = EncodeSpec::StillClip {
            image: image.to_path_buf(),
            audio: audio.to_path_buf(),
            duration,
            profile: profile.clone(),
            output: output.to_path_buf(),
        };
        let outcome = self
            .encoder
            .encode(&spec, self.timeouts.clip)
            .await
            .map_err(|e| match e {
                EncoderError::TimedOut { timeout, .. } => CompileError::TimedOut {
                    segment_number,
                    timeout_secs: timeout.as_secs(),
                },
                other => CompileError::Encoder {
                    segment_number,
                    cause: other.to_string(),
                },
            })?;

        if !outcome.success() {
            return Err(CompileError::EncoderFailed {
                segment_number,
                status: outcome.status,
                stderr: outcome.stderr,
            });
        }
        if !non_empty(output).await {
            return Err(CompileError::EmptyOutput {
                segment_number,
                path: output.to_path_buf(),
            });
        }

        info!(duration, clip = %output.display(), "compiled segment clip");
        Ok(CompiledClip {
            segment_number,
            path: output.to_path_buf(),
            duration,
        })
    }

    /// Losslessly join `clips`, in the given order, into `output`.
    #[instrument(skip_all, fields(clips = clips.len()))]
    pub async fn concatenate(
        &self,
        clips: &[PathBuf],
        manifest: &Path,
        output: &Path,
    ) -> Result<PathBuf, ConcatenationError> {
        if clips.is_empty() {
            return Err(ConcatenationError::NoClips);
        }

        let mut absolute = Vec::with_capacity(clips.len());
        for clip in clips {
            if !non_empty(clip).await {
                return Err(ConcatenationError::MissingClip(clip.clone()));
            }
            let path = tokio::fs::canonicalize(clip)
                .await
                .map_err(|_| ConcatenationError::MissingClip(clip.clone()))?;
            absolute.push(path);
        }

        tokio::fs::write(manifest, concat_manifest(&absolute))
            .await
            .map_err(|e| ConcatenationError::Manifest(e.to_string()))?;

        let spec = EncodeSpec::Concat {
            manifest: manifest.to_path_buf(),
            output: output.to_path_buf(),
        };
        let result = self.encoder.encode(&spec, self.timeouts.concat).await;
        if let Err(e) = tokio::fs::remove_file(manifest).await {
            warn!(error = %e, "could not remove concat manifest");
        }

        let outcome = result.map_err(|e| match e {
            EncoderError::TimedOut { timeout, .. } => ConcatenationError::TimedOut {
                timeout_secs: timeout.as_secs(),
            },
            other => ConcatenationError::Encoder(other.to_string()),
        })?;
        if !outcome.success() {
            return Err(ConcatenationError::EncoderFailed {
                status: outcome.status,
                stderr: outcome.stderr,
            });
        }
        if !non_empty(output).await {
            return Err(ConcatenationError::EmptyOutput(output.to_path_buf()));
        }

        info!(video = %output.display(), "concatenated final video");
        Ok(output.to_path_buf())
    }

    /// Compile every segment that has both an image and audio recorded, then
    /// concatenate the clips unless `concatenate` is false.
    pub async fn compile_all(
        &self,
        plan: &SegmentPlan,
        paths: &JobPaths,
        profile: &VideoProfile,
        concatenate: bool,
    ) -> CompileOutcome {
        let mut outcome = CompileOutcome::default();

        let mut segments: Vec<_> = plan.segments.iter().collect();
        segments.sort_by_key(|s| s.segment_number);

        let mut candidates = Vec::new();
        for segment in segments {
            match (&segment.background_image, &segment.audio_file) {
                (Some(image), Some(audio)) => candidates.push((segment.segment_number, image, audio)),
                _ => outcome.skipped.push(segment.segment_number),
            }
        }

        let results = join_all(candidates.into_iter().map(|(n, image, audio)| async move {
            let Ok(_permit) = self.limit.acquire().await else {
                return Err(CompileError::Encoder {
                    segment_number: n,
                    cause: "worker pool closed".to_string(),
                });
            };
            self.compile_segment(n, image, audio, profile, &paths.clip(n))
                .await
        }))
        .await;

        for result in results {
            match result {
                Ok(clip) => outcome.clips.push(clip),
                Err(e) => {
                    warn!(error = %e, "segment compilation failed");
                    outcome.errors.push(e);
                }
            }
        }
        outcome.total_duration = outcome.clips.iter().map(|c| c.duration).sum();

        let final_video = paths.final_video();
        remove_stale(&final_video).await;

        if outcome.clips.is_empty() {
            warn!("no segment could be compiled, skipping concatenation");
            return outcome;
        }
        if concatenate {
            let clip_paths: Vec<PathBuf> = outcome.clips.iter().map(|c| c.path.clone()).collect();
            match self
                .concatenate(&clip_paths, &paths.concat_manifest(), &final_video)
                .await
            {
                Ok(video) => outcome.final_video = Some(video),
                Err(e) => {
                    warn!(error = %e, "concatenation failed");
                    remove_stale(&final_video).await;
                    outcome.concatenation_error = Some(e);
                }
            }
        }
        outcome
    }
}
