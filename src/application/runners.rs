//! Asset Stage Runners.
//!
//! Each runner works on a read-only plan and returns one outcome per segment;
//! it never touches the plan itself. Collaborator failures and timeouts end up
//! as [`AssetError`]s scoped to a single segment and artifact.

use crate::domain::jobs::SpeechOptions;
use crate::domain::narration::{
    complete_narration_file, narration_file, normalize_whitespace, overlay_file,
};
use crate::domain::plan::SegmentPlan;
use crate::domain::workspace::JobPaths;
use crate::error::{AssetError, AssetKind, PortError};
use crate::ports::renderer::RendererPort;
use crate::ports::speech::SpeechPort;
use futures::future::join_all;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, warn};

pub type AssetResult = Result<PathBuf, AssetError>;

const POOL_CLOSED: &str = "worker pool closed";

/// Result of one runner unit for one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentAsset {
    pub segment_number: u32,
    pub result: AssetResult,
}

/// Bound `call` by `timeout`, then check that it left a non-empty file behind.
async fn produce<F>(
    segment_number: Option<u32>,
    kind: AssetKind,
    output: &Path,
    timeout: Duration,
    call: F,
) -> AssetResult
where
    F: Future<Output = Result<(), PortError>>,
{
    let fail = |cause: String| AssetError::new(segment_number, kind, cause);
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(fail(e.to_string())),
        Err(_) => return Err(fail(format!("timed out after {:?}", timeout))),
    }
    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.len() > 0 => Ok(output.to_path_buf()),
        _ => Err(fail(format!("no output written to `{}`", output.display()))),
    }
}

fn log_result(asset: &SegmentAsset, kind: AssetKind) {
    match &asset.result {
        Ok(path) => info!(segment = asset.segment_number, %kind, path = %path.display(), "asset ready"),
        Err(e) => warn!(error = %e, "asset failed"),
    }
}

pub struct ImageRunner<R> {
    renderer: R,
    timeout: Duration,
    limit: Arc<Semaphore>,
}

impl<R> ImageRunner<R>
where
    R: RendererPort,
{
    pub fn new(renderer: R, timeout: Duration, limit: Arc<Semaphore>) -> Self {
        Self {
            renderer,
            timeout,
            limit,
        }
    }

    pub async fn run(&self, plan: &SegmentPlan, paths: &JobPaths) -> Vec<SegmentAsset> {
        join_all(plan.segments.iter().map(|segment| async move {
            let n = segment.segment_number;
            let output = paths.background(n);
            let source = paths.background_html(n);
            let result = if segment.image_prompt.trim().is_empty() {
                Err(AssetError::new(Some(n), AssetKind::Image, "empty image prompt"))
            } else if let Ok(_permit) = self.limit.acquire().await {
                produce(
                    Some(n),
                    AssetKind::Image,
                    &output,
                    self.timeout,
                    self.renderer.render(&segment.image_prompt, &source, &output),
                )
                .await
            } else {
                Err(AssetError::new(Some(n), AssetKind::Image, POOL_CLOSED))
            };
            let asset = SegmentAsset {
                segment_number: n,
                result,
            };
            log_result(&asset, AssetKind::Image);
            asset
        }))
        .await
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NarrationOutcome {
    pub segments: Vec<SegmentAsset>,
    /// Overlay files are optional; only their failures are reported.
    pub overlay_errors: Vec<AssetError>,
    pub complete_narration: Option<AssetResult>,
}

/// Writes the narration and overlay text files. Purely local.
#[derive(Debug, Clone, Copy, Default)]
pub struct NarrationRunner;

impl NarrationRunner {
    pub async fn run(&self, plan: &SegmentPlan, paths: &JobPaths) -> NarrationOutcome {
        let mut outcome = NarrationOutcome::default();

        for segment in &plan.segments {
            let n = segment.segment_number;

            if let Some(overlay) = overlay_file(segment) {
                let path = paths.overlay(n);
                if let Err(e) = tokio::fs::write(&path, overlay).await {
                    outcome
                        .overlay_errors
                        .push(AssetError::new(Some(n), AssetKind::Overlay, e.to_string()));
                }
            }

            let path = paths.narration(n);
            let result = tokio::fs::write(&path, narration_file(segment))
                .await
                .map(|_| path)
                .map_err(|e| AssetError::new(Some(n), AssetKind::Narration, e.to_string()));
            outcome.segments.push(SegmentAsset {
                segment_number: n,
                result,
            });
        }

        let path = paths.complete_narration();
        outcome.complete_narration = Some(
            tokio::fs::write(&path, complete_narration_file(plan))
                .await
                .map(|_| path)
                .map_err(|e| AssetError::new(None, AssetKind::Narration, e.to_string())),
        );
        outcome
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioOutcome {
    pub segments: Vec<SegmentAsset>,
    /// `None` when no segment produced audio, so nothing was attempted.
    pub complete_audio: Option<AssetResult>,
}

pub struct AudioRunner<S> {
    speech: S,
    timeout: Duration,
    limit: Arc<Semaphore>,
}

impl<S> AudioRunner<S>
where
    S: SpeechPort,
{
    pub fn new(speech: S, timeout: Duration, limit: Arc<Semaphore>) -> Self {
        Self {
            speech,
            timeout,
            limit,
        }
    }

    pub async fn run(
        &self,
        plan: &SegmentPlan,
        paths: &JobPaths,
        options: &SpeechOptions,
    ) -> AudioOutcome {
        let segments: Vec<SegmentAsset> = join_all(plan.segments.iter().map(|segment| async move {
            let n = segment.segment_number;
            let text = normalize_whitespace(&segment.narration_text);
            let result = if text.is_empty() {
                Err(AssetError::new(Some(n), AssetKind::Audio, "no narration text"))
            } else if let Ok(_permit) = self.limit.acquire().await {
                let output = paths.audio(n);
                produce(
                    Some(n),
                    AssetKind::Audio,
                    &output,
                    self.timeout,
                    self.speech.synthesize(&text, options, &output),
                )
                .await
            } else {
                Err(AssetError::new(Some(n), AssetKind::Audio, POOL_CLOSED))
            };
            let asset = SegmentAsset {
                segment_number: n,
                result,
            };
            log_result(&asset, AssetKind::Audio);
            asset
        }))
        .await;

        let spoken: Vec<String> = plan
            .segments
            .iter()
            .zip(&segments)
            .filter(|(_, asset)| asset.result.is_ok())
            .map(|(segment, _)| normalize_whitespace(&segment.narration_text))
            .collect();

        let complete_audio = if spoken.is_empty() {
            None
        } else {
            let output = paths.complete_audio();
            let text = spoken.join(" ");
            let result = produce(
                None,
                AssetKind::CompleteAudio,
                &output,
                self.timeout,
                self.speech.synthesize(&text, options, &output),
            )
            .await;
            if let Err(e) = &result {
                warn!(error = %e, "complete narration audio failed");
            }
            Some(result)
        };

        AudioOutcome {
            segments,
            complete_audio,
        }
    }
}
