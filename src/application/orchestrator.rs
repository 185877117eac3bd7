//! Stage Orchestrator: plan, assets, compile, summary.
//!
//! Only planning and workspace failures fail a job. Everything after that
//! degrades: a failed asset keeps its segment out of the final video, and a
//! failed compilation still leaves every generated asset in the job tree.

use crate::application::compiler::{CompileOutcome, MediaCompiler};
use crate::application::runners::{
    AudioOutcome, AudioRunner, ImageRunner, NarrationRunner, SegmentAsset,
};
use crate::domain::jobs::{GenerateRequest, JobReport, JobState, SegmentStatus};
use crate::domain::media::{EncoderTimeouts, VideoProfile};
use crate::domain::plan::{recover_segments, PlanRequest, Segment, SegmentPlan};
use crate::domain::summary;
use crate::domain::workspace::{JobPaths, WorkspaceManager};
use crate::error::{AssetError, PlanningError, WorkspaceError};
use crate::ports::encoder::EncoderPort;
use crate::ports::planner::PlannerPort;
use crate::ports::renderer::RendererPort;
use crate::ports::speech::SpeechPort;
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

/// Tuning shared by every job an orchestrator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Upper bound on concurrent collaborator calls and clip encodes.
    pub max_concurrency: usize,
    pub collaborator_timeout: Duration,
    pub encoder_timeouts: EncoderTimeouts,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            collaborator_timeout: Duration::from_secs(60),
            encoder_timeouts: EncoderTimeouts::default(),
        }
    }
}

pub struct StageOrchestrator<P, R, S, E> {
    workspace: Arc<WorkspaceManager>,
    planner: P,
    images: ImageRunner<R>,
    narration: NarrationRunner,
    audio: AudioRunner<S>,
    compiler: MediaCompiler<E>,
    planner_timeout: Duration,
}

/// Record successful assets in the field their runner owns; collect failures.
fn apply_assets(
    plan: &mut SegmentPlan,
    assets: Vec<SegmentAsset>,
    errors: &mut Vec<AssetError>,
    record: impl Fn(&mut Segment, PathBuf),
) {
    for asset in assets {
        match asset.result {
            Ok(path) => {
                if let Some(segment) = plan.segment_mut(asset.segment_number) {
                    record(segment, path);
                }
            }
            Err(e) => errors.push(e),
        }
    }
}

fn advance(report: &mut JobReport, next: JobState) {
    if let Err(e) = report.state.advance(next) {
        error!(job_id = %report.job_id, error = %e, "refusing state transition");
    } else {
        info!(job_id = %report.job_id, state = %next, "job state changed");
    }
}

impl<P, R, S, E> StageOrchestrator<P, R, S, E>
where
    P: PlannerPort,
    R: RendererPort,
    S: SpeechPort,
    E: EncoderPort,
{
    pub fn new(
        workspace: Arc<WorkspaceManager>,
        planner: P,
        renderer: R,
        speech: S,
        encoder: E,
        settings: PipelineSettings,
    ) -> Self {
        let limit = Arc::new(Semaphore::new(settings.max_concurrency.max(1)));
        Self {
            workspace,
            planner,
            images: ImageRunner::new(renderer, settings.collaborator_timeout, limit.clone()),
            narration: NarrationRunner,
            audio: AudioRunner::new(speech, settings.collaborator_timeout, limit.clone()),
            compiler: MediaCompiler::new(encoder, settings.encoder_timeouts, limit),
            planner_timeout: settings.collaborator_timeout,
        }
    }

    pub fn workspace(&self) -> &WorkspaceManager {
        &self.workspace
    }

    /// Run one job end to end.
    ///
    /// Returns `Err` only when no job directory could be allocated. Every
    /// other outcome, including a failed job, is described by the report.
    #[instrument(skip_all, fields(topic = request.topic_hint.as_deref().unwrap_or("")))]
    pub async fn run(&self, request: &GenerateRequest) -> Result<JobReport, WorkspaceError> {
        let (job_id, job_root) = self
            .workspace
            .create_job(request.topic_hint.as_deref())
            .await?;
        let paths = self.workspace.get_paths(&job_id)?;
        let mut report = JobReport::new(job_id, job_root);

        let mut plan = match self.plan(request).await {
            Ok(plan) => plan,
            Err(e) => {
                error!(job_id = %report.job_id, error = %e, "planning failed");
                return Ok(self.fail(report, &paths, e.to_string()).await);
            }
        };
        if let Err(e) = plan.save(&paths.script()).await {
            error!(job_id = %report.job_id, error = %e, "could not persist plan");
            return Ok(self.fail(report, &paths, e.to_string()).await);
        }
        info!(
            job_id = %report.job_id,
            segments = plan.segments.len(),
            "plan ready"
        );
        advance(&mut report, JobState::AssetGeneration);

        self.generate_assets(&mut plan, &paths, request, &mut report)
            .await;
        self.persist(&plan, &paths).await;

        advance(&mut report, JobState::Compiling);
        let skip_reason = if !request.enable_audio {
            Some("audio generation disabled")
        } else if !request.compile_video {
            Some("video compilation disabled")
        } else {
            None
        };
        match skip_reason {
            Some(reason) => {
                info!(job_id = %report.job_id, reason, "skipping compilation");
                report.compile_skipped = Some(reason.to_string());
            }
            None => {
                let outcome = self
                    .compiler
                    .compile_all(&plan, &paths, &request.profile, true)
                    .await;
                self.record_compilation(&mut plan, &mut report, outcome);
                self.persist(&plan, &paths).await;
            }
        }

        Ok(self.finish(report, plan, &paths).await)
    }

    /// Re-run the compile stage of an existing job from its saved plan.
    ///
    /// With `segments_only` the clips are rebuilt but not concatenated.
    #[instrument(skip(self, profile))]
    pub async fn compile_job(
        &self,
        job_id: &str,
        profile: &VideoProfile,
        segments_only: bool,
    ) -> Result<JobReport, WorkspaceError> {
        let paths = self.workspace.get_paths(job_id)?;
        let mut plan = SegmentPlan::load(&paths.script()).await?;

        let mut report = JobReport::new(job_id, paths.root.clone());
        report.state = JobState::Compiling;

        let outcome = self
            .compiler
            .compile_all(&plan, &paths, profile, !segments_only)
            .await;
        self.record_compilation(&mut plan, &mut report, outcome);
        if segments_only {
            report.compile_skipped = Some("concatenation not requested".to_string());
        }
        plan.save(&paths.script()).await?;

        Ok(self.finish(report, plan, &paths).await)
    }

    async fn plan(&self, request: &GenerateRequest) -> Result<SegmentPlan, PlanningError> {
        let plan_request = PlanRequest::new(
            request.text.clone(),
            request.target_duration,
            request.segments_count,
        );
        let response = tokio::time::timeout(self.planner_timeout, self.planner.plan(&plan_request))
            .await
            .map_err(|_| PlanningError::TimedOut(self.planner_timeout))?
            .map_err(|e| PlanningError::Planner(e.to_string()))?;
        let raw = recover_segments(&response)?;
        SegmentPlan::from_raw(raw, Local::now())
    }

    async fn generate_assets(
        &self,
        plan: &mut SegmentPlan,
        paths: &JobPaths,
        request: &GenerateRequest,
        report: &mut JobReport,
    ) {
        let (images, narration, audio) = {
            let plan: &SegmentPlan = plan;
            tokio::join!(
                self.images.run(plan, paths),
                self.narration.run(plan, paths),
                async {
                    if request.enable_audio {
                        self.audio.run(plan, paths, &request.speech).await
                    } else {
                        AudioOutcome::default()
                    }
                }
            )
        };

        let mut errors: Vec<AssetError> = Vec::new();
        apply_assets(plan, images, &mut errors, |s, path| s.background_image = Some(path));
        apply_assets(plan, narration.segments, &mut errors, |s, path| {
            s.narration_file = Some(path)
        });
        apply_assets(plan, audio.segments, &mut errors, |s, path| s.audio_file = Some(path));

        errors.extend(narration.overlay_errors);
        if let Some(Err(e)) = narration.complete_narration {
            errors.push(e);
        }
        match audio.complete_audio {
            Some(Ok(path)) => report.complete_audio = Some(path),
            Some(Err(e)) => errors.push(e),
            None => {}
        }
        report.asset_errors = errors;
    }

    fn record_compilation(
        &self,
        plan: &mut SegmentPlan,
        report: &mut JobReport,
        outcome: CompileOutcome,
    ) {
        plan.apply_actual_durations(&outcome.clip_durations());
        report.compile_errors = outcome.errors;
        report.skipped_segments = outcome.skipped;
        report.concatenation_error = outcome.concatenation_error;
        report.total_duration = (!outcome.clips.is_empty()).then_some(outcome.total_duration);
        report.final_video = outcome.final_video;
        report.segments = plan
            .segments
            .iter()
            .map(|s| SegmentStatus {
                segment_number: s.segment_number,
                image: s.background_image.is_some(),
                narration: s.narration_file.is_some(),
                audio: s.audio_file.is_some(),
                clip: outcome
                    .clips
                    .iter()
                    .any(|c| c.segment_number == s.segment_number),
            })
            .collect();
    }

    async fn persist(&self, plan: &SegmentPlan, paths: &JobPaths) {
        if let Err(e) = plan.save(&paths.script()).await {
            error!(job_id = %paths.job_id, error = %e, "could not update plan");
        }
    }

    async fn fail(&self, mut report: JobReport, paths: &JobPaths, cause: String) -> JobReport {
        report.fatal_error = Some(cause);
        advance(&mut report, JobState::Failed);
        self.write_summary(&mut report, paths).await;
        report
    }

    /// Decide the terminal state and write the production summary.
    async fn finish(&self, mut report: JobReport, plan: SegmentPlan, paths: &JobPaths) -> JobReport {
        if report.segments.is_empty() {
            report.segments = plan
                .segments
                .iter()
                .map(|s| SegmentStatus {
                    segment_number: s.segment_number,
                    image: s.background_image.is_some(),
                    narration: s.narration_file.is_some(),
                    audio: s.audio_file.is_some(),
                    clip: false,
                })
                .collect();
        }
        let every_segment_in_video =
            report.final_video.is_some() && report.segments.iter().all(|s| s.clip);
        let next = if every_segment_in_video {
            JobState::Complete
        } else {
            JobState::DegradedComplete
        };
        report.plan = Some(plan);
        advance(&mut report, next);
        self.write_summary(&mut report, paths).await;
        report
    }

    async fn write_summary(&self, report: &mut JobReport, paths: &JobPaths) {
        let path = paths.summary();
        match tokio::fs::write(&path, summary::render(report)).await {
            Ok(()) => report.summary = Some(path),
            Err(e) => warn!(error = %e, "could not write production summary"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::media::EncodeSpec;
    use crate::error::AssetKind;
    use crate::ports::encoder::{EncodeOutcome, MockEncoderPort};
    use crate::ports::planner::MockPlannerPort;
    use crate::ports::renderer::MockRendererPort;
    use crate::ports::speech::MockSpeechPort;
    use std::path::Path;
    use std::sync::Mutex;

    fn planner_response(durations: &[u32]) -> String {
        let segments: Vec<serde_json::Value> = durations
            .iter()
            .enumerate()
            .map(|(i, d)| {
                serde_json::json!({
                    "segment_number": i + 1,
                    "title": format!("Part {}", i + 1),
                    "narration_text": format!("Narration number {}.", i + 1),
                    "key_points": [],
                    "image_prompt": "three empty boxes",
                    "text_overlay": "1. Point",
                    "duration_seconds": d,
                })
            })
            .collect();
        format!("```json\n{}\n```", serde_json::to_string_pretty(&segments).unwrap())
    }

    fn planner(response: String) -> MockPlannerPort {
        let mut planner = MockPlannerPort::new();
        planner
            .expect_plan()
            .returning(move |_| Ok(response.clone()));
        planner
    }

    /// Renderer that fails for the listed segments.
    fn renderer(failing: &'static [u32]) -> MockRendererPort {
        let mut renderer = MockRendererPort::new();
        renderer.expect_render().returning(move |_, _, output| {
            let name = output.file_name().unwrap().to_string_lossy().into_owned();
            if failing
                .iter()
                .any(|n| name == format!("segment_{:02}_background.png", n))
            {
                return Err("renderer returned 500".into());
            }
            std::fs::write(output, b"png").unwrap();
            Ok(())
        });
        renderer
    }

    fn speech() -> MockSpeechPort {
        let mut speech = MockSpeechPort::new();
        speech.expect_synthesize().returning(|_, _, output| {
            std::fs::write(output, b"mp3").unwrap();
            Ok(())
        });
        speech
    }

    /// Encoder whose probe reports `durations[n - 1]` for `segment_NN_audio.mp3`
    /// and which records every concat manifest.
    fn encoder(durations: &'static [f64], manifests: Arc<Mutex<Vec<String>>>) -> MockEncoderPort {
        let mut encoder = MockEncoderPort::new();
        encoder.expect_probe_duration().returning(move |path, _| {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            let n: usize = name[8..10].parse().unwrap();
            Ok(durations[n - 1])
        });
        encoder.expect_encode().returning(move |spec, _| {
            if let EncodeSpec::Concat { manifest, .. } = spec {
                manifests
                    .lock()
                    .unwrap()
                    .push(std::fs::read_to_string(manifest).unwrap());
            }
            std::fs::write(spec.output(), b"mp4").unwrap();
            Ok(EncodeOutcome {
                status: Some(0),
                stderr: String::new(),
            })
        });
        encoder
    }

    fn orchestrator(
        dir: &Path,
        planner: MockPlannerPort,
        renderer: MockRendererPort,
        encoder: MockEncoderPort,
    ) -> StageOrchestrator<MockPlannerPort, MockRendererPort, MockSpeechPort, MockEncoderPort> {
        StageOrchestrator::new(
            Arc::new(WorkspaceManager::new(dir)),
            planner,
            renderer,
            speech(),
            encoder,
            PipelineSettings {
                max_concurrency: 2,
                ..PipelineSettings::default()
            },
        )
    }

    fn request() -> GenerateRequest {
        let mut request = GenerateRequest::new("How TCP handshakes work");
        request.topic_hint = Some("tcp".to_string());
        request
    }

    #[tokio::test]
    async fn full_run_completes_with_actual_durations() {
        let dir = tempfile::tempdir().unwrap();
        let manifests = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = orchestrator(
            dir.path(),
            planner(planner_response(&[10, 8, 12])),
            renderer(&[]),
            encoder(&[9.4, 8.0, 11.7], manifests.clone()),
        );

        let report = orchestrator.run(&request()).await.unwrap();

        assert_eq!(report.state, JobState::Complete);
        assert!(report.asset_errors.is_empty());
        assert!((report.total_duration.unwrap() - 29.1).abs() < 1e-9);
        let video = report.final_video.clone().unwrap();
        assert!(video.starts_with(&report.job_root));
        assert!(report.complete_audio.is_some());

        let saved = SegmentPlan::load(&report.job_root.join("video_script.json"))
            .await
            .unwrap();
        let last = saved.segment(3).unwrap();
        assert_eq!(last.timing.start_time, 18.0);
        let actual = last.actual_timing.unwrap();
        assert!((actual.start_time - 17.4).abs() < 1e-9);
        assert!(last.audio_file.is_some() && last.background_image.is_some());

        let summary = std::fs::read_to_string(report.summary.unwrap()).unwrap();
        assert!(summary.contains("- **State**: complete"));
    }

    #[tokio::test]
    async fn failed_image_degrades_job_and_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let manifests = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = orchestrator(
            dir.path(),
            planner(planner_response(&[10, 10, 10])),
            renderer(&[2]),
            encoder(&[5.0, 6.0, 7.0], manifests.clone()),
        );

        let report = orchestrator.run(&request()).await.unwrap();

        assert_eq!(report.state, JobState::DegradedComplete);
        assert!(report.asset_failed(2, AssetKind::Image));
        assert_eq!(report.skipped_segments, vec![2]);
        assert_eq!(report.compiled_segments(), vec![1, 3]);
        assert!(report.final_video.is_some());
        assert_eq!(report.total_duration, Some(12.0));

        let manifest = manifests.lock().unwrap()[0].clone();
        let lines: Vec<&str> = manifest.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("segment_01_video.mp4"));
        assert!(lines[1].contains("segment_03_video.mp4"));
    }

    #[tokio::test]
    async fn partial_failure_of_five_keeps_four_clips() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(
            dir.path(),
            planner(planner_response(&[10; 5])),
            renderer(&[2]),
            encoder(&[3.0; 5], Arc::new(Mutex::new(Vec::new()))),
        );

        let report = orchestrator.run(&request()).await.unwrap();

        assert_ne!(report.state, JobState::Failed);
        assert_eq!(report.compiled_segments(), vec![1, 3, 4, 5]);
    }

    #[tokio::test]
    async fn unusable_planner_output_fails_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut encoder = MockEncoderPort::new();
        encoder.expect_encode().never();
        let orchestrator = orchestrator(
            dir.path(),
            planner("Sorry, I can't help with that.".to_string()),
            MockRendererPort::new(),
            encoder,
        );

        let report = orchestrator.run(&request()).await.unwrap();

        assert_eq!(report.state, JobState::Failed);
        assert!(report.plan.is_none());
        assert!(report.fatal_error.unwrap().contains("no JSON array"));
        assert!(report.job_root.join("production_summary.md").exists());
    }

    #[tokio::test]
    async fn planner_error_fails_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut planner = MockPlannerPort::new();
        planner
            .expect_plan()
            .returning(|_| Err("quota exceeded".into()));
        let orchestrator = orchestrator(
            dir.path(),
            planner,
            MockRendererPort::new(),
            MockEncoderPort::new(),
        );

        let report = orchestrator.run(&request()).await.unwrap();

        assert_eq!(report.state, JobState::Failed);
        assert_eq!(
            report.fatal_error.as_deref(),
            Some("planner service failed: quota exceeded")
        );
    }

    #[tokio::test]
    async fn disabled_audio_skips_compilation() {
        let dir = tempfile::tempdir().unwrap();
        let mut encoder = MockEncoderPort::new();
        encoder.expect_encode().never();
        encoder.expect_probe_duration().never();
        let orchestrator = orchestrator(
            dir.path(),
            planner(planner_response(&[10, 10])),
            renderer(&[]),
            encoder,
        );
        let mut request = request();
        request.enable_audio = false;

        let report = orchestrator.run(&request).await.unwrap();

        assert_eq!(report.state, JobState::DegradedComplete);
        assert_eq!(report.compile_skipped.as_deref(), Some("audio generation disabled"));
        assert!(report.final_video.is_none());
        assert!(report.segments.iter().all(|s| s.image && s.narration && !s.audio));
    }

    #[tokio::test]
    async fn compile_job_rebuilds_from_saved_plan() {
        let dir = tempfile::tempdir().unwrap();
        let manifests = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = orchestrator(
            dir.path(),
            planner(planner_response(&[10, 10])),
            renderer(&[]),
            encoder(&[4.0, 5.0], manifests.clone()),
        );
        let first = orchestrator.run(&request()).await.unwrap();

        let again = orchestrator
            .compile_job(&first.job_id, &VideoProfile::default(), false)
            .await
            .unwrap();
        assert_eq!(again.state, JobState::Complete);
        assert_eq!(again.final_video, first.final_video);
        let manifests = manifests.lock().unwrap();
        assert_eq!(manifests[0], manifests[1]);

        let segments_only = orchestrator
            .compile_job(&first.job_id, &VideoProfile::default(), true)
            .await
            .unwrap();
        assert_eq!(segments_only.state, JobState::DegradedComplete);
        assert_eq!(segments_only.compiled_segments(), vec![1, 2]);
        assert!(segments_only.final_video.is_none());
        assert!(!first.final_video.unwrap().exists());
    }

    #[tokio::test]
    async fn concatenation_failure_degrades_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut encoder = MockEncoderPort::new();
        encoder.expect_probe_duration().returning(|_, _| Ok(4.0));
        encoder.expect_encode().returning(|spec, _| {
            if let EncodeSpec::Concat { .. } = spec {
                return Ok(EncodeOutcome {
                    status: Some(1),
                    stderr: "Invalid data found when processing input".into(),
                });
            }
            std::fs::write(spec.output(), b"mp4").unwrap();
            Ok(EncodeOutcome {
                status: Some(0),
                stderr: String::new(),
            })
        });
        let orchestrator = orchestrator(
            dir.path(),
            planner(planner_response(&[10, 10])),
            renderer(&[]),
            encoder,
        );

        let report = orchestrator.run(&request()).await.unwrap();

        assert_eq!(report.state, JobState::DegradedComplete);
        assert!(report.concatenation_error.is_some());
        assert_eq!(report.final_video, None);
        assert_eq!(report.compiled_segments(), vec![1, 2]);
        assert!(report.fatal_error.is_none());
        assert!(!report.job_root.join("video_list.txt").exists());
    }

    #[tokio::test]
    async fn stalled_planner_times_out_and_fails_the_job() {
        let dir = tempfile::tempdir().unwrap();

        struct Stalled;
        #[async_trait::async_trait]
        impl PlannerPort for Stalled {
            async fn plan(&self, _: &PlanRequest) -> Result<String, crate::error::PortError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }

        let mut renderer = MockRendererPort::new();
        renderer.expect_render().never();
        let orchestrator = StageOrchestrator::new(
            Arc::new(WorkspaceManager::new(dir.path())),
            Stalled,
            renderer,
            MockSpeechPort::new(),
            MockEncoderPort::new(),
            PipelineSettings {
                collaborator_timeout: Duration::from_millis(50),
                ..PipelineSettings::default()
            },
        );

        let report = orchestrator.run(&request()).await.unwrap();

        assert_eq!(report.state, JobState::Failed);
        assert!(report.plan.is_none());
        assert_eq!(
            report.fatal_error.as_deref(),
            Some("planner service timed out after 50ms")
        );
    }

    #[tokio::test]
    async fn compile_job_rejects_unknown_job() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(
            dir.path(),
            MockPlannerPort::new(),
            MockRendererPort::new(),
            MockEncoderPort::new(),
        );
        let err = orchestrator
            .compile_job("1_deadbeef_nope", &VideoProfile::default(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::UnknownJob(_)));
    }
}
