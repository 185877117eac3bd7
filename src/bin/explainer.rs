//! Explainer CLI - Generate, recompile and manage explainer video jobs.

use clap::{Args, Parser, Subcommand, ValueEnum};
use explainer::adapters::default_orchestrator;
use explainer::config::SpeechBackend;
use explainer::domain::jobs::SpeechOptions;
use explainer::domain::media::{Resolution, VideoProfile};
use explainer::domain::workspace::WorkspaceManager;
use explainer::{logging, AppConfig, GenerateRequest, JobReport, JobState};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, error};

#[derive(Parser)]
#[command(name = "explainer", version, about = "Turn a block of text into a narrated explainer video")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline on some text
    Generate(GenerateArgs),
    /// Re-run the compile stage of an existing job directory
    Compile(CompileArgs),
    /// Inspect or prune the output directory
    Jobs {
        #[command(subcommand)]
        command: JobsCommand,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TtsService {
    Gtts,
    /// Needs AZURE_SPEECH_KEY and AZURE_SPEECH_REGION
    Azure,
}

impl From<TtsService> for SpeechBackend {
    fn from(service: TtsService) -> Self {
        match service {
            TtsService::Gtts => SpeechBackend::Gtts,
            TtsService::Azure => SpeechBackend::Azure,
        }
    }
}

#[derive(Args)]
struct GenerateArgs {
    /// Source text; read from --file or stdin when omitted
    #[arg(long, conflicts_with = "file")]
    text: Option<String>,
    #[arg(long)]
    file: Option<PathBuf>,
    /// Target duration in seconds
    #[arg(long, default_value_t = 60)]
    duration: u32,
    /// Number of segments (derived from the duration when omitted)
    #[arg(long)]
    segments: Option<u32>,
    /// Skip speech synthesis (and therefore compilation)
    #[arg(long)]
    no_tts: bool,
    /// Overrides TTS_SERVICE
    #[arg(long, value_enum)]
    tts_service: Option<TtsService>,
    #[arg(long, default_value = "en")]
    lang: String,
    /// Azure voice name, e.g. en-US-AriaNeural
    #[arg(long)]
    voice: Option<String>,
    /// Produce assets only, no video
    #[arg(long)]
    no_video: bool,
    #[command(flatten)]
    video: VideoArgs,
    /// Overrides OUTPUT_DIR
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Short topic used in the job directory name
    #[arg(long)]
    topic: Option<String>,
    /// Print the full report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct VideoArgs {
    #[arg(long, default_value = "720p", value_parser = parse_resolution)]
    resolution: Resolution,
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..=120))]
    fps: u32,
}

impl VideoArgs {
    fn profile(&self) -> VideoProfile {
        VideoProfile::new(self.resolution, self.fps)
    }
}

#[derive(Args)]
struct CompileArgs {
    job_dir: PathBuf,
    /// Rebuild the clips without concatenating them
    #[arg(long)]
    segments_only: bool,
    #[command(flatten)]
    video: VideoArgs,
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum JobsCommand {
    /// Most recent jobs first
    List {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Delete all but the newest `keep` jobs
    Cleanup {
        #[arg(long, default_value_t = 20)]
        keep: usize,
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

fn parse_resolution(s: &str) -> Result<Resolution, String> {
    s.parse()
}

#[tokio::main]
async fn main() {
    logging::init();
    let cli = Cli::parse();
    let config = AppConfig::from_env();

    let code = match cli.command {
        Command::Generate(args) => generate(&config, args).await,
        Command::Compile(args) => compile(&config, args).await,
        Command::Jobs { command } => jobs(&config, command).await,
    };
    process::exit(code);
}

async fn generate(config: &AppConfig, args: GenerateArgs) -> i32 {
    let text = match read_text(&args).await {
        Ok(text) => text,
        Err(e) => {
            eprintln!("{}", e);
            return 2;
        }
    };

    let config = AppConfig {
        tts_service: args
            .tts_service
            .map(SpeechBackend::from)
            .unwrap_or(config.tts_service),
        ..config.clone()
    };
    debug!(service = ?config.tts_service, "speech synthesis service");
    let mut speech = SpeechOptions {
        lang: args.lang.clone(),
        ..SpeechOptions::default()
    };
    if let Some(voice) = args.voice.clone() {
        speech.voice = voice;
    }

    let request = GenerateRequest {
        target_duration: args.duration,
        segments_count: args.segments,
        enable_audio: !args.no_tts,
        speech,
        compile_video: !args.no_video,
        profile: args.video.profile(),
        topic_hint: args.topic.clone(),
        ..GenerateRequest::new(text)
    };

    let root = args.output_dir.clone().unwrap_or_else(|| config.output_dir.clone());
    let orchestrator = default_orchestrator(&config, Arc::new(WorkspaceManager::new(root)));

    match orchestrator.run(&request).await {
        Ok(report) => {
            print_report(&report, args.json);
            exit_code(&report)
        }
        Err(e) => {
            error!(error = %e, "job could not be started");
            eprintln!("Failed: {}", e);
            1
        }
    }
}

async fn compile(config: &AppConfig, args: CompileArgs) -> i32 {
    let job_dir = args.job_dir.clone();
    let parent = job_dir
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let workspace = Arc::new(WorkspaceManager::new(parent));

    let job_id = match workspace.adopt(&job_dir).await {
        Ok(id) => id,
        Err(e) => {
            eprintln!("Cannot use {}: {}", job_dir.display(), e);
            return 1;
        }
    };

    let orchestrator = default_orchestrator(config, workspace);
    match orchestrator
        .compile_job(&job_id, &args.video.profile(), args.segments_only)
        .await
    {
        Ok(report) => {
            print_report(&report, args.json);
            exit_code(&report)
        }
        Err(e) => {
            eprintln!("Failed: {}", e);
            1
        }
    }
}

async fn jobs(config: &AppConfig, command: JobsCommand) -> i32 {
    match command {
        JobsCommand::List { limit, output_dir } => {
            let workspace = WorkspaceManager::new(output_dir.unwrap_or_else(|| config.output_dir.clone()));
            match workspace.list_jobs(limit).await {
                Ok(entries) if entries.is_empty() => {
                    println!("No jobs under {}", workspace.root().display());
                    0
                }
                Ok(entries) => {
                    for entry in entries {
                        println!("{}  {}", entry.job_id, entry.root.display());
                    }
                    0
                }
                Err(e) => {
                    eprintln!("{}", e);
                    1
                }
            }
        }
        JobsCommand::Cleanup { keep, output_dir } => {
            let workspace = WorkspaceManager::new(output_dir.unwrap_or_else(|| config.output_dir.clone()));
            match workspace.cleanup(keep).await {
                Ok(removed) => {
                    println!("Removed {} job(s), kept the newest {}", removed, keep);
                    0
                }
                Err(e) => {
                    eprintln!("{}", e);
                    1
                }
            }
        }
    }
}

async fn read_text(args: &GenerateArgs) -> Result<String, String> {
    let text = if let Some(text) = &args.text {
        text.clone()
    } else if let Some(file) = &args.file {
        tokio::fs::read_to_string(file)
            .await
            .map_err(|e| format!("Cannot read {}: {}", file.display(), e))?
    } else {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .map_err(|e| format!("Cannot read stdin: {}", e))?;
        buf
    };

    if text.trim().is_empty() {
        return Err("No input text (use --text, --file or pipe it on stdin)".to_string());
    }
    Ok(text)
}

fn exit_code(report: &JobReport) -> i32 {
    if report.state == JobState::Failed {
        1
    } else {
        0
    }
}

fn print_report(report: &JobReport, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(out) => println!("{}", out),
            Err(e) => eprintln!("Cannot serialize report: {}", e),
        }
        return;
    }

    println!("Job:    {}", report.job_id);
    println!("State:  {}", report.state);
    println!("Folder: {}", report.job_root.display());
    if let Some(cause) = &report.fatal_error {
        println!("Cause:  {}", cause);
    }
    if !report.segments.is_empty() {
        println!(
            "Clips:  {}/{}",
            report.compiled_segments().len(),
            report.segments.len()
        );
    }
    for err in &report.asset_errors {
        println!("  asset:   {}", err);
    }
    for err in &report.compile_errors {
        println!("  compile: {}", err);
    }
    if let Some(err) = &report.concatenation_error {
        println!("  concat:  {}", err);
    }
    match (&report.final_video, report.total_duration) {
        (Some(video), Some(duration)) => println!("Video:  {} ({:.1}s)", video.display(), duration),
        (Some(video), None) => println!("Video:  {}", video.display()),
        (None, _) => {
            if let Some(reason) = &report.compile_skipped {
                println!("Video:  not created ({})", reason);
            }
        }
    }
    if let Some(summary) = &report.summary {
        println!("Summary: {}", summary.display());
    }
}
