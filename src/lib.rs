//! Explainer - Text to explainer video pipeline
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (plan, media profile, jobs, workspace)
//! - ports/: Trait definitions (planner, renderer, speech, encoder, storage)
//! - adapters/: Concrete implementations (Gemini, infographic + Chromium, TTS, ffmpeg, fs, S3)
//! - application/: Generic services (runners, media compiler, stage orchestrator)
//! - config: Environment configuration
//!
//! # Features
//! - `s3`: publish finished videos to DigitalOcean Spaces

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod ports;


pub use application::orchestrator::{PipelineSettings, StageOrchestrator};
pub use config::AppConfig;
pub use domain::jobs::{GenerateRequest, JobReport, JobState};
