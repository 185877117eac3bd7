//! Local adapters: subprocess encoder and filesystem publishing.

pub mod ffmpeg;
pub mod fs;

pub use ffmpeg::FfmpegEncoder;
pub use fs::FsAdapter;
