//! Domain layer - Pure business logic and the job workspace.

pub mod jobs;
pub mod media;
pub mod narration;
pub mod plan;
pub mod summary;
pub mod workspace;
