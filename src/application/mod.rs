//! Application layer - Generic services that use ports.

pub mod compiler;
pub mod orchestrator;
pub mod runners;
