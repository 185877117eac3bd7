//! Ports - Capabilities the pipeline needs from the outside world.

pub mod encoder;
pub mod planner;
pub mod renderer;
pub mod speech;
pub mod storage;
