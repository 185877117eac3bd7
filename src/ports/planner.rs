use crate::domain::plan::PlanRequest;
use crate::error::PortError;
use async_trait::async_trait;

/// Generative planner: returns its raw text answer, to be recovered locally.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlannerPort: Send + Sync {
    async fn plan(&self, request: &PlanRequest) -> Result<String, PortError>;
}
