use async_trait::async_trait;

use crate::errors::PilotResult;
use crate::llm::types::ChatMessage;

/// Seam to the vision-capable reasoning backend. The orchestration loop only
/// ever sees this trait, so tests can script responses without a network.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Submits one assembled message sequence and returns the raw response
    /// text. Retry policy lives behind this call; the caller treats an error
    /// as fatal for the iteration.
    async fn complete(&self, messages: Vec<ChatMessage>) -> PilotResult<String>;
}
