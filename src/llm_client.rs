//! The text-generation capability as seen by the committee

use crate::chat::{CompletionRequest, CompletionResponse};
use crate::error::Result;
use async_trait::async_trait;

/// Opaque request/response text generation.
///
/// Implementations own transport concerns (timeouts, transient retries);
/// callers only see a finished completion or a terminal error.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a completion request
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Get the client type for debugging/logging
    fn client_type(&self) -> &str;

    /// Get the endpoint the client talks to
    fn endpoint(&self) -> &str;
}
