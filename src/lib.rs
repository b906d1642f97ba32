//! # Policy Committee
//!
//! A simulated monetary-policy committee. Three members, a chair and a
//! secretary deliberate over a shared blackboard of numbered facts and
//! uncertainties, then vote on a rate move.
//!
//! ## Features
//!
//! - **Citation-grounded**: every speech and vote cites blackboard IDs, and unknown IDs are flagged
//! - **Engine-side tally**: the vote count is computed from recorded votes, never generated
//! - **Resumable runs**: each artifact is cached, so a rerun only fills what is missing
//! - **Auditable**: every prompt and reply is appended to a per-run log
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use policy_committee::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load(None)?;
//!     let orchestrator = Arc::new(MeetingOrchestrator::from_settings(&settings)?);
//!
//!     let registry = JobRegistry::new();
//!     let id = orchestrator.spawn_job(&registry, MeetingRequest::new("2024-09"));
//!     let job = registry.wait(id).await?;
//!     println!("{:?}", job.status);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod background;
pub mod chat;
pub mod config;
pub mod error;
pub mod json;
pub mod llm_client;
pub mod meeting;
pub mod orchestrator;
pub mod prompts;
pub mod retry;
pub mod storage;
pub mod tracing_ext;
pub mod types;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use background::{JobLog, JobRegistry, JobSnapshot, JobStatus};
pub use chat::{ChatClient, CompletionRequest, CompletionResponse, Message, MessageRole};
pub use config::{GenerationConfig, Settings, SimulationSettings};
pub use error::{Error, Result};
pub use llm_client::LlmClient;
pub use meeting::{Blackboard, Role, SourceKind, VoteTally};
pub use orchestrator::{MeetingOrchestrator, MeetingOutcome, MeetingPhase, MeetingRequest};
pub use prompts::{PromptStore, PromptVars};
pub use storage::{ArtifactEntry, ArtifactFormat, MeetingRun, RunStore};
pub use types::{JobId, PromptIdentity};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::background::{JobLog, JobRegistry, JobStatus};
    pub use crate::config::Settings;
    pub use crate::error::{Error, Result};
    pub use crate::llm_client::LlmClient;
    pub use crate::meeting::{Role, SourceKind};
    pub use crate::orchestrator::{MeetingOrchestrator, MeetingOutcome, MeetingRequest};
    pub use crate::types::*;
}
