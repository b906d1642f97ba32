//! Orchestrator module - sequencing and caching of meeting runs
//!
//! A run walks a fixed phase sequence. Each artifact is checkpointed as soon
//! as it exists, so an interrupted run resumes from the first missing one.
//!
//! # Phases
//!
//! - **INIT**: build or load the blackboard, decide crisis mode
//! - **OPENING**: private stance cards, then opening statements
//! - **ROUND_SUMMARY_1 / ROUND_SUMMARY_2**: secretary summaries
//! - **DIRECTED_QA**: chair questions and answers
//! - **PACKAGES_AND_VOTES**: packages, package views, votes
//! - **DECISION / RENDER / PERSIST**: statement, transcript, context
//!
//! # Example
//!
//! ```rust,ignore
//! use policy_committee::orchestrator::{MeetingOrchestrator, MeetingRequest};
//!
//! let orchestrator = MeetingOrchestrator::from_settings(&settings)?;
//! let outcome = orchestrator.run(&MeetingRequest::new("2024-09"), &JobLog::detached()).await?;
//! println!("decision passed {}", outcome.vote_summary);
//! ```

pub mod meeting;
pub mod phase;

// Re-exports
pub use meeting::{
    import_material, open_question_pool, MeetingOrchestrator, MeetingOutcome, MeetingRequest,
    ARTIFACTS,
};
pub use phase::{MeetingPhase, PhaseTracker};
