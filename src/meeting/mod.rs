//! Committee deliberation domain
//!
//! Agents and records for one simulated meeting. Everything here reads a
//! single immutable [`Blackboard`]; sequencing and persistence live in
//! [`crate::orchestrator`].

pub mod blackboard;
pub mod chair;
pub mod citations;
pub mod generation;
pub mod records;
pub mod role_agent;
pub mod roles;
pub mod secretary;
pub mod transcript;

pub use blackboard::{
    infer_crisis_mode, Blackboard, BlackboardBuilder, BriefingMaterials, CrisisClassifier,
    KeywordClassifier, SourceKind,
};
pub use chair::{ChairAgent, PublishedDrafts};
pub use citations::{validate, CitationCheck};
pub use generation::{MeetingGenerator, Sampling};
pub use records::{
    ChairQuestionSet, DecisionDrafts, DiscussionRecord, PackagePreference, PackageSet,
    PolicyPackage, RoundSummary, Speech, SpeechPhase, StanceCard, StanceCards, Vote, VoteRecord,
    VoteTally,
};
pub use role_agent::RoleAgent;
pub use roles::{allowed_deltas, Role, RoleProfile};
pub use secretary::Secretary;
pub use transcript::Transcript;
