//! Records produced during a meeting
//!
//! Every record is built once from generator output, validated, and then
//! persisted as part of an artifact. Soft failures live on the record itself
//! (`citation_error`, `invalid_vote_reason`, `dropped_views`).

use crate::meeting::roles::Role;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A stance-card reason tied to a fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitedReason {
    /// Cited fact ID
    pub fact_id: String,
    /// Why it matters
    pub reason: String,
}

/// A stance-card risk tied to an uncertainty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitedRisk {
    /// Cited uncertainty ID
    pub uncertainty_id: String,
    /// What could go wrong
    pub risk: String,
}

/// A role's private position before discussion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StanceCard {
    /// Owner
    pub role: Role,
    /// Preferred move, always inside the allowed set
    pub preferred_delta_bps: i32,
    /// Supporting reasons
    #[serde(default)]
    pub top_reasons: Vec<CitedReason>,
    /// Main risks
    #[serde(default)]
    pub key_risks: Vec<CitedRisk>,
    /// Compromises the role could live with
    #[serde(default)]
    pub acceptable_compromises: Vec<String>,
    /// Questions the role wants answered
    #[serde(default)]
    pub questions_to_ask: Vec<String>,
    /// Position in one sentence
    #[serde(default)]
    pub one_sentence_position: String,
    /// Set when a reason or risk cites an unknown ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_error: Option<String>,
}

/// Stance cards keyed by role, iterated in speaking order
pub type StanceCards = BTreeMap<Role, StanceCard>;

/// Public discussion round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechPhase {
    /// Opening statements
    OpeningStatements,
    /// Chair-directed questions and answers
    DirectedQa,
}

impl SpeechPhase {
    /// Identifier used in prompts and artifacts
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpeningStatements => "opening_statements",
            Self::DirectedQa => "directed_qa",
        }
    }
}

impl fmt::Display for SpeechPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A public statement by one role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speech {
    /// Speaker
    pub role: Role,
    /// Round the speech belongs to
    pub phase: SpeechPhase,
    /// Markdown body
    pub speech_md: String,
    /// Cited fact IDs
    #[serde(default)]
    pub cited_facts: Vec<String>,
    /// Cited uncertainty IDs
    #[serde(default)]
    pub cited_uncertainties: Vec<String>,
    /// Follow-up question (opening statements only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask_one_question: Option<String>,
    /// Chair question being answered (directed Q&A only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    /// Set when a citation does not resolve
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_error: Option<String>,
}

/// A question the chair puts to one role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectedQuestion {
    /// Addressee
    pub to_role: Role,
    /// Question text
    pub question: String,
}

/// The chair's cross-examination plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChairQuestionSet {
    /// Chair's opening remarks
    pub chair_preface_md: String,
    /// Questions in asking order
    pub directed_questions: Vec<DirectedQuestion>,
    /// Whether any question came from the round-robin fallback
    #[serde(default)]
    pub fallback_used: bool,
}

/// Tone of a policy package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageStance {
    /// Leaning toward tighter policy
    Hawkish,
    /// Balanced
    Neutral,
    /// Leaning toward easier policy
    Dovish,
}

impl PackageStance {
    /// Parse a stance, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "hawkish" => Some(Self::Hawkish),
            "neutral" => Some(Self::Neutral),
            "dovish" => Some(Self::Dovish),
            _ => None,
        }
    }

    /// Lowercase identifier
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hawkish => "hawkish",
            Self::Neutral => "neutral",
            Self::Dovish => "dovish",
        }
    }
}

/// A chair-proposed rate action with tone and guidance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyPackage {
    /// Package key, e.g. `A`
    pub key: String,
    /// Rate move, always on the policy menu
    pub delta_bps: i32,
    /// Tone
    pub stance: PackageStance,
    /// Forward-guidance text
    pub guidance: String,
}

/// Packages put to the vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSet {
    /// Chair's transition remarks
    pub chair_transition_md: String,
    /// One to three packages
    pub packages: Vec<PolicyPackage>,
}

/// A role's view of one package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageView {
    /// Preferred
    Support,
    /// Could live with it
    Acceptable,
    /// Against
    Oppose,
}

impl PackageView {
    /// Parse a view, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "support" => Some(Self::Support),
            "acceptable" => Some(Self::Acceptable),
            "oppose" => Some(Self::Oppose),
            _ => None,
        }
    }

    /// Lowercase identifier
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Support => "support",
            Self::Acceptable => "acceptable",
            Self::Oppose => "oppose",
        }
    }
}

/// One validated package view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageViewEntry {
    /// Package the view is about
    pub package_key: String,
    /// The view
    pub view: PackageView,
    /// Justification
    pub because: String,
    /// Cited fact IDs, all valid
    #[serde(default)]
    pub cited_facts: Vec<String>,
}

/// A view removed during validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedView {
    /// Package key as generated
    pub package_key: String,
    /// Why it was removed
    pub reason: String,
}

/// A role's views on the proposed packages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagePreference {
    /// Owner
    pub role: Role,
    /// At most one view per package
    pub package_views: Vec<PackageViewEntry>,
    /// Views that failed validation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped_views: Vec<DroppedView>,
}

/// A role's formal vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Voter
    pub role: Role,
    /// Rate move, always inside the allowed set
    pub vote_delta_bps: i32,
    /// Package the voter chose, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chosen_package_key: Option<String>,
    /// Reason for the vote
    pub reason: String,
    /// Cited fact IDs
    #[serde(default)]
    pub cited_facts: Vec<String>,
    /// Cited uncertainty IDs
    #[serde(default)]
    pub cited_uncertainties: Vec<String>,
    /// Whether the voter dissents
    #[serde(default)]
    pub dissent: bool,
    /// Dissent statement
    #[serde(default)]
    pub dissent_sentence: String,
    /// Set when the generated delta was coerced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_vote_reason: Option<String>,
    /// Set when a citation does not resolve
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_error: Option<String>,
}

/// Secretary note for one statement slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotNote {
    /// Slot key as generated
    pub slot_key: String,
    /// Note text
    pub note: String,
}

/// Secretary's condensation of one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSummary {
    /// Round summarised
    pub round: SpeechPhase,
    /// Points of agreement
    pub consensus: Vec<String>,
    /// Points of disagreement
    pub disagreements: Vec<String>,
    /// Questions for the next round
    pub open_questions_next: Vec<String>,
    /// Drafting notes per statement slot
    pub statement_slot_notes: Vec<SlotNote>,
}

/// Engine-computed vote count
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    /// Votes below zero
    pub cut: usize,
    /// Votes at zero
    pub hold: usize,
    /// Votes above zero
    pub hike: usize,
    /// Votes with no readable delta
    pub unknown: usize,
}

impl VoteTally {
    /// Bucket raw deltas; `None` counts as unknown
    pub fn from_deltas<I>(deltas: I) -> Self
    where
        I: IntoIterator<Item = Option<i32>>,
    {
        let mut tally = Self::default();
        for delta in deltas {
            match delta {
                None => tally.unknown += 1,
                Some(d) if d < 0 => tally.cut += 1,
                Some(0) => tally.hold += 1,
                Some(_) => tally.hike += 1,
            }
        }
        tally
    }

    /// Tally recorded votes
    pub fn from_votes(votes: &[Vote]) -> Self {
        Self::from_deltas(votes.iter().map(|v| Some(v.vote_delta_bps)))
    }

    /// Number of votes counted
    pub fn total(&self) -> usize {
        self.cut + self.hold + self.hike + self.unknown
    }

    /// Size of the largest bucket
    pub fn passed(&self) -> usize {
        self.cut.max(self.hold).max(self.hike)
    }

    /// `"passed:dissent"`, e.g. `2:1`
    pub fn summary(&self) -> String {
        let passed = self.passed();
        format!("{}:{}", passed, self.total() - passed)
    }
}

/// Final decision documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionDrafts {
    /// Policy statement
    pub statement_md: String,
    /// Minutes summary
    pub minutes_summary_md: String,
}

/// Everything said in the two public rounds; the `round_summaries` artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionRecord {
    /// Secretary summaries, one per round
    pub rounds: Vec<RoundSummary>,
    /// Opening statements in speaking order
    pub opening_speeches: Vec<Speech>,
    /// Deduplicated follow-up question pool
    pub open_questions: Vec<String>,
    /// Chair's cross-examination plan
    pub chair_questions: ChairQuestionSet,
    /// Answers, one per directed question
    pub qa_speeches: Vec<Speech>,
}

/// Package views and votes; the `votes` artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    /// Formal votes in speaking order
    pub votes: Vec<Vote>,
    /// Package views in speaking order
    pub package_preferences: Vec<PackagePreference>,
}
