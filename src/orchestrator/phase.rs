//! Meeting phases and their strict ordering

use crate::background::JobLog;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of a meeting run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MeetingPhase {
    /// Build or load the blackboard, decide crisis mode
    #[serde(rename = "INIT")]
    Init,
    /// Stance cards and opening statements
    #[serde(rename = "OPENING")]
    Opening,
    /// Secretary summary of the openings
    #[serde(rename = "ROUND_SUMMARY_1")]
    RoundSummary1,
    /// Chair questions and answers
    #[serde(rename = "DIRECTED_QA")]
    DirectedQa,
    /// Secretary summary of the Q&A
    #[serde(rename = "ROUND_SUMMARY_2")]
    RoundSummary2,
    /// Packages, package views and votes
    #[serde(rename = "PACKAGES_AND_VOTES")]
    PackagesAndVotes,
    /// Statement and minutes
    #[serde(rename = "DECISION")]
    Decision,
    /// Transcript rendering
    #[serde(rename = "RENDER")]
    Render,
    /// Artifact and context writes
    #[serde(rename = "PERSIST")]
    Persist,
    /// Done
    #[serde(rename = "COMPLETE")]
    Complete,
}

impl MeetingPhase {
    /// Every phase in execution order
    pub const ORDER: [MeetingPhase; 10] = [
        Self::Init,
        Self::Opening,
        Self::RoundSummary1,
        Self::DirectedQa,
        Self::RoundSummary2,
        Self::PackagesAndVotes,
        Self::Decision,
        Self::Render,
        Self::Persist,
        Self::Complete,
    ];

    /// Upper-case name used in logs
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Opening => "OPENING",
            Self::RoundSummary1 => "ROUND_SUMMARY_1",
            Self::DirectedQa => "DIRECTED_QA",
            Self::RoundSummary2 => "ROUND_SUMMARY_2",
            Self::PackagesAndVotes => "PACKAGES_AND_VOTES",
            Self::Decision => "DECISION",
            Self::Render => "RENDER",
            Self::Persist => "PERSIST",
            Self::Complete => "COMPLETE",
        }
    }

    /// The phase that follows, `None` after `Complete`
    pub fn next(self) -> Option<Self> {
        let idx = Self::ORDER.iter().position(|p| *p == self)?;
        Self::ORDER.get(idx + 1).copied()
    }
}

impl fmt::Display for MeetingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Walks a run through the phases, one step at a time
#[derive(Debug)]
pub struct PhaseTracker {
    meeting_id: String,
    current: MeetingPhase,
}

impl PhaseTracker {
    /// Start at `Init`
    pub fn new(meeting_id: impl Into<String>) -> Self {
        Self {
            meeting_id: meeting_id.into(),
            current: MeetingPhase::Init,
        }
    }

    /// Current phase
    pub fn current(&self) -> MeetingPhase {
        self.current
    }

    /// Move to `to`, which must be the next phase
    pub fn advance(&mut self, to: MeetingPhase, log: &JobLog) -> Result<()> {
        if self.current.next() != Some(to) {
            return Err(Error::other(format!(
                "[{}] illegal phase transition {} -> {}",
                self.meeting_id, self.current, to
            )));
        }
        self.current = to;
        log.line(format!("[{}] phase {}", self.meeting_id, to));
        Ok(())
    }
}
