//! Transcript Renderer
//!
//! Pure templating over recorded artifacts. Rendering the same records
//! always yields the same text, so a transcript can be rebuilt from cache.

use crate::meeting::blackboard::Blackboard;
use crate::meeting::records::{DiscussionRecord, PackageSet, Speech, StanceCards, VoteRecord};

/// Everything the transcript is rendered from
pub struct Transcript<'a> {
    /// Shared ledger
    pub blackboard: &'a Blackboard,
    /// Run-wide crisis flag
    pub crisis_mode: bool,
    /// Private stances; only their deltas are shown
    pub stance_cards: &'a StanceCards,
    /// Both public rounds
    pub discussion: &'a DiscussionRecord,
    /// Packages put to the vote
    pub packages: &'a PackageSet,
    /// Package views and votes
    pub votes: &'a VoteRecord,
}

fn speaker(role: impl std::fmt::Display) -> String {
    role.to_string().to_uppercase()
}

fn speech_block(speech: &Speech) -> String {
    let mut cites = Vec::new();
    if !speech.cited_facts.is_empty() {
        cites.push(format!("facts: {}", speech.cited_facts.join(", ")));
    }
    if !speech.cited_uncertainties.is_empty() {
        cites.push(format!("uncertainties: {}", speech.cited_uncertainties.join(", ")));
    }
    let footer = if cites.is_empty() {
        String::new()
    } else {
        format!("\n\n> Cited: {}", cites.join(" · "))
    };
    format!("**{}**:\n\n{}{}\n", speaker(speech.role), speech.speech_md.trim(), footer)
}

impl Transcript<'_> {
    /// Render the full Markdown transcript
    pub fn render(&self) -> String {
        let bb = self.blackboard;
        let mut lines: Vec<String> = Vec::new();

        lines.push("# Committee Discussion Transcript (Simulated)\n".to_string());
        lines.push(format!("Meeting: {}\n", bb.meeting_id));
        lines.push(format!("- crisis_mode: `{}`\n", self.crisis_mode));
        lines.push(String::new());

        lines.push("## Blackboard facts\n".to_string());
        for fact in &bb.facts {
            lines.push(format!("- `{}` [{}] {}", fact.id, fact.source, fact.text));
        }
        lines.push(String::new());
        lines.push("## Key uncertainties\n".to_string());
        for unc in &bb.uncertainties {
            lines.push(format!("- `{}` {}", unc.id, unc.text));
        }
        lines.push(String::new());
        lines.push("## Policy menu\n".to_string());
        for option in &bb.policy_menu {
            lines.push(format!("- `{}`: {} ({}bp)", option.key, option.label, option.delta_bps));
        }
        lines.push(String::new());

        lines.push("## Phase 1: Stance cards (private, not part of the record)\n".to_string());
        for (role, card) in self.stance_cards {
            lines.push(format!("- {}: preferred_delta_bps={}", role, card.preferred_delta_bps));
        }
        lines.push(String::new());

        lines.push("## Phase 2: Opening statements\n".to_string());
        for speech in &self.discussion.opening_speeches {
            lines.push(speech_block(speech));
            if let Some(q) = &speech.ask_one_question {
                lines.push(format!("> Question: {}\n", q));
            }
        }
        lines.push(String::new());

        lines.push("## Phase 3: Directed questions\n".to_string());
        let chair = &self.discussion.chair_questions;
        if !chair.chair_preface_md.trim().is_empty() {
            lines.push(format!("**CHAIR**:\n\n{}\n", chair.chair_preface_md.trim()));
        }
        for (idx, dq) in chair.directed_questions.iter().enumerate() {
            lines.push(format!("**CHAIR** to `{}`: {}\n", dq.to_role, dq.question));
            match self.discussion.qa_speeches.get(idx) {
                Some(answer) => lines.push(speech_block(answer)),
                None => lines.push("> (no answer recorded)\n".to_string()),
            }
        }
        lines.push(String::new());

        lines.push("## Phase 4: Policy packages and vote\n".to_string());
        if !self.packages.chair_transition_md.trim().is_empty() {
            lines.push(format!("**CHAIR**:\n\n{}\n", self.packages.chair_transition_md.trim()));
        }
        lines.push("### Packages proposed by the chair\n".to_string());
        for p in &self.packages.packages {
            lines.push(format!(
                "- Package {}: delta_bps={} · {} · {}",
                p.key,
                p.delta_bps,
                p.stance.as_str(),
                p.guidance
            ));
        }
        lines.push(String::new());

        lines.push("### Views on the packages\n".to_string());
        for pref in &self.votes.package_preferences {
            if pref.package_views.is_empty() {
                continue;
            }
            lines.push(format!("**{}**:", speaker(pref.role)));
            for view in &pref.package_views {
                lines.push(format!(
                    "- {}: {} · {} (cites {})",
                    view.package_key,
                    view.view.as_str(),
                    view.because,
                    view.cited_facts.join(", ")
                ));
            }
            lines.push(String::new());
        }

        lines.push("### Formal vote\n".to_string());
        for vote in &self.votes.votes {
            lines.push(format!(
                "- **{}**: {}bp · {} (facts: {} | uncertainties: {})",
                speaker(vote.role),
                vote.vote_delta_bps,
                vote.reason,
                vote.cited_facts.join(", "),
                vote.cited_uncertainties.join(", ")
            ));
            if vote.dissent && !vote.dissent_sentence.is_empty() {
                lines.push(format!("  - Dissent: {}", vote.dissent_sentence));
            }
        }
        lines.push(String::new());

        format!("{}\n", lines.join("\n").trim())
    }
}
