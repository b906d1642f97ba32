//! Secretary: bounded summaries of each public round

use crate::error::Result;
use crate::json::{self, Object};
use crate::meeting::blackboard::Blackboard;
use crate::meeting::generation::{templates, MeetingGenerator, Sampling};
use crate::meeting::records::{RoundSummary, SlotNote, Speech, SpeechPhase};
use crate::prompts::PromptVars;

/// Cap on consensus, disagreement and open-question items
pub const MAX_ITEMS: usize = 10;

/// Cap on statement-slot notes
pub const MAX_SLOT_NOTES: usize = 16;

/// Round summariser bound to a meeting
pub struct Secretary<'a> {
    generator: &'a MeetingGenerator,
    blackboard_json: String,
}

impl<'a> Secretary<'a> {
    /// Bind the secretary to a meeting
    pub fn new(generator: &'a MeetingGenerator, blackboard: &Blackboard) -> Result<Self> {
        Ok(Self {
            generator,
            blackboard_json: serde_json::to_string(blackboard)?,
        })
    }

    /// Summarise one round from its speeches
    pub async fn summarize_round(&self, round: SpeechPhase, speeches: &[Speech]) -> Result<RoundSummary> {
        let vars = PromptVars::new()
            .set("round_name", round)
            .set("blackboard_json", &self.blackboard_json)
            .set_json("transcript_blocks_json", speeches)?;
        let obj = self
            .generator
            .generate_json("secretary", templates::SECRETARY_ROUND, &vars, Sampling::SECRETARY)
            .await?;
        Ok(parse_round_summary(round, &obj))
    }
}

fn items(obj: &Object, key: &str) -> Vec<String> {
    json::string_list(obj.get(key))
        .iter()
        .map(|s| json::normalize_ws(s))
        .take(MAX_ITEMS)
        .collect()
}

/// Bound a generated summary
pub fn parse_round_summary(round: SpeechPhase, obj: &Object) -> RoundSummary {
    let statement_slot_notes = json::list(obj.get("statement_slot_notes"))
        .into_iter()
        .filter(|item| item.is_object())
        .filter_map(|item| {
            let slot_key = json::text(item.get("slot_key"));
            let note = json::normalize_ws(&json::text(item.get("note")));
            (!slot_key.is_empty() && !note.is_empty()).then_some(SlotNote { slot_key, note })
        })
        .take(MAX_SLOT_NOTES)
        .collect();

    RoundSummary {
        round,
        consensus: items(obj, "consensus"),
        disagreements: items(obj, "disagreements"),
        open_questions_next: items(obj, "open_questions_next"),
        statement_slot_notes,
    }
}
