//! Chair Agent: directed questions, policy packages, statement and minutes
//!
//! The chair is the only agent that sees every stance card. Its outputs are
//! clamped to engine rules: questions fall back to a deterministic
//! round-robin, packages must sit on the policy menu, and the final drafts
//! are written against a vote tally the engine computes itself.

use crate::error::Result;
use crate::json::{self, Object};
use crate::meeting::blackboard::Blackboard;
use crate::meeting::generation::{templates, MeetingGenerator, Sampling};
use crate::meeting::records::{
    ChairQuestionSet, DecisionDrafts, DirectedQuestion, PackageSet, PackageStance, PolicyPackage,
    RoundSummary, StanceCards, Vote, VoteTally,
};
use crate::meeting::roles::Role;
use crate::prompts::PromptVars;
use std::collections::{BTreeSet, HashSet};

/// Fewest directed questions the chair may ask
pub const MIN_QUESTIONS: usize = 3;

/// Most directed questions the chair may ask
pub const MAX_QUESTIONS: usize = 6;

/// Most packages the chair may propose
pub const MAX_PACKAGES: usize = 3;

/// Open questions shown to the chair
const OPEN_QUESTIONS_IN_PROMPT: usize = 12;

/// Guidance of the package used when no proposal validates
pub const FALLBACK_GUIDANCE: &str =
    "The Committee will continue to assess the implications of incoming data for the outlook.";

const STATEMENT_HEADING: &str = "# FOMC Statement (Simulated)";
const MINUTES_HEADING: &str = "# Minutes Summary (Simulated)";

const PUBLISHED_STATEMENT: &str = "The statement below is already published. \
    Keep `statement_md` identical to it and the minutes consistent with it.\n\n";
const PUBLISHED_MINUTES: &str = "The minutes summary below is already published. \
    Keep `minutes_summary_md` identical to it and the statement consistent with it.\n\n";

/// Drafts already persisted for a meeting.
///
/// The chair writes around them: a published text is shown to the generator
/// and returned unchanged in place of whatever it produces.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishedDrafts<'a> {
    /// Persisted statement
    pub statement_md: Option<&'a str>,
    /// Persisted minutes summary
    pub minutes_summary_md: Option<&'a str>,
}

impl PublishedDrafts<'_> {
    fn prompt_block(&self) -> String {
        let mut block = String::new();
        if let Some(statement) = self.statement_md {
            block.push_str(PUBLISHED_STATEMENT);
            block.push_str(statement.trim());
            block.push('\n');
        }
        if let Some(minutes) = self.minutes_summary_md {
            if !block.is_empty() {
                block.push('\n');
            }
            block.push_str(PUBLISHED_MINUTES);
            block.push_str(minutes.trim());
            block.push('\n');
        }
        if block.is_empty() {
            block.push_str("Nothing has been published yet.\n");
        }
        block
    }
}

/// The committee chair bound to a meeting
pub struct ChairAgent<'a> {
    generator: &'a MeetingGenerator,
    blackboard: &'a Blackboard,
    blackboard_json: String,
    max_questions: usize,
}

impl<'a> ChairAgent<'a> {
    /// Bind the chair to a meeting; `max_questions` is clamped to
    /// [`MIN_QUESTIONS`]..=[`MAX_QUESTIONS`]
    pub fn new(
        generator: &'a MeetingGenerator,
        blackboard: &'a Blackboard,
        max_questions: usize,
    ) -> Result<Self> {
        Ok(Self {
            generator,
            blackboard,
            blackboard_json: serde_json::to_string(blackboard)?,
            max_questions: max_questions.clamp(MIN_QUESTIONS, MAX_QUESTIONS),
        })
    }

    async fn generate(&self, template: &str, vars: PromptVars, sampling: Sampling) -> Result<Object> {
        let vars = vars.set("blackboard_json", &self.blackboard_json);
        self.generator
            .generate_json("chair", template, &vars, sampling)
            .await
    }

    /// Pick the directed questions for the Q&A round
    pub async fn select_questions(
        &self,
        stance_cards: &StanceCards,
        open_questions: &[String],
    ) -> Result<ChairQuestionSet> {
        let shown = &open_questions[..open_questions.len().min(OPEN_QUESTIONS_IN_PROMPT)];
        let vars = PromptVars::new()
            .set("max_questions", self.max_questions)
            .set_json("stance_cards_json", stance_cards)?
            .set_json("open_questions_json", shown)?;
        let obj = self
            .generate(templates::CHAIR_QUESTIONS, vars, Sampling::CHAIR_QUESTIONS)
            .await?;

        let set = parse_questions(&obj, open_questions, self.max_questions);
        if set.fallback_used {
            tracing::warn!(
                "[{}] chair produced too few questions; filled from the open-question pool",
                self.blackboard.meeting_id
            );
        }
        Ok(set)
    }

    /// Propose the packages put to the vote
    pub async fn propose_packages(&self, stance_cards: &StanceCards) -> Result<PackageSet> {
        let vars = PromptVars::new().set_json("stance_cards_json", stance_cards)?;
        let obj = self
            .generate(templates::CHAIR_PACKAGES, vars, Sampling::CHAIR_PACKAGES)
            .await?;
        Ok(parse_packages(&obj, self.blackboard))
    }

    /// Draft the statement and minutes summary.
    ///
    /// The tally and `passed:dissent` summary are computed here from the
    /// recorded votes and handed to the generator as fixed numbers. Drafts in
    /// `published` are kept verbatim.
    pub async fn write_statement_and_minutes(
        &self,
        votes: &[Vote],
        round_summaries: &[RoundSummary],
        published: PublishedDrafts<'_>,
    ) -> Result<DecisionDrafts> {
        let roles_in_vote: Vec<Role> = votes
            .iter()
            .map(|v| v.role)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let tally = VoteTally::from_votes(votes);

        tracing::info!(
            "[{}] tally cut={} hold={} hike={} unknown={} ({})",
            self.blackboard.meeting_id,
            tally.cut,
            tally.hold,
            tally.hike,
            tally.unknown,
            tally.summary()
        );

        let vars = PromptVars::new()
            .set_json("roles_in_vote", &roles_in_vote)?
            .set("roles_count", roles_in_vote.len())
            .set_json("tally_json", &tally)?
            .set("vote_summary", tally.summary())
            .set_json("votes_json", votes)?
            .set_json("round_summaries_json", round_summaries)?
            .set("published_drafts", published.prompt_block());
        let obj = self
            .generate(templates::STATEMENT_MINUTES, vars, Sampling::STATEMENT)
            .await?;

        let drafts = finish_drafts(&obj);
        Ok(DecisionDrafts {
            statement_md: published
                .statement_md
                .map_or(drafts.statement_md, str::to_string),
            minutes_summary_md: published
                .minutes_summary_md
                .map_or(drafts.minutes_summary_md, str::to_string),
        })
    }
}

/// Number of questions the round-robin fallback fills up to
pub fn fallback_target(max_questions: usize, pool_len: usize) -> usize {
    MIN_QUESTIONS.max(max_questions.min(pool_len))
}

/// Validate generated questions, filling from `open_questions` when fewer
/// than [`MIN_QUESTIONS`] survive.
///
/// The pool is normalised and deduplicated before the fill target is taken
/// from its size. Fallback questions are assigned to roles in speaking order,
/// cycling, and skip pool entries already asked. The pool can run out before
/// the target.
pub fn parse_questions(obj: &Object, open_questions: &[String], max_questions: usize) -> ChairQuestionSet {
    let mut directed: Vec<DirectedQuestion> = json::list(obj.get("directed_questions"))
        .into_iter()
        .take(max_questions)
        .filter(|item| item.is_object())
        .filter_map(|item| {
            let to_role = json::text(item.get("to_role")).parse::<Role>().ok()?;
            let question = json::normalize_ws(&json::text(item.get("question")));
            (!question.is_empty()).then_some(DirectedQuestion { to_role, question })
        })
        .collect();

    let mut fallback_used = false;
    if directed.len() < MIN_QUESTIONS {
        let mut seen = HashSet::new();
        let pool: Vec<String> = open_questions
            .iter()
            .map(|q| json::normalize_ws(q))
            .filter(|q| !q.is_empty() && seen.insert(q.clone()))
            .collect();
        let target = fallback_target(max_questions, pool.len());
        let mut turn = 0;
        for question in pool {
            if directed.len() >= target {
                break;
            }
            if directed.iter().any(|d| d.question == question) {
                continue;
            }
            directed.push(DirectedQuestion {
                to_role: Role::ALL[turn % Role::ALL.len()],
                question,
            });
            turn += 1;
            fallback_used = true;
        }
    }

    ChairQuestionSet {
        chair_preface_md: json::text(obj.get("chair_preface_md")),
        directed_questions: directed,
        fallback_used,
    }
}

/// Validate generated packages against the policy menu.
///
/// Keeps at most [`MAX_PACKAGES`] of the first proposals; a package whose
/// delta is off the menu or whose key repeats is discarded. An empty result
/// becomes a single neutral hold package.
pub fn parse_packages(obj: &Object, blackboard: &Blackboard) -> PackageSet {
    let menu = blackboard.menu_deltas();
    let mut packages: Vec<PolicyPackage> = Vec::new();

    for item in json::list(obj.get("packages")).into_iter().take(MAX_PACKAGES) {
        if !item.is_object() {
            continue;
        }
        let key = Some(json::text(item.get("key")))
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| "A".to_string());
        let delta = json::int(item.get("delta_bps")).and_then(|d| i32::try_from(d).ok());
        let Some(delta_bps) = delta.filter(|d| menu.contains(d)) else {
            tracing::warn!(
                "[{}] package {} discarded: delta {:?} not on the policy menu",
                blackboard.meeting_id,
                key,
                item.get("delta_bps")
            );
            continue;
        };
        if packages.iter().any(|p| p.key == key) {
            tracing::warn!("[{}] duplicate package key {} discarded", blackboard.meeting_id, key);
            continue;
        }
        packages.push(PolicyPackage {
            key,
            delta_bps,
            stance: PackageStance::parse(&json::text(item.get("stance"))).unwrap_or(PackageStance::Neutral),
            guidance: json::text(item.get("guidance")),
        });
    }

    if packages.is_empty() {
        tracing::warn!("[{}] no valid package proposed; using a neutral hold", blackboard.meeting_id);
        packages.push(fallback_package());
    }

    PackageSet {
        chair_transition_md: json::text(obj.get("chair_transition_md")),
        packages,
    }
}

/// The neutral hold package
pub fn fallback_package() -> PolicyPackage {
    PolicyPackage {
        key: "A".to_string(),
        delta_bps: 0,
        stance: PackageStance::Neutral,
        guidance: FALLBACK_GUIDANCE.to_string(),
    }
}

fn with_heading(text: &str, heading: &str) -> String {
    let text = text.trim();
    let doc = if text.starts_with('#') {
        text.to_string()
    } else {
        format!("{}\n\n{}", heading, text)
    };
    format!("{}\n", doc.trim())
}

/// Normalise the generated drafts: a top-level heading and one trailing newline
pub fn finish_drafts(obj: &Object) -> DecisionDrafts {
    DecisionDrafts {
        statement_md: with_heading(&json::text(obj.get("statement_md")), STATEMENT_HEADING),
        minutes_summary_md: with_heading(&json::text(obj.get("minutes_summary_md")), MINUTES_HEADING),
    }
}
