//! Role Agent: stance cards, speeches, package views and votes for one role

use crate::error::Result;
use crate::json::{self, Object};
use crate::meeting::blackboard::Blackboard;
use crate::meeting::citations;
use crate::meeting::generation::{templates, MeetingGenerator, Sampling};
use crate::meeting::records::{
    CitedReason, CitedRisk, DroppedView, PackagePreference, PackageView, PackageViewEntry,
    PolicyPackage, Speech, SpeechPhase, StanceCard, Vote,
};
use crate::meeting::roles::{allowed_deltas, coerce_delta, Role};
use crate::prompts::PromptVars;
use serde_json::Value;
use std::collections::HashSet;

/// Reason recorded on a vote whose delta was coerced
pub const INVALID_VOTE_REASON: &str = "vote_delta_bps out of allowed set";

/// One committee member bound to a meeting
pub struct RoleAgent<'a> {
    generator: &'a MeetingGenerator,
    blackboard: &'a Blackboard,
    blackboard_json: String,
    role: Role,
    crisis_mode: bool,
}

impl<'a> RoleAgent<'a> {
    /// Bind `role` to a meeting
    pub fn new(
        generator: &'a MeetingGenerator,
        blackboard: &'a Blackboard,
        role: Role,
        crisis_mode: bool,
    ) -> Result<Self> {
        Ok(Self {
            generator,
            blackboard,
            blackboard_json: serde_json::to_string(blackboard)?,
            role,
            crisis_mode,
        })
    }

    /// The role this agent speaks for
    pub fn role(&self) -> Role {
        self.role
    }

    fn allowed(&self) -> &'static [i32] {
        allowed_deltas(self.crisis_mode)
    }

    fn persona(&self) -> PromptVars {
        let profile = self.role.profile();
        PromptVars::new()
            .set("role_display_name", profile.display_name)
            .set("role_role", self.role)
            .set("role_bias", profile.bias)
            .set("role_style", profile.style)
            .set("blackboard_json", &self.blackboard_json)
    }

    async fn generate(&self, template: &str, vars: PromptVars, sampling: Sampling) -> Result<Object> {
        self.generator
            .generate_json(self.role.as_str(), template, &vars, sampling)
            .await
    }

    /// Private pre-discussion position
    pub async fn stance_card(&self) -> Result<StanceCard> {
        let vars = self.persona().set_json("allowed_vote_deltas_bps", self.allowed())?;
        let obj = self
            .generate(templates::STANCE_CARD, vars, Sampling::STANCE_CARD)
            .await?;
        Ok(parse_stance_card(self.role, &obj, self.blackboard, self.allowed()))
    }

    /// Opening statement, or the answer to a chair question
    pub async fn public_speech(
        &self,
        stance: &StanceCard,
        phase: SpeechPhase,
        question: Option<&str>,
    ) -> Result<Speech> {
        let vars = self
            .persona()
            .set("phase_name", phase)
            .set("question_clause", question_clause(question))
            .set_json("stance_card_json", stance)?;
        let obj = self.generate(templates::PUBLIC_SPEECH, vars, Sampling::SPEECH).await?;
        Ok(parse_speech(self.role, phase, question, &obj, self.blackboard))
    }

    /// Views on the chair's packages
    pub async fn package_preference(
        &self,
        stance: &StanceCard,
        packages: &[PolicyPackage],
    ) -> Result<PackagePreference> {
        let vars = self
            .persona()
            .set_json("packages_json", packages)?
            .set_json("stance_card_json", stance)?;
        let obj = self
            .generate(templates::PACKAGE_PREFERENCE, vars, Sampling::PACKAGE_PREFERENCE)
            .await?;
        Ok(parse_package_preference(self.role, &obj, self.blackboard, packages))
    }

    /// Formal vote
    pub async fn vote(&self, stance: &StanceCard, packages: &[PolicyPackage]) -> Result<Vote> {
        let vars = self
            .persona()
            .set_json("allowed_vote_deltas_bps", self.allowed())?
            .set_json("packages_json", packages)?
            .set_json("stance_card_json", stance)?;
        let obj = self.generate(templates::VOTE, vars, Sampling::VOTE).await?;
        Ok(parse_vote(self.role, &obj, self.blackboard, self.allowed()))
    }
}

/// Prompt fragment carrying the chair's question, empty without one
pub fn question_clause(question: Option<&str>) -> String {
    match question.map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => format!(
            "\nThe chair's question to you (answer only this question):\n{}\n",
            q
        ),
        None => String::new(),
    }
}

fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes"),
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

fn citation_error(
    role: Role,
    what: &str,
    facts: &[String],
    uncertainties: &[String],
    blackboard: &Blackboard,
) -> Option<String> {
    let error = citations::validate(facts, uncertainties, blackboard).error_message();
    if let Some(e) = &error {
        tracing::warn!("[{}] {} {}: {}", blackboard.meeting_id, role, what, e);
    }
    error
}

/// Validate a generated stance card
pub fn parse_stance_card(role: Role, obj: &Object, blackboard: &Blackboard, allowed: &[i32]) -> StanceCard {
    let (preferred_delta_bps, coerced) = coerce_delta(json::int(obj.get("preferred_delta_bps")), allowed);
    if coerced {
        tracing::warn!(
            "[{}] {} stance delta {:?} outside {:?}; using 0",
            blackboard.meeting_id,
            role,
            obj.get("preferred_delta_bps"),
            allowed
        );
    }

    let top_reasons: Vec<CitedReason> = json::list(obj.get("top_reasons"))
        .into_iter()
        .filter(|item| item.is_object())
        .map(|item| CitedReason {
            fact_id: json::text(item.get("fact_id")),
            reason: json::normalize_ws(&json::text(item.get("reason"))),
        })
        .collect();
    let key_risks: Vec<CitedRisk> = json::list(obj.get("key_risks"))
        .into_iter()
        .filter(|item| item.is_object())
        .map(|item| CitedRisk {
            uncertainty_id: json::text(item.get("uncertainty_id")),
            risk: json::normalize_ws(&json::text(item.get("risk"))),
        })
        .collect();

    let cited_facts: Vec<String> = top_reasons.iter().map(|r| r.fact_id.clone()).collect();
    let cited_uncertainties: Vec<String> = key_risks.iter().map(|r| r.uncertainty_id.clone()).collect();

    StanceCard {
        role,
        preferred_delta_bps,
        citation_error: citation_error(role, "stance card", &cited_facts, &cited_uncertainties, blackboard),
        top_reasons,
        key_risks,
        acceptable_compromises: json::string_list(obj.get("acceptable_compromises")),
        questions_to_ask: json::string_list(obj.get("questions_to_ask"))
            .iter()
            .map(|q| json::normalize_ws(q))
            .collect(),
        one_sentence_position: json::normalize_ws(&json::text(obj.get("one_sentence_position"))),
    }
}

/// Validate a generated speech.
///
/// Opening statements keep their follow-up question; answers record the
/// chair's question instead and never carry one.
pub fn parse_speech(
    role: Role,
    phase: SpeechPhase,
    question: Option<&str>,
    obj: &Object,
    blackboard: &Blackboard,
) -> Speech {
    let cited_facts = json::string_list(obj.get("cited_facts"));
    let cited_uncertainties = json::string_list(obj.get("cited_uncertainties"));

    let (ask_one_question, question) = match phase {
        SpeechPhase::OpeningStatements => {
            let ask = Some(json::normalize_ws(&json::text(obj.get("ask_one_question"))))
                .filter(|q| !q.is_empty());
            if ask.is_none() {
                tracing::warn!(
                    "[{}] {} opening statement has no follow-up question",
                    blackboard.meeting_id,
                    role
                );
            }
            (ask, None)
        }
        SpeechPhase::DirectedQa => (None, question.map(json::normalize_ws)),
    };

    Speech {
        role,
        phase,
        speech_md: json::text(obj.get("speech_md")),
        citation_error: citation_error(role, "speech", &cited_facts, &cited_uncertainties, blackboard),
        cited_facts,
        cited_uncertainties,
        ask_one_question,
        question,
    }
}

/// Validate generated package views.
///
/// A view is dropped, with the reason kept in `dropped_views`, when its view
/// value is unknown, it names no proposed package, it repeats a package
/// already viewed, or any cited fact does not exist.
pub fn parse_package_preference(
    role: Role,
    obj: &Object,
    blackboard: &Blackboard,
    packages: &[PolicyPackage],
) -> PackagePreference {
    let known: HashSet<&str> = packages.iter().map(|p| p.key.as_str()).collect();
    let mut seen = HashSet::new();
    let mut package_views = Vec::new();
    let mut dropped_views = Vec::new();

    for item in json::list(obj.get("package_views")) {
        if !item.is_object() {
            continue;
        }
        let package_key = json::text(item.get("package_key"));
        let cited_facts = json::string_list(item.get("cited_facts"));

        let check = citations::validate(&cited_facts, &[], blackboard);
        let rejection = match PackageView::parse(&json::text(item.get("view"))) {
            None => Err(format!("invalid view {}", json::text(item.get("view")))),
            Some(_) if !known.contains(package_key.as_str()) => Err("unknown package".to_string()),
            Some(_) if seen.contains(&package_key) => Err("duplicate view".to_string()),
            Some(view) => match check.error_message() {
                Some(e) => Err(e),
                None => Ok(view),
            },
        };

        match rejection {
            Ok(view) => {
                seen.insert(package_key.clone());
                package_views.push(PackageViewEntry {
                    package_key,
                    view,
                    because: json::normalize_ws(&json::text(item.get("because"))),
                    cited_facts,
                });
            }
            Err(reason) => {
                tracing::warn!(
                    "[{}] {} view on package {:?} dropped: {}",
                    blackboard.meeting_id,
                    role,
                    package_key,
                    reason
                );
                dropped_views.push(DroppedView { package_key, reason });
            }
        }
    }

    PackagePreference {
        role,
        package_views,
        dropped_views,
    }
}

/// Validate a generated vote
pub fn parse_vote(role: Role, obj: &Object, blackboard: &Blackboard, allowed: &[i32]) -> Vote {
    let (vote_delta_bps, coerced) = coerce_delta(json::int(obj.get("vote_delta_bps")), allowed);
    let invalid_vote_reason = coerced.then(|| {
        tracing::warn!(
            "[{}] {} vote {:?} outside {:?}; recorded as 0",
            blackboard.meeting_id,
            role,
            obj.get("vote_delta_bps"),
            allowed
        );
        INVALID_VOTE_REASON.to_string()
    });

    let cited_facts = json::string_list(obj.get("cited_facts"));
    let cited_uncertainties = json::string_list(obj.get("cited_uncertainties"));

    Vote {
        role,
        vote_delta_bps,
        chosen_package_key: Some(json::text(obj.get("chosen_package_key"))).filter(|k| !k.is_empty()),
        reason: json::normalize_ws(&json::text(obj.get("reason"))),
        citation_error: citation_error(role, "vote", &cited_facts, &cited_uncertainties, blackboard),
        cited_facts,
        cited_uncertainties,
        dissent: flag(obj.get("dissent")),
        dissent_sentence: json::normalize_ws(&json::text(obj.get("dissent_sentence"))),
        invalid_vote_reason,
    }
}
