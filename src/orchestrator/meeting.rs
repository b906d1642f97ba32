//! Meeting orchestrator
//!
//! Sequences every phase of one meeting, caches each artifact
//! independently, and exposes runs as background jobs.

use crate::background::{JobLog, JobRegistry};
use crate::chat::ChatClient;
use crate::config::{GenerationConfig, Settings, SimulationSettings};
use crate::error::{Error, Result};
use crate::json::{self, Object};
use crate::llm_client::LlmClient;
use crate::meeting::blackboard::{
    Blackboard, BlackboardBuilder, BriefingMaterials, CrisisClassifier, KeywordClassifier,
    SourceKind,
};
use crate::meeting::chair::{ChairAgent, PublishedDrafts};
use crate::meeting::generation::{templates, MeetingGenerator};
use crate::meeting::records::{
    DecisionDrafts, DiscussionRecord, PackageSet, Speech, SpeechPhase, StanceCards, VoteRecord,
    VoteTally,
};
use crate::meeting::role_agent::RoleAgent;
use crate::meeting::roles::Role;
use crate::meeting::secretary::Secretary;
use crate::meeting::transcript::Transcript;
use crate::orchestrator::phase::{MeetingPhase, PhaseTracker};
use crate::prompts::PromptStore;
use crate::storage::{ArtifactEntry, ArtifactFormat, MeetingRun, RunStore};
use crate::types::JobId;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Every artifact a complete run produces, in cascade order
pub const ARTIFACTS: [&str; 8] = [
    "blackboard",
    "stance_cards",
    "round_summaries",
    "packages",
    "votes",
    "discussion",
    "statement",
    "minutes_summary",
];

/// Size of the open-question pool handed to the chair
pub const OPEN_QUESTION_POOL: usize = 10;

/// Stance-card questions added to the pool per role
const STANCE_QUESTIONS_PER_ROLE: usize = 2;

fn format_of(artifact: &str) -> ArtifactFormat {
    match artifact {
        "discussion" | "statement" | "minutes_summary" => ArtifactFormat::Markdown,
        _ => ArtifactFormat::Json,
    }
}

/// A request to run one meeting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingRequest {
    /// Meeting identifier
    pub meeting_id: String,
    /// Regenerate every artifact
    #[serde(default)]
    pub refresh: bool,
}

impl MeetingRequest {
    /// Request a cached-where-possible run
    pub fn new(meeting_id: impl Into<String>) -> Self {
        Self {
            meeting_id: meeting_id.into(),
            refresh: false,
        }
    }

    /// Set the refresh flag
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }
}

/// Result of a meeting run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingOutcome {
    /// Meeting identifier
    pub meeting_id: String,
    /// True when every artifact came from cache
    pub cached: bool,
    /// Run-wide crisis flag
    pub crisis_mode: bool,
    /// Engine-computed vote count
    pub tally: VoteTally,
    /// `passed:dissent`
    pub vote_summary: String,
    /// Manifest entries of the eight artifacts
    pub artifacts: BTreeMap<String, ArtifactEntry>,
}

/// Read a JSON artifact, treating a corrupt file like a missing one
async fn read_intact<T: DeserializeOwned>(run: &MeetingRun, name: &str) -> Result<Option<T>> {
    match run.read_json(name).await {
        Err(Error::Storage(e)) => {
            tracing::warn!("[{}] {}; regenerating", run.meeting_id(), e);
            Ok(None)
        }
        other => other,
    }
}

/// Tracks whether an upstream artifact was regenerated in this run
struct Cascade<'a> {
    run: &'a MeetingRun,
    refresh: bool,
    regenerated: bool,
}

impl Cascade<'_> {
    fn reusable(&self) -> bool {
        !self.refresh && !self.regenerated
    }

    async fn json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        if !self.reusable() || !self.run.has(name, ArtifactFormat::Json).await? {
            return Ok(None);
        }
        read_intact(self.run, name).await
    }

    async fn text(&self, name: &str) -> Result<Option<String>> {
        if !self.reusable() || !self.run.has(name, ArtifactFormat::Markdown).await? {
            return Ok(None);
        }
        self.run.read_text(name).await
    }
}

/// Runs meetings end to end
pub struct MeetingOrchestrator {
    client: Arc<dyn LlmClient>,
    prompts: Arc<PromptStore>,
    store: RunStore,
    model: String,
    simulation: SimulationSettings,
    classifier: Arc<dyn CrisisClassifier>,
    audit_prompts: bool,
}

impl MeetingOrchestrator {
    /// Create an orchestrator with default simulation limits
    pub fn new(
        client: Arc<dyn LlmClient>,
        prompts: Arc<PromptStore>,
        store: RunStore,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            prompts,
            store,
            model: model.into(),
            simulation: SimulationSettings::default(),
            classifier: Arc::new(KeywordClassifier::default()),
            audit_prompts: true,
        }
    }

    /// Build the HTTP client, template store and run store from settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = ChatClient::new(GenerationConfig::from_settings(&settings.generation)?)?;
        let prompts = PromptStore::from_settings(&settings.storage)?;
        tracing::info!(
            "generation via {} at {} (model {})",
            client.client_type(),
            client.endpoint(),
            settings.generation.model
        );

        Ok(Self::new(
            Arc::new(client),
            Arc::new(prompts),
            RunStore::from_settings(&settings.storage),
            settings.generation.model.clone(),
        )
        .with_simulation(settings.simulation.clone())
        .with_audit_prompts(settings.storage.audit_prompts))
    }

    /// Set simulation limits; the crisis classifier follows their keywords
    pub fn with_simulation(mut self, simulation: SimulationSettings) -> Self {
        self.classifier = Arc::new(KeywordClassifier::new(&simulation.crisis_keywords));
        self.simulation = simulation;
        self
    }

    /// Replace the crisis classifier
    pub fn with_classifier(mut self, classifier: Arc<dyn CrisisClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Enable or disable the prompt audit log
    pub fn with_audit_prompts(mut self, enabled: bool) -> Self {
        self.audit_prompts = enabled;
        self
    }

    /// Artifact store
    pub fn store(&self) -> &RunStore {
        &self.store
    }

    /// Template store
    pub fn prompts(&self) -> &PromptStore {
        &self.prompts
    }

    /// Store a briefing document for a meeting.
    ///
    /// Replacing a document does not invalidate a cached blackboard; run
    /// with `refresh` to rebuild from the new material.
    pub async fn import_material(
        &self,
        meeting_id: &str,
        kind: SourceKind,
        text: &str,
        report_month: Option<&str>,
    ) -> Result<ArtifactEntry> {
        import_material(&self.store, meeting_id, kind, text, report_month).await
    }

    /// Start a run as a background job
    pub fn spawn_job(self: Arc<Self>, registry: &JobRegistry, request: MeetingRequest) -> JobId {
        let kind = format!("meeting:{}", request.meeting_id);
        registry.spawn(kind, move |log| async move {
            let outcome = self.run(&request, &log).await?;
            log.line(format!(
                "[{}] done (cached={}, vote {})",
                outcome.meeting_id, outcome.cached, outcome.vote_summary
            ));
            Ok(serde_json::to_value(&outcome)?)
        })
    }

    fn meta(&self, kind: &str, crisis_mode: bool, prompt_templates: &[&str]) -> Result<Object> {
        let prompts = prompt_templates
            .iter()
            .map(|name| self.prompts.identity(name))
            .collect::<Result<Vec<_>>>()?;
        let mut meta = Object::new();
        meta.insert("kind".to_string(), json!(kind));
        meta.insert("crisis_mode".to_string(), json!(crisis_mode));
        meta.insert("prompts".to_string(), serde_json::to_value(prompts)?);
        Ok(meta)
    }

    async fn load_materials(&self, run: &MeetingRun) -> Result<BriefingMaterials> {
        let mut materials = BriefingMaterials::new();
        for kind in SourceKind::ALL {
            if let Some(text) = run.read_text(kind.as_str()).await? {
                materials.insert(kind, text);
            }
        }
        if materials.present().is_empty() {
            tracing::warn!(
                "[{}] no briefing materials found; the blackboard will be thin",
                run.meeting_id()
            );
        }
        Ok(materials)
    }

    async fn all_cached(&self, run: &MeetingRun) -> Result<bool> {
        for name in ARTIFACTS {
            if !run.has(name, format_of(name)).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Outcome of a fully cached run, or `None` when an artifact is missing
    /// or no longer parses.
    async fn cached_outcome(&self, run: &MeetingRun) -> Result<Option<MeetingOutcome>> {
        if !self.all_cached(run).await? {
            return Ok(None);
        }
        let Some(blackboard) = read_intact::<Blackboard>(run, "blackboard").await? else {
            return Ok(None);
        };
        let intact = read_intact::<StanceCards>(run, "stance_cards").await?.is_some()
            && read_intact::<DiscussionRecord>(run, "round_summaries").await?.is_some()
            && read_intact::<PackageSet>(run, "packages").await?.is_some();
        if !intact {
            return Ok(None);
        }
        let Some(votes) = read_intact::<VoteRecord>(run, "votes").await? else {
            return Ok(None);
        };

        let recorded = run
            .manifest()
            .await?
            .context
            .get("crisis_mode")
            .and_then(Value::as_bool);
        let crisis_mode = match recorded {
            Some(flag) => flag,
            None => {
                tracing::warn!(
                    "[{}] no crisis_mode in the run context; classifying the cached blackboard",
                    run.meeting_id()
                );
                self.classifier.classify(&blackboard)
            }
        };
        Ok(Some(self.outcome(run, true, crisis_mode, &votes).await?))
    }

    async fn outcome(
        &self,
        run: &MeetingRun,
        cached: bool,
        crisis_mode: bool,
        votes: &VoteRecord,
    ) -> Result<MeetingOutcome> {
        let manifest = run.manifest().await?;
        let tally = VoteTally::from_votes(&votes.votes);
        Ok(MeetingOutcome {
            meeting_id: run.meeting_id().to_string(),
            cached,
            crisis_mode,
            vote_summary: tally.summary(),
            tally,
            artifacts: ARTIFACTS
                .iter()
                .filter_map(|name| {
                    manifest
                        .artifacts
                        .get(*name)
                        .map(|entry| (name.to_string(), entry.clone()))
                })
                .collect(),
        })
    }

    /// Run a meeting, reusing persisted artifacts unless `refresh` is set.
    ///
    /// Any generation or storage failure aborts the run; artifacts already
    /// checkpointed stay valid for the next attempt.
    pub async fn run(&self, request: &MeetingRequest, log: &JobLog) -> Result<MeetingOutcome> {
        let meeting_id = request.meeting_id.as_str();
        let run = self.store.ensure_run(meeting_id).await?;
        log.line(format!("[{}] refresh={}", meeting_id, request.refresh));

        if !request.refresh {
            if let Some(outcome) = self.cached_outcome(&run).await? {
                log.line(format!("[{}] all artifacts cached", meeting_id));
                return Ok(outcome);
            }
        }

        let mut generator = MeetingGenerator::new(
            self.client.clone(),
            self.prompts.clone(),
            self.model.clone(),
            meeting_id,
        );
        if self.audit_prompts {
            generator = generator.with_audit(run.audit());
        }

        let mut phases = PhaseTracker::new(meeting_id);
        let mut cascade = Cascade {
            run: &run,
            refresh: request.refresh,
            regenerated: false,
        };
        log.line(format!("[{}] phase {}", meeting_id, phases.current()));

        // INIT
        let blackboard = match cascade.json::<Blackboard>("blackboard").await? {
            Some(bb) => {
                log.line(format!("[{}] reusing blackboard", meeting_id));
                bb
            }
            None => {
                let materials = self.load_materials(&run).await?;
                let bb = BlackboardBuilder::new(&generator, &self.simulation)
                    .build(&materials)
                    .await?;
                cascade.regenerated = true;
                let crisis_mode = self.classifier.classify(&bb);
                run.write_json(
                    "blackboard",
                    &bb,
                    self.meta("blackboard", crisis_mode, &[templates::BLACKBOARD])?,
                )
                .await?;
                bb
            }
        };
        let crisis_mode = self.classifier.classify(&blackboard);
        log.line(format!(
            "[{}] blackboard ready: {} facts, {} uncertainties, crisis_mode={}",
            meeting_id,
            blackboard.facts.len(),
            blackboard.uncertainties.len(),
            crisis_mode
        ));

        let agents = Role::ALL
            .iter()
            .map(|&role| RoleAgent::new(&generator, &blackboard, role, crisis_mode))
            .collect::<Result<Vec<_>>>()?;
        let chair = ChairAgent::new(&generator, &blackboard, self.simulation.max_questions)?;
        let secretary = Secretary::new(&generator, &blackboard)?;

        // OPENING: stance cards
        phases.advance(MeetingPhase::Opening, log)?;
        let stance_cards: StanceCards = match cascade.json("stance_cards").await? {
            Some(cards) => {
                log.line(format!("[{}] reusing stance cards", meeting_id));
                cards
            }
            None => {
                let mut cards = StanceCards::new();
                for agent in &agents {
                    log.line(format!("[{}] stance card: {}", meeting_id, agent.role()));
                    cards.insert(agent.role(), agent.stance_card().await?);
                }
                cascade.regenerated = true;
                run.write_json(
                    "stance_cards",
                    &cards,
                    self.meta("stance_cards", crisis_mode, &[templates::STANCE_CARD])?,
                )
                .await?;
                cards
            }
        };
        let stance_of = |role: Role| {
            stance_cards
                .get(&role)
                .ok_or_else(|| Error::invalid_input(format!("no stance card recorded for {}", role)))
        };

        // OPENING speeches through ROUND_SUMMARY_2
        let discussion: DiscussionRecord = match cascade.json("round_summaries").await? {
            Some(record) => {
                log.line(format!("[{}] reusing discussion rounds", meeting_id));
                phases.advance(MeetingPhase::RoundSummary1, log)?;
                phases.advance(MeetingPhase::DirectedQa, log)?;
                phases.advance(MeetingPhase::RoundSummary2, log)?;
                record
            }
            None => {
                let mut opening_speeches = Vec::new();
                for agent in &agents {
                    log.line(format!("[{}] opening statement: {}", meeting_id, agent.role()));
                    let stance = stance_of(agent.role())?;
                    opening_speeches.push(
                        agent
                            .public_speech(stance, SpeechPhase::OpeningStatements, None)
                            .await?,
                    );
                }
                let open_questions = open_question_pool(&opening_speeches, &stance_cards);

                phases.advance(MeetingPhase::RoundSummary1, log)?;
                let opening_summary = secretary
                    .summarize_round(SpeechPhase::OpeningStatements, &opening_speeches)
                    .await?;

                phases.advance(MeetingPhase::DirectedQa, log)?;
                let chair_questions = chair.select_questions(&stance_cards, &open_questions).await?;
                let mut qa_speeches = Vec::new();
                for dq in &chair_questions.directed_questions {
                    log.line(format!("[{}] chair asks {}", meeting_id, dq.to_role));
                    let agent = agents
                        .iter()
                        .find(|a| a.role() == dq.to_role)
                        .ok_or_else(|| Error::other(format!("no agent for {}", dq.to_role)))?;
                    qa_speeches.push(
                        agent
                            .public_speech(
                                stance_of(dq.to_role)?,
                                SpeechPhase::DirectedQa,
                                Some(&dq.question),
                            )
                            .await?,
                    );
                }

                phases.advance(MeetingPhase::RoundSummary2, log)?;
                let qa_summary = secretary
                    .summarize_round(SpeechPhase::DirectedQa, &qa_speeches)
                    .await?;

                let record = DiscussionRecord {
                    rounds: vec![opening_summary, qa_summary],
                    opening_speeches,
                    open_questions,
                    chair_questions,
                    qa_speeches,
                };
                cascade.regenerated = true;
                run.write_json(
                    "round_summaries",
                    &record,
                    self.meta(
                        "round_summaries",
                        crisis_mode,
                        &[
                            templates::PUBLIC_SPEECH,
                            templates::SECRETARY_ROUND,
                            templates::CHAIR_QUESTIONS,
                        ],
                    )?,
                )
                .await?;
                record
            }
        };

        // PACKAGES_AND_VOTES
        phases.advance(MeetingPhase::PackagesAndVotes, log)?;
        let packages: PackageSet = match cascade.json("packages").await? {
            Some(set) => set,
            None => {
                let set = chair.propose_packages(&stance_cards).await?;
                cascade.regenerated = true;
                run.write_json(
                    "packages",
                    &set,
                    self.meta("packages", crisis_mode, &[templates::CHAIR_PACKAGES])?,
                )
                .await?;
                set
            }
        };
        log.line(format!(
            "[{}] packages: {}",
            meeting_id,
            packages
                .packages
                .iter()
                .map(|p| format!("{}({:+}bp)", p.key, p.delta_bps))
                .collect::<Vec<_>>()
                .join(", ")
        ));

        let votes: VoteRecord = match cascade.json("votes").await? {
            Some(record) => record,
            None => {
                let mut votes = Vec::new();
                let mut package_preferences = Vec::new();
                for agent in &agents {
                    let stance = stance_of(agent.role())?;
                    package_preferences.push(agent.package_preference(stance, &packages.packages).await?);
                    let vote = agent.vote(stance, &packages.packages).await?;
                    log.line(format!(
                        "[{}] {} votes {:+}bp",
                        meeting_id, vote.role, vote.vote_delta_bps
                    ));
                    votes.push(vote);
                }
                let record = VoteRecord {
                    votes,
                    package_preferences,
                };
                cascade.regenerated = true;
                run.write_json(
                    "votes",
                    &record,
                    self.meta(
                        "votes",
                        crisis_mode,
                        &[templates::PACKAGE_PREFERENCE, templates::VOTE],
                    )?,
                )
                .await?;
                record
            }
        };
        let tally = VoteTally::from_votes(&votes.votes);

        // DECISION
        phases.advance(MeetingPhase::Decision, log)?;
        let (drafts, write_statement, write_minutes) = match (
            cascade.text("statement").await?,
            cascade.text("minutes_summary").await?,
        ) {
            (Some(statement_md), Some(minutes_summary_md)) => (
                DecisionDrafts {
                    statement_md,
                    minutes_summary_md,
                },
                false,
                false,
            ),
            (statement, minutes) => {
                let published = PublishedDrafts {
                    statement_md: statement.as_deref(),
                    minutes_summary_md: minutes.as_deref(),
                };
                let drafts = chair
                    .write_statement_and_minutes(&votes.votes, &discussion.rounds, published)
                    .await?;
                (drafts, statement.is_none(), minutes.is_none())
            }
        };

        // RENDER
        phases.advance(MeetingPhase::Render, log)?;
        let transcript = Transcript {
            blackboard: &blackboard,
            crisis_mode,
            stance_cards: &stance_cards,
            discussion: &discussion,
            packages: &packages,
            votes: &votes,
        }
        .render();

        // PERSIST
        phases.advance(MeetingPhase::Persist, log)?;
        if run.read_text("discussion").await?.as_deref() != Some(transcript.as_str())
            || !run.has("discussion", ArtifactFormat::Markdown).await?
        {
            run.write_text("discussion", &transcript, self.meta("discussion", crisis_mode, &[])?)
                .await?;
        }
        let meta = |kind: &str| self.meta(kind, crisis_mode, &[templates::STATEMENT_MINUTES]);
        if write_statement {
            run.write_text("statement", &drafts.statement_md, meta("statement")?)
                .await?;
        }
        if write_minutes {
            run.write_text("minutes_summary", &drafts.minutes_summary_md, meta("minutes_summary")?)
                .await?;
        }
        self.save_context(&run, crisis_mode).await?;

        phases.advance(MeetingPhase::Complete, log)?;
        self.outcome(&run, false, crisis_mode, &votes).await
    }

    async fn save_context(&self, run: &MeetingRun, crisis_mode: bool) -> Result<()> {
        let manifest = run.manifest().await?;
        let report_months: Object = SourceKind::ALL
            .iter()
            .filter_map(|kind| {
                let entry = manifest.artifacts.get(kind.as_str())?;
                let month = entry.meta.get("report_month")?.clone();
                Some((kind.as_str().to_string(), month))
            })
            .collect();

        let mut context = manifest.context;
        context.insert("crisis_mode".to_string(), json!(crisis_mode));
        context.insert("report_months".to_string(), Value::Object(report_months));
        context.insert("roles".to_string(), json!(Role::ALL));
        context.insert("completed_at".to_string(), json!(Utc::now()));
        run.set_context(context).await?;
        Ok(())
    }
}

/// Store a briefing document under `kind` with its reporting month
pub async fn import_material(
    store: &RunStore,
    meeting_id: &str,
    kind: SourceKind,
    text: &str,
    report_month: Option<&str>,
) -> Result<ArtifactEntry> {
    let run = store.ensure_run(meeting_id).await?;
    let mut meta = Object::new();
    meta.insert("kind".to_string(), json!("material"));
    meta.insert("source".to_string(), json!(kind));
    if let Some(month) = report_month {
        meta.insert("report_month".to_string(), json!(month));
    }
    run.write_text(kind.as_str(), text, meta).await
}

/// Follow-up questions for the chair.
///
/// Opening-statement questions come first, then up to two questions from
/// each stance card; whitespace is normalised, repeats removed, and the pool
/// capped at [`OPEN_QUESTION_POOL`].
pub fn open_question_pool(opening_speeches: &[Speech], stance_cards: &StanceCards) -> Vec<String> {
    let from_speeches = opening_speeches
        .iter()
        .filter_map(|s| s.ask_one_question.as_deref());
    let from_cards = stance_cards
        .values()
        .flat_map(|card| card.questions_to_ask.iter().take(STANCE_QUESTIONS_PER_ROLE))
        .map(String::as_str);

    let mut seen = HashSet::new();
    from_speeches
        .chain(from_cards)
        .map(json::normalize_ws)
        .filter(|q| !q.is_empty() && seen.insert(q.clone()))
        .take(OPEN_QUESTION_POOL)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::JobStatus;
    use crate::meeting::roles::allowed_deltas;
    use crate::storage::PROMPT_AUDIT_FILE;
    use crate::testing::ScriptedClient;
    use serde_json::json;
    use tempfile::TempDir;

    const BLACKBOARD_REPLY: &str = r#"{
        "facts": [
            {"text": "Real GDP grew 2.8% annualised in Q2.", "source": "macro"},
            {"text": "Payrolls rose 142k in August.", "source": "nfp"},
            {"text": "Core CPI rose 0.3% m/m.", "source": "cpi"},
            {"text": "The rule-implied rate is 4.9%.", "source": "taylor"},
            {"text": "Equity markets were broadly stable.", "source": "macro"}
        ],
        "uncertainties": [{"text": "Pace of labor cooling"}, {"text": "Tariff pass-through"}]
    }"#;

    fn stance(delta: i32, question: &str) -> String {
        json!({
            "preferred_delta_bps": delta,
            "top_reasons": [{"fact_id": "F02", "reason": "labor"}],
            "key_risks": [{"uncertainty_id": "U01", "risk": "lags"}],
            "questions_to_ask": [question, "What about wages?"],
            "one_sentence_position": "Position."
        })
        .to_string()
    }

    fn speech(role: &str) -> String {
        json!({
            "speech_md": format!("{} speaks about F02 and U01.", role),
            "cited_facts": ["F02"],
            "cited_uncertainties": ["U01"],
            "ask_one_question": format!("Question from {}?", role)
        })
        .to_string()
    }

    fn vote(delta: i32, dissent: bool) -> String {
        let package = if delta < 0 { "A" } else { "B" };
        let dissent_sentence = if dissent { "Preferred to hold." } else { "" };
        json!({
            "vote_delta_bps": delta,
            "chosen_package_key": package,
            "reason": "Data-dependent.",
            "cited_facts": ["F03"],
            "cited_uncertainties": [],
            "dissent": dissent,
            "dissent_sentence": dissent_sentence
        })
        .to_string()
    }

    fn scripted() -> ScriptedClient {
        ScriptedClient::new()
            .always(templates::BLACKBOARD, BLACKBOARD_REPLY)
            .always("meeting_stance_card:centrist", &stance(-25, "Centrist asks?"))
            .always("meeting_stance_card:hawk", &stance(0, "Hawk asks?"))
            .always("meeting_stance_card:dove", &stance(-25, "Dove asks?"))
            .always("meeting_public_speech:centrist", &speech("centrist"))
            .always("meeting_public_speech:hawk", &speech("hawk"))
            .always("meeting_public_speech:dove", &speech("dove"))
            .always(
                templates::SECRETARY_ROUND,
                r#"{"consensus": ["Inflation is easing."], "disagreements": ["Pace of cuts."]}"#,
            )
            .always(
                templates::CHAIR_QUESTIONS,
                r#"{"chair_preface_md": "Let us probe.", "directed_questions": [
                    {"to_role": "hawk", "question": "Is inflation still sticky?"},
                    {"to_role": "dove", "question": "How fast is labor cooling?"},
                    {"to_role": "centrist", "question": "Where is the balance of risks?"}
                ]}"#,
            )
            .always(
                templates::CHAIR_PACKAGES,
                r#"{"chair_transition_md": "Two options.", "packages": [
                    {"key": "A", "delta_bps": -25, "stance": "dovish", "guidance": "Ease gradually."},
                    {"key": "B", "delta_bps": 0, "stance": "hawkish", "guidance": "Stay patient."}
                ]}"#,
            )
            .always(
                templates::PACKAGE_PREFERENCE,
                r#"{"package_views": [
                    {"package_key": "A", "view": "support", "because": "cooling", "cited_facts": ["F02"]},
                    {"package_key": "B", "view": "oppose", "because": "invented", "cited_facts": ["F99"]}
                ]}"#,
            )
            .always("meeting_vote:centrist", &vote(-25, false))
            .always("meeting_vote:hawk", &vote(0, true))
            .always("meeting_vote:dove", &vote(-25, false))
            .always(
                templates::STATEMENT_MINUTES,
                r#"{"statement_md": "The Committee decided by a vote of 2:1 to lower the target range.",
                    "minutes_summary_md": "Three participants voted; the decision passed 2:1."}"#,
            )
    }

    // one blackboard, 3 stance cards, 3 openings, 2 summaries, chair questions,
    // 3 answers, packages, 3 preferences, 3 votes, statement
    const FULL_RUN_CALLS: usize = 21;

    async fn orchestrator(dir: &TempDir, client: &ScriptedClient) -> Arc<MeetingOrchestrator> {
        let orchestrator = MeetingOrchestrator::new(
            Arc::new(client.clone()),
            Arc::new(PromptStore::builtin().unwrap()),
            RunStore::new(dir.path().join("meeting_runs")),
            "test-model",
        );
        for (kind, text) in [
            (SourceKind::Macro, "GDP grew 2.8%."),
            (SourceKind::Nfp, "Payrolls +142k."),
            (SourceKind::Cpi, "Core CPI +0.3%."),
            (SourceKind::Taylor, "Rule rate 4.9%."),
        ] {
            orchestrator
                .import_material("2024-09", kind, text, Some("2024-08"))
                .await
                .unwrap();
        }
        Arc::new(orchestrator)
    }

    async fn artifact_bytes(orchestrator: &MeetingOrchestrator) -> Vec<Vec<u8>> {
        let run = orchestrator.store().ensure_run("2024-09").await.unwrap();
        let mut all = Vec::new();
        for name in ARTIFACTS {
            let path = run.artifact_path(name, format_of(name)).unwrap();
            all.push(std::fs::read(path).unwrap());
        }
        all
    }

    #[tokio::test]
    async fn test_end_to_end_two_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let client = scripted();
        let orchestrator = orchestrator(&dir, &client).await;

        let registry = JobRegistry::new();
        let id = orchestrator
            .clone()
            .spawn_job(&registry, MeetingRequest::new("2024-09"));
        let job = registry.wait(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Succeeded, "logs: {:?}", job.logs);
        assert!(job.logs.iter().any(|l| l.contains("phase COMPLETE")));

        let outcome: MeetingOutcome = serde_json::from_value(job.result.unwrap()).unwrap();
        assert!(!outcome.cached);
        assert!(!outcome.crisis_mode);
        assert_eq!(
            outcome.tally,
            VoteTally {
                cut: 2,
                hold: 1,
                hike: 0,
                unknown: 0
            }
        );
        assert_eq!(outcome.vote_summary, "2:1");
        assert_eq!(outcome.artifacts.len(), ARTIFACTS.len());
        assert_eq!(client.requests().len(), FULL_RUN_CALLS);

        let run = orchestrator.store().ensure_run("2024-09").await.unwrap();
        let bb: Blackboard = run.read_json("blackboard").await.unwrap().unwrap();
        let ids: Vec<&str> = bb.facts.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["F01", "F02", "F03", "F04", "F05"]);
        assert_eq!(bb.policy_menu.len(), 3);

        // the blackboard prompt carried the imported materials
        let bb_prompt = &client.requests_for(templates::BLACKBOARD)[0].messages[1].content;
        assert!(bb_prompt.contains("Payrolls +142k."));

        // the engine tally reached the statement prompt
        let statement_prompt = &client.requests_for(templates::STATEMENT_MINUTES)[0].messages[1].content;
        assert!(statement_prompt.contains(r#"{"cut":2,"hold":1,"hike":0,"unknown":0}"#));
        assert!(statement_prompt.contains("2:1"));

        let votes: VoteRecord = run.read_json("votes").await.unwrap().unwrap();
        let preference = &votes.package_preferences[0];
        assert_eq!(preference.package_views.len(), 1);
        assert_eq!(preference.dropped_views.len(), 1);

        let discussion: DiscussionRecord = run.read_json("round_summaries").await.unwrap().unwrap();
        assert_eq!(discussion.rounds.len(), 2);
        assert_eq!(discussion.qa_speeches.len(), 3);
        assert_eq!(discussion.qa_speeches[0].role, Role::Hawk);
        assert!(!discussion.chair_questions.fallback_used);
        assert_eq!(
            discussion.open_questions,
            vec![
                "Question from centrist?",
                "Question from hawk?",
                "Question from dove?",
                "Centrist asks?",
                "What about wages?",
                "Hawk asks?",
                "Dove asks?",
            ]
        );

        let statement = run.read_text("statement").await.unwrap().unwrap();
        assert!(statement.starts_with("# FOMC Statement (Simulated)"));
        let transcript = run.read_text("discussion").await.unwrap().unwrap();
        assert!(transcript.contains("  - Dissent: Preferred to hold."));

        let manifest = run.manifest().await.unwrap();
        assert_eq!(manifest.context["crisis_mode"], false);
        assert_eq!(manifest.context["report_months"]["cpi"], "2024-08");
        assert_eq!(manifest.artifacts["votes"].meta["prompts"][1]["prompt_id"], templates::VOTE);

        let audit = std::fs::read_to_string(run.dir().join(PROMPT_AUDIT_FILE)).unwrap();
        assert_eq!(audit.lines().count(), FULL_RUN_CALLS);
    }

    #[tokio::test]
    async fn test_second_run_is_cached_and_identical() {
        let dir = tempfile::tempdir().unwrap();
        let client = scripted();
        let orchestrator = orchestrator(&dir, &client).await;
        let request = MeetingRequest::new("2024-09");
        let log = JobLog::detached();

        let first = orchestrator.run(&request, &log).await.unwrap();
        let bytes = artifact_bytes(&orchestrator).await;

        let second = orchestrator.run(&request, &log).await.unwrap();
        assert!(second.cached);
        assert_eq!(client.requests().len(), FULL_RUN_CALLS);
        assert_eq!(artifact_bytes(&orchestrator).await, bytes);
        assert_eq!(second.artifacts, first.artifacts);
        assert_eq!(second.vote_summary, "2:1");
    }

    #[tokio::test]
    async fn test_resume_regenerates_only_missing_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let client = scripted();
        let orchestrator = orchestrator(&dir, &client).await;
        let request = MeetingRequest::new("2024-09");
        let log = JobLog::detached();
        orchestrator.run(&request, &log).await.unwrap();

        let run = orchestrator.store().ensure_run("2024-09").await.unwrap();
        let minutes_path = run.artifact_path("minutes_summary", ArtifactFormat::Markdown).unwrap();
        let minutes = std::fs::read(&minutes_path).unwrap();
        std::fs::remove_file(run.artifact_path("statement", ArtifactFormat::Markdown).unwrap()).unwrap();
        std::fs::remove_file(run.artifact_path("discussion", ArtifactFormat::Markdown).unwrap()).unwrap();

        let outcome = orchestrator.run(&request, &log).await.unwrap();
        assert!(!outcome.cached);
        // only the statement call is repeated
        assert_eq!(client.requests().len(), FULL_RUN_CALLS + 1);
        assert_eq!(client.calls(templates::STATEMENT_MINUTES), 2);
        assert!(run.has("discussion", ArtifactFormat::Markdown).await.unwrap());
        assert!(run.has("statement", ArtifactFormat::Markdown).await.unwrap());
        assert_eq!(std::fs::read(&minutes_path).unwrap(), minutes);
    }

    #[tokio::test]
    async fn test_missing_minutes_keep_the_published_statement() {
        let dir = tempfile::tempdir().unwrap();
        let client = scripted();
        let orchestrator = orchestrator(&dir, &client).await;
        let request = MeetingRequest::new("2024-09");
        let log = JobLog::detached();
        orchestrator.run(&request, &log).await.unwrap();

        let run = orchestrator.store().ensure_run("2024-09").await.unwrap();
        let statement_path = run.artifact_path("statement", ArtifactFormat::Markdown).unwrap();
        let statement = std::fs::read_to_string(&statement_path).unwrap();
        let statement_updated = run.manifest().await.unwrap().artifacts["statement"].updated_at;
        std::fs::remove_file(run.artifact_path("minutes_summary", ArtifactFormat::Markdown).unwrap()).unwrap();

        // a rewritten statement in the reply is ignored
        let client = client.always(
            templates::STATEMENT_MINUTES,
            r#"{"statement_md": "A different decision.",
                "minutes_summary_md": "Members discussed the 2:1 decision."}"#,
        );
        let outcome = orchestrator.run(&request, &log).await.unwrap();
        assert!(!outcome.cached);
        assert_eq!(client.calls(templates::STATEMENT_MINUTES), 2);

        assert_eq!(std::fs::read_to_string(&statement_path).unwrap(), statement);
        let manifest = run.manifest().await.unwrap();
        assert_eq!(manifest.artifacts["statement"].updated_at, statement_updated);
        let minutes = run.read_text("minutes_summary").await.unwrap().unwrap();
        assert!(minutes.contains("Members discussed the 2:1 decision."));

        let prompt = &client.requests_for(templates::STATEMENT_MINUTES)[1].messages[1].content;
        assert!(prompt.contains("already published"));
        assert!(prompt.contains("The Committee decided by a vote of 2:1 to lower the target range."));
    }

    #[tokio::test]
    async fn test_corrupt_artifact_is_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let client = scripted();
        let orchestrator = orchestrator(&dir, &client).await;
        let request = MeetingRequest::new("2024-09");
        let log = JobLog::detached();
        orchestrator.run(&request, &log).await.unwrap();

        let run = orchestrator.store().ensure_run("2024-09").await.unwrap();
        let votes_path = run.artifact_path("votes", ArtifactFormat::Json).unwrap();
        std::fs::write(&votes_path, "{ truncated").unwrap();
        assert!(run.read_json::<VoteRecord>("votes").await.is_err());

        let outcome = orchestrator.run(&request, &log).await.unwrap();
        assert!(!outcome.cached);
        assert_eq!(outcome.vote_summary, "2:1");
        // upstream artifacts are reused; votes and the drafts after them are redone
        assert_eq!(client.calls(templates::BLACKBOARD), 1);
        assert_eq!(client.calls(templates::CHAIR_PACKAGES), 1);
        assert_eq!(client.calls(templates::VOTE), 6);
        assert_eq!(client.calls(templates::PACKAGE_PREFERENCE), 6);
        assert_eq!(client.calls(templates::STATEMENT_MINUTES), 2);

        let votes: VoteRecord = run.read_json("votes").await.unwrap().unwrap();
        assert_eq!(votes.votes.len(), 3);

        let again = orchestrator.run(&request, &log).await.unwrap();
        assert!(again.cached);
    }

    #[tokio::test]
    async fn test_cached_run_without_recorded_crisis_flag_reclassifies() {
        let dir = tempfile::tempdir().unwrap();
        let client = scripted().always(
            templates::BLACKBOARD,
            r#"{"facts": [{"text": "The Fed held an emergency meeting after a bank run.", "source": "macro"}]}"#,
        );
        let orchestrator = orchestrator(&dir, &client).await;
        let request = MeetingRequest::new("2024-09");
        let log = JobLog::detached();
        assert!(orchestrator.run(&request, &log).await.unwrap().crisis_mode);

        let run = orchestrator.store().ensure_run("2024-09").await.unwrap();
        let mut context = run.manifest().await.unwrap().context;
        context.remove("crisis_mode");
        run.set_context(context).await.unwrap();

        let outcome = orchestrator.run(&request, &log).await.unwrap();
        assert!(outcome.cached);
        assert!(outcome.crisis_mode);
        assert_eq!(client.requests().len(), FULL_RUN_CALLS);
    }

    #[tokio::test]
    async fn test_refresh_regenerates_everything() {
        let dir = tempfile::tempdir().unwrap();
        let client = scripted();
        let orchestrator = orchestrator(&dir, &client).await;
        let log = JobLog::detached();

        orchestrator.run(&MeetingRequest::new("2024-09"), &log).await.unwrap();
        let outcome = orchestrator
            .run(&MeetingRequest::new("2024-09").with_refresh(true), &log)
            .await
            .unwrap();
        assert!(!outcome.cached);
        assert_eq!(client.requests().len(), 2 * FULL_RUN_CALLS);
    }

    #[tokio::test]
    async fn test_crisis_mode_widens_the_vote_domain() {
        let dir = tempfile::tempdir().unwrap();
        let client = scripted()
            .always(
                templates::BLACKBOARD,
                r#"{"facts": [{"text": "The Fed held an emergency meeting after a bank run.", "source": "macro"}]}"#,
            )
            .always("meeting_vote:dove", &vote(-50, false));
        let orchestrator = orchestrator(&dir, &client).await;

        let outcome = orchestrator
            .run(&MeetingRequest::new("2024-09"), &JobLog::detached())
            .await
            .unwrap();
        assert!(outcome.crisis_mode);
        assert_eq!(outcome.tally.cut, 2);

        let run = orchestrator.store().ensure_run("2024-09").await.unwrap();
        let votes: VoteRecord = run.read_json("votes").await.unwrap().unwrap();
        let dove = votes.votes.iter().find(|v| v.role == Role::Dove).unwrap();
        assert_eq!(dove.vote_delta_bps, -50);
        assert_eq!(dove.invalid_vote_reason, None);

        let widened = serde_json::to_string(allowed_deltas(true)).unwrap();
        let stance_prompt = &client.requests_for(templates::STANCE_CARD)[0].messages[1].content;
        assert!(stance_prompt.contains(&widened));
        assert_eq!(run.manifest().await.unwrap().context["crisis_mode"], true);
    }

    #[tokio::test]
    async fn test_out_of_domain_vote_outside_crisis_is_coerced() {
        let dir = tempfile::tempdir().unwrap();
        let client = scripted().always("meeting_vote:dove", &vote(-50, false));
        let orchestrator = orchestrator(&dir, &client).await;

        let outcome = orchestrator
            .run(&MeetingRequest::new("2024-09"), &JobLog::detached())
            .await
            .unwrap();
        // dove's -50 became a hold
        assert_eq!(outcome.tally.hold, 2);
        assert_eq!(outcome.vote_summary, "2:1");
    }

    #[tokio::test]
    async fn test_chair_fallback_questions_are_answered() {
        let dir = tempfile::tempdir().unwrap();
        let client = scripted().always(templates::CHAIR_QUESTIONS, r#"{"directed_questions": []}"#);
        let orchestrator = orchestrator(&dir, &client).await;

        orchestrator
            .run(&MeetingRequest::new("2024-09"), &JobLog::detached())
            .await
            .unwrap();

        let run = orchestrator.store().ensure_run("2024-09").await.unwrap();
        let discussion: DiscussionRecord = run.read_json("round_summaries").await.unwrap().unwrap();
        assert!(discussion.chair_questions.fallback_used);
        let roles: Vec<Role> = discussion.qa_speeches.iter().map(|s| s.role).collect();
        assert_eq!(
            roles,
            vec![Role::Centrist, Role::Hawk, Role::Dove, Role::Centrist, Role::Hawk, Role::Dove]
        );
        assert_eq!(
            discussion.qa_speeches[0].question.as_deref(),
            Some("Question from centrist?")
        );
    }

    #[tokio::test]
    async fn test_unparseable_blackboard_fails_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let client = scripted().always(templates::BLACKBOARD, "Sorry, no JSON today.");
        let orchestrator = orchestrator(&dir, &client).await;

        let registry = JobRegistry::new();
        let id = orchestrator
            .clone()
            .spawn_job(&registry, MeetingRequest::new("2024-09"));
        let job = registry.wait(id).await.unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("2024-09"));
        assert_eq!(client.calls(templates::BLACKBOARD), 2);
        let run = orchestrator.store().ensure_run("2024-09").await.unwrap();
        assert!(!run.has("blackboard", ArtifactFormat::Json).await.unwrap());
    }

    #[test]
    fn test_open_question_pool_dedupes_and_caps() {
        let speech = |role: Role, q: Option<&str>| Speech {
            role,
            phase: SpeechPhase::OpeningStatements,
            speech_md: String::new(),
            cited_facts: Vec::new(),
            cited_uncertainties: Vec::new(),
            ask_one_question: q.map(str::to_string),
            question: None,
            citation_error: None,
        };
        let speeches = vec![
            speech(Role::Centrist, Some("Why  now?")),
            speech(Role::Hawk, None),
            speech(Role::Dove, Some("Why now?")),
        ];
        let mut cards = StanceCards::new();
        let card: crate::meeting::records::StanceCard = serde_json::from_value(json!({
            "role": "hawk",
            "preferred_delta_bps": 0,
            "questions_to_ask": ["q1", "q2", "q3"]
        }))
        .unwrap();
        cards.insert(Role::Hawk, card);

        assert_eq!(open_question_pool(&speeches, &cards), vec!["Why now?", "q1", "q2"]);

        let many: Vec<Speech> = (0..15)
            .map(|i| speech(Role::Dove, Some(&format!("Q{}?", i))))
            .collect();
        assert_eq!(open_question_pool(&many, &StanceCards::new()).len(), OPEN_QUESTION_POOL);
    }
}
