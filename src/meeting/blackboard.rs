//! The shared blackboard: facts, uncertainties, policy menu and drafting slots
//!
//! Built once per run from the briefing materials and read-only afterwards.
//! Every citation in the meeting refers to an ID on this blackboard.

use crate::config::SimulationSettings;
use crate::error::{Error, Result};
use crate::json::{self, Object};
use crate::meeting::generation::{templates, MeetingGenerator, Sampling};
use crate::meeting::roles::NORMAL_DELTAS_BPS;
use crate::prompts::PromptVars;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

/// Phrases that mark a fact as describing a crisis
pub const DEFAULT_CRISIS_KEYWORDS: &[&str] = &[
    "emergency",
    "crisis",
    "crash",
    "liquidity freeze",
    "bank run",
];

/// Briefing document kind, also the fact source tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Macro-event summary
    Macro,
    /// Labor market report
    Nfp,
    /// Inflation report
    Cpi,
    /// Policy-rule model summary
    Taylor,
}

impl SourceKind {
    /// Every kind, in prompt order
    pub const ALL: [SourceKind; 4] = [Self::Macro, Self::Nfp, Self::Cpi, Self::Taylor];

    /// Lowercase identifier, also the artifact name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Macro => "macro",
            Self::Nfp => "nfp",
            Self::Cpi => "cpi",
            Self::Taylor => "taylor",
        }
    }

    /// Characters of the document kept in the blackboard prompt
    pub fn char_budget(self) -> usize {
        match self {
            Self::Taylor => 6_000,
            _ => 12_000,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "macro" => Ok(Self::Macro),
            "nfp" => Ok(Self::Nfp),
            "cpi" => Ok(Self::Cpi),
            "taylor" => Ok(Self::Taylor),
            other => Err(Error::invalid_input(format!("unknown source kind: {}", other))),
        }
    }
}

/// Statement section a drafting slot belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKey {
    /// Economic activity
    EconomicActivity,
    /// Labor market
    Labor,
    /// Inflation
    Inflation,
    /// Financial conditions
    FinancialConditions,
    /// Risks to the outlook
    Risks,
    /// The rate decision
    PolicyDecision,
    /// Forward guidance
    ForwardGuidance,
    /// Balance sheet
    BalanceSheet,
}

impl SlotKey {
    /// Every slot, in statement order
    pub const ALL: [SlotKey; 8] = [
        Self::EconomicActivity,
        Self::Labor,
        Self::Inflation,
        Self::FinancialConditions,
        Self::Risks,
        Self::PolicyDecision,
        Self::ForwardGuidance,
        Self::BalanceSheet,
    ];

    /// Parse a snake_case slot key
    pub fn parse(s: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(s.trim().to_string())).ok()
    }
}

/// A citable fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    /// `F01`, `F02`, ...
    pub id: String,
    /// One-sentence statement
    pub text: String,
    /// Document it came from
    pub source: SourceKind,
}

/// A citable open issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uncertainty {
    /// `U01`, `U02`, ...
    pub id: String,
    /// One-sentence statement
    pub text: String,
}

/// An option on the policy menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOption {
    /// `cut_25`, `hold` or `hike_25`
    pub key: String,
    /// Rate move in basis points
    pub delta_bps: i32,
    /// Display label
    pub label: String,
}

/// Drafting guidance for one statement section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementSlot {
    /// Section
    pub key: SlotKey,
    /// Guidance, possibly empty
    pub guidance: String,
}

/// Ground rules shown to every agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackboardRules {
    /// Arguments must cite blackboard IDs
    pub facts_must_be_cited: bool,
    /// Vote domain outside crisis mode
    pub allowed_vote_deltas_bps: Vec<i32>,
}

impl Default for BlackboardRules {
    fn default() -> Self {
        Self {
            facts_must_be_cited: true,
            allowed_vote_deltas_bps: NORMAL_DELTAS_BPS.to_vec(),
        }
    }
}

/// Shared ledger for one meeting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blackboard {
    /// Meeting identifier
    pub meeting_id: String,
    /// Facts, IDs sequential from `F01`
    pub facts: Vec<Fact>,
    /// Uncertainties, IDs sequential from `U01`
    pub uncertainties: Vec<Uncertainty>,
    /// Options on the table
    pub policy_menu: Vec<PolicyOption>,
    /// Drafting slots for the statement
    pub draft_statement_slots: Vec<StatementSlot>,
    /// Ground rules
    #[serde(default)]
    pub rules: BlackboardRules,
}

impl Blackboard {
    /// Whether a fact ID exists
    pub fn has_fact(&self, id: &str) -> bool {
        self.facts.iter().any(|f| f.id == id)
    }

    /// Whether an uncertainty ID exists
    pub fn has_uncertainty(&self, id: &str) -> bool {
        self.uncertainties.iter().any(|u| u.id == id)
    }

    /// Distinct deltas on the policy menu
    pub fn menu_deltas(&self) -> BTreeSet<i32> {
        self.policy_menu.iter().map(|o| o.delta_bps).collect()
    }

    /// Post-process a generator extraction into a blackboard.
    ///
    /// Drops facts with an unknown source or empty text, keeps menu entries
    /// only for the three standard moves, keeps slots only for known keys,
    /// and substitutes defaults for an empty menu or slot list. IDs are
    /// assigned after filtering so they stay gap-free.
    pub fn from_extraction(
        meeting_id: &str,
        obj: &Object,
        max_facts: usize,
        max_uncertainties: usize,
    ) -> Self {
        let facts: Vec<Fact> = json::list(obj.get("facts"))
            .into_iter()
            .filter_map(|item| {
                let text = json::normalize_ws(&json::text(item.get("text")));
                let source = json::text(item.get("source")).parse::<SourceKind>().ok()?;
                (!text.is_empty()).then_some((text, source))
            })
            .take(max_facts)
            .enumerate()
            .map(|(i, (text, source))| Fact {
                id: format!("F{:02}", i + 1),
                text,
                source,
            })
            .collect();

        let uncertainties: Vec<Uncertainty> = json::list(obj.get("uncertainties"))
            .into_iter()
            .map(|item| json::normalize_ws(&json::text(item.get("text"))))
            .filter(|text| !text.is_empty())
            .take(max_uncertainties)
            .enumerate()
            .map(|(i, text)| Uncertainty {
                id: format!("U{:02}", i + 1),
                text,
            })
            .collect();

        let mut policy_menu: Vec<PolicyOption> = Vec::new();
        for item in json::list(obj.get("policy_menu")) {
            let key = json::text(item.get("key"));
            let Some(delta_bps) = json::int(item.get("delta_bps")) else {
                continue;
            };
            let standard = matches!(
                (key.as_str(), delta_bps),
                ("cut_25", -25) | ("hold", 0) | ("hike_25", 25)
            );
            if !standard || policy_menu.iter().any(|o| o.key == key) {
                continue;
            }
            let label = Some(json::text(item.get("label")))
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| key.clone());
            policy_menu.push(PolicyOption {
                key,
                delta_bps: delta_bps as i32,
                label,
            });
        }
        if policy_menu.is_empty() {
            policy_menu = default_policy_menu();
        }

        let mut slots: BTreeMap<SlotKey, String> = BTreeMap::new();
        for item in json::list(obj.get("draft_statement_slots")) {
            if let Some(key) = SlotKey::parse(&json::text(item.get("key"))) {
                slots
                    .entry(key)
                    .or_insert_with(|| json::text(item.get("guidance")));
            }
        }
        let draft_statement_slots = if slots.is_empty() {
            SlotKey::ALL
                .iter()
                .map(|&key| StatementSlot {
                    key,
                    guidance: String::new(),
                })
                .collect()
        } else {
            slots
                .into_iter()
                .map(|(key, guidance)| StatementSlot { key, guidance })
                .collect()
        };

        Self {
            meeting_id: meeting_id.to_string(),
            facts,
            uncertainties,
            policy_menu,
            draft_statement_slots,
            rules: BlackboardRules::default(),
        }
    }
}

/// Menu used when extraction yields no valid option
pub fn default_policy_menu() -> Vec<PolicyOption> {
    [("cut_25", -25, "Cut 25bp"), ("hold", 0, "Hold"), ("hike_25", 25, "Hike 25bp")]
        .into_iter()
        .map(|(key, delta_bps, label)| PolicyOption {
            key: key.to_string(),
            delta_bps,
            label: label.to_string(),
        })
        .collect()
}

/// Briefing documents for one meeting
#[derive(Debug, Clone, Default)]
pub struct BriefingMaterials {
    docs: BTreeMap<SourceKind, String>,
}

impl BriefingMaterials {
    /// No documents
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a document
    pub fn with(mut self, kind: SourceKind, text: impl Into<String>) -> Self {
        self.insert(kind, text);
        self
    }

    /// Add or replace a document
    pub fn insert(&mut self, kind: SourceKind, text: impl Into<String>) {
        self.docs.insert(kind, text.into());
    }

    /// Document text, empty when absent
    pub fn get(&self, kind: SourceKind) -> &str {
        self.docs.get(&kind).map(|s| s.trim()).unwrap_or_default()
    }

    /// Document text cut to its character budget
    pub fn truncated(&self, kind: SourceKind) -> String {
        self.get(kind).chars().take(kind.char_budget()).collect()
    }

    /// Kinds with non-empty text
    pub fn present(&self) -> Vec<SourceKind> {
        SourceKind::ALL
            .into_iter()
            .filter(|&k| !self.get(k).is_empty())
            .collect()
    }
}

/// Turns briefing materials into a blackboard through one generation call
pub struct BlackboardBuilder<'a> {
    generator: &'a MeetingGenerator,
    max_facts: usize,
    max_uncertainties: usize,
}

impl<'a> BlackboardBuilder<'a> {
    /// Create a builder with the configured caps
    pub fn new(generator: &'a MeetingGenerator, settings: &SimulationSettings) -> Self {
        Self {
            generator,
            max_facts: settings.max_facts,
            max_uncertainties: settings.max_uncertainties,
        }
    }

    /// Build the blackboard.
    ///
    /// Any failure, including output that stays unparseable after the
    /// corrective retry, surfaces as [`Error::BlackboardBuild`].
    pub async fn build(&self, materials: &BriefingMaterials) -> Result<Blackboard> {
        let meeting_id = self.generator.meeting_id();

        let mut vars = PromptVars::new()
            .set("meeting_id", meeting_id)
            .set("max_facts", self.max_facts)
            .set("max_uncertainties", self.max_uncertainties);
        for kind in SourceKind::ALL {
            vars = vars.set(kind.as_str(), materials.truncated(kind));
        }

        let generated = self
            .generator
            .generate_json("blackboard", templates::BLACKBOARD, &vars, Sampling::BLACKBOARD)
            .await
            .map_err(|e| Error::blackboard_build(meeting_id, e))?;

        let blackboard = Blackboard::from_extraction(
            meeting_id,
            &generated,
            self.max_facts,
            self.max_uncertainties,
        );
        tracing::info!(
            "[{}] blackboard: {} facts, {} uncertainties, {} menu options",
            meeting_id,
            blackboard.facts.len(),
            blackboard.uncertainties.len(),
            blackboard.policy_menu.len()
        );
        Ok(blackboard)
    }
}

/// Decides whether a run is in crisis mode
pub trait CrisisClassifier: Send + Sync {
    /// True when the blackboard describes a crisis
    fn classify(&self, blackboard: &Blackboard) -> bool;
}

/// Case-insensitive keyword match over fact text
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    keywords: Vec<String>,
}

impl KeywordClassifier {
    /// Classifier over the given phrases
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        Self { keywords }
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_CRISIS_KEYWORDS)
    }
}

impl CrisisClassifier for KeywordClassifier {
    fn classify(&self, blackboard: &Blackboard) -> bool {
        blackboard.facts.iter().any(|fact| {
            let text = fact.text.to_lowercase();
            self.keywords.iter().any(|k| text.contains(k.as_str()))
        })
    }
}

/// Crisis mode under the default keyword list
pub fn infer_crisis_mode(blackboard: &Blackboard) -> bool {
    KeywordClassifier::default().classify(blackboard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{generator_with, ScriptedClient};
    use serde_json::json;

    fn object(value: serde_json::Value) -> Object {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_extraction_filters_and_numbers_facts() {
        let obj = object(json!({
            "facts": [
                {"text": "Payrolls rose  150k.", "source": "NFP"},
                {"text": "Made up", "source": "twitter"},
                {"text": "   ", "source": "cpi"},
                "not an object",
                {"text": "Core CPI 0.3% m/m.", "source": "cpi"},
                {"text": "Rule implies 4.9%.", "source": "taylor"}
            ],
            "uncertainties": [{"text": "Tariff pass-through"}, {"text": ""}, {"text": "Labor supply"}]
        }));

        let bb = Blackboard::from_extraction("m1", &obj, 2, 8);
        let ids: Vec<&str> = bb.facts.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["F01", "F02"]);
        assert_eq!(bb.facts[0].text, "Payrolls rose 150k.");
        assert_eq!(bb.facts[0].source, SourceKind::Nfp);
        assert_eq!(bb.facts[1].source, SourceKind::Cpi);
        assert_eq!(bb.uncertainties.len(), 2);
        assert_eq!(bb.uncertainties[1].id, "U02");
    }

    #[test]
    fn test_defaults_for_missing_menu_and_slots() {
        let bb = Blackboard::from_extraction("m1", &object(json!({"facts": []})), 28, 8);
        assert_eq!(bb.policy_menu, default_policy_menu());
        assert_eq!(bb.draft_statement_slots.len(), 8);
        assert!(bb.draft_statement_slots.iter().all(|s| s.guidance.is_empty()));
        assert_eq!(bb.rules.allowed_vote_deltas_bps, vec![-25, 0, 25]);
    }

    #[test]
    fn test_invalid_menu_entries_are_discarded() {
        let obj = object(json!({
            "policy_menu": [
                {"key": "cut_50", "delta_bps": -50, "label": "Cut 50"},
                {"key": "hold", "delta_bps": "0"},
                {"key": "hike_25", "delta_bps": 50},
                {"key": "hold", "delta_bps": 0, "label": "dup"}
            ],
            "draft_statement_slots": [
                {"key": "inflation", "guidance": "Note core goods."},
                {"key": "weather", "guidance": "?"}
            ]
        }));
        let bb = Blackboard::from_extraction("m1", &obj, 28, 8);
        assert_eq!(bb.policy_menu.len(), 1);
        assert_eq!(bb.policy_menu[0].label, "hold");
        assert_eq!(bb.menu_deltas().into_iter().collect::<Vec<_>>(), vec![0]);
        assert_eq!(bb.draft_statement_slots.len(), 1);
        assert_eq!(bb.draft_statement_slots[0].key, SlotKey::Inflation);
    }

    #[test]
    fn test_materials_are_truncated_by_budget() {
        let materials = BriefingMaterials::new()
            .with(SourceKind::Taylor, "x".repeat(7_000))
            .with(SourceKind::Cpi, "é".repeat(13_000));
        assert_eq!(materials.truncated(SourceKind::Taylor).chars().count(), 6_000);
        assert_eq!(materials.truncated(SourceKind::Cpi).chars().count(), 12_000);
        assert_eq!(materials.truncated(SourceKind::Macro), "");
        assert_eq!(materials.present(), vec![SourceKind::Cpi, SourceKind::Taylor]);
    }

    #[test]
    fn test_crisis_keywords() {
        let mut bb = Blackboard::from_extraction("m1", &object(json!({})), 28, 8);
        assert!(!infer_crisis_mode(&bb));

        bb.facts.push(Fact {
            id: "F01".to_string(),
            text: "Regional banks faced a Liquidity Freeze in March.".to_string(),
            source: SourceKind::Macro,
        });
        assert!(infer_crisis_mode(&bb));
        assert!(!KeywordClassifier::new(["pandemic"]).classify(&bb));
    }

    #[tokio::test]
    async fn test_build_sends_truncated_materials() {
        let client = ScriptedClient::new().always(
            templates::BLACKBOARD,
            r#"{"facts":[{"text":"GDP grew 2.8%.","source":"macro"}]}"#,
        );
        let generator = generator_with(&client, "2024-09");
        let builder = BlackboardBuilder::new(&generator, &SimulationSettings::default());

        let materials = BriefingMaterials::new()
            .with(SourceKind::Macro, "GDP grew 2.8% in Q2.")
            .with(SourceKind::Taylor, "t".repeat(6_500));
        let bb = builder.build(&materials).await.unwrap();

        assert_eq!(bb.meeting_id, "2024-09");
        assert_eq!(bb.facts.len(), 1);
        let prompt = &client.requests()[0].messages[1].content;
        assert!(prompt.contains("GDP grew 2.8% in Q2."));
        assert!(prompt.contains(&"t".repeat(6_000)));
        assert!(!prompt.contains(&"t".repeat(6_001)));
    }

    #[tokio::test]
    async fn test_unparseable_output_is_a_build_error() {
        let client = ScriptedClient::new().always(templates::BLACKBOARD, "I cannot help with that.");
        let generator = generator_with(&client, "2024-09");
        let builder = BlackboardBuilder::new(&generator, &SimulationSettings::default());

        let err = builder.build(&BriefingMaterials::new()).await.unwrap_err();
        assert!(matches!(err, Error::BlackboardBuild { ref meeting_id, .. } if meeting_id == "2024-09"));
        // one call plus one corrective retry
        assert_eq!(client.calls(templates::BLACKBOARD), 2);
    }
}
