//! Versioned prompt templates
//!
//! A template is a Markdown file with optional YAML front matter:
//!
//! ```text
//! ---
//! prompt_id: meeting_vote
//! prompt_version: "2025-01-15"
//! system_prompt: |
//!   You are a committee member...
//! ---
//! Body with $placeholders or ${placeholders}.
//! ```
//!
//! Rendering is a safe substitution: `$$` yields `$` and placeholders with no
//! value in the context are left as written.

use crate::config::StorageSettings;
use crate::error::{Error, Result};
use crate::types::PromptIdentity;
use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::path::Path;

const PLACEHOLDER_PATTERN: &str =
    r"\$(?:(\$)|([_a-zA-Z][_a-zA-Z0-9]*)|\{([_a-zA-Z][_a-zA-Z0-9]*)\})";

/// Templates compiled into the binary, keyed by file stem
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (
        "meeting_blackboard",
        include_str!("../prompts/meetings/meeting_blackboard.md"),
    ),
    (
        "meeting_stance_card",
        include_str!("../prompts/meetings/meeting_stance_card.md"),
    ),
    (
        "meeting_public_speech",
        include_str!("../prompts/meetings/meeting_public_speech.md"),
    ),
    (
        "meeting_chair_questions",
        include_str!("../prompts/meetings/meeting_chair_questions.md"),
    ),
    (
        "meeting_chair_packages",
        include_str!("../prompts/meetings/meeting_chair_packages.md"),
    ),
    (
        "meeting_package_preference",
        include_str!("../prompts/meetings/meeting_package_preference.md"),
    ),
    (
        "meeting_vote",
        include_str!("../prompts/meetings/meeting_vote.md"),
    ),
    (
        "meeting_secretary_round",
        include_str!("../prompts/meetings/meeting_secretary_round.md"),
    ),
    (
        "meeting_statement_minutes",
        include_str!("../prompts/meetings/meeting_statement_minutes.md"),
    ),
];

/// Values substituted into a template
#[derive(Debug, Clone, Default)]
pub struct PromptVars(BTreeMap<String, String>);

impl PromptVars {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value
    pub fn set(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.0.insert(key.into(), value.to_string());
        self
    }

    /// Set a value serialised as compact JSON
    pub fn set_json<T: serde::Serialize + ?Sized>(self, key: impl Into<String>, value: &T) -> Result<Self> {
        let json = serde_json::to_string(value)?;
        Ok(self.set(key, json))
    }

    /// Look up a value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    prompt_id: Option<serde_yaml::Value>,
    prompt_version: Option<serde_yaml::Value>,
    system_prompt: Option<String>,
}

fn scalar(value: Option<serde_yaml::Value>) -> Option<String> {
    let text = match value? {
        serde_yaml::Value::String(s) => s.trim().to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    Some(text).filter(|s| !s.is_empty())
}

/// A loaded prompt template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    /// Template identifier (front matter, else file stem)
    pub prompt_id: String,
    /// Template version (front matter, else `unknown`)
    pub prompt_version: String,
    /// System message sent with every rendering
    pub system_prompt: String,
    /// User message body with placeholders
    pub body: String,
}

impl PromptTemplate {
    /// Parse a template file's contents
    pub fn parse(stem: &str, raw: &str) -> Result<Self> {
        let raw = raw.replace("\r\n", "\n");
        let (front, body) = split_front_matter(&raw);

        let meta: FrontMatter = match front {
            Some(header) if !header.trim().is_empty() => serde_yaml::from_str(header)
                .map_err(|e| Error::template(format!("{}: malformed front matter: {}", stem, e)))?,
            _ => FrontMatter::default(),
        };

        Ok(Self {
            prompt_id: scalar(meta.prompt_id).unwrap_or_else(|| stem.to_string()),
            prompt_version: scalar(meta.prompt_version).unwrap_or_else(|| "unknown".to_string()),
            system_prompt: meta.system_prompt.unwrap_or_default().trim().to_string(),
            body: body.trim().to_string(),
        })
    }

    /// Identity recorded with generated artifacts
    pub fn identity(&self) -> PromptIdentity {
        PromptIdentity {
            prompt_id: self.prompt_id.clone(),
            prompt_version: self.prompt_version.clone(),
        }
    }
}

fn split_front_matter(raw: &str) -> (Option<&str>, &str) {
    let Some(rest) = raw.strip_prefix("---\n") else {
        return (None, raw);
    };
    match rest.find("\n---\n") {
        Some(end) => (Some(&rest[..end]), &rest[end + "\n---\n".len()..]),
        None => match rest.strip_suffix("\n---") {
            Some(header) => (Some(header), ""),
            None => (None, raw),
        },
    }
}

/// Set of templates available to the meeting agents
#[derive(Debug, Clone)]
pub struct PromptStore {
    templates: HashMap<String, PromptTemplate>,
    placeholder: Regex,
}

impl PromptStore {
    /// Store with only the built-in templates
    pub fn builtin() -> Result<Self> {
        let placeholder = Regex::new(PLACEHOLDER_PATTERN)
            .map_err(|e| Error::template(format!("placeholder pattern: {}", e)))?;

        let mut templates = HashMap::new();
        for &(stem, raw) in BUILTIN_TEMPLATES {
            templates.insert(stem.to_string(), PromptTemplate::parse(stem, raw)?);
        }

        Ok(Self { templates, placeholder })
    }

    /// Built-in templates overlaid with every `*.md` file in `dir`
    pub fn with_overrides(dir: &Path) -> Result<Self> {
        let mut store = Self::builtin()?;

        let entries = std::fs::read_dir(dir).map_err(|e| {
            Error::template(format!("cannot read prompt directory {}: {}", dir.display(), e))
        })?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let raw = std::fs::read_to_string(&path)?;
            let template = PromptTemplate::parse(stem, &raw)?;
            tracing::debug!("prompt override {} from {}", template.identity(), path.display());
            store.templates.insert(stem.to_string(), template);
        }

        Ok(store)
    }

    /// Store per the storage settings
    pub fn from_settings(settings: &StorageSettings) -> Result<Self> {
        match &settings.prompt_dir {
            Some(dir) => Self::with_overrides(dir),
            None => Self::builtin(),
        }
    }

    /// Look up a template by name
    pub fn get(&self, name: &str) -> Result<&PromptTemplate> {
        self.templates
            .get(name)
            .ok_or_else(|| Error::template(format!("no template named {}", name)))
    }

    /// Identity of a template
    pub fn identity(&self, name: &str) -> Result<PromptIdentity> {
        Ok(self.get(name)?.identity())
    }

    /// Template names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Render the named template's body
    pub fn render(&self, name: &str, vars: &PromptVars) -> Result<String> {
        let template = self.get(name)?;
        Ok(self.substitute(&template.body, vars))
    }

    fn substitute(&self, body: &str, vars: &PromptVars) -> String {
        self.placeholder
            .replace_all(body, |caps: &Captures| {
                if caps.get(1).is_some() {
                    return "$".to_string();
                }
                caps.get(2)
                    .or_else(|| caps.get(3))
                    .and_then(|name| vars.get(name.as_str()))
                    .map(str::to_string)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_templates_load() {
        let store = PromptStore::builtin().unwrap();
        assert_eq!(store.names().len(), 9);
        for name in store.names() {
            let template = store.get(name).unwrap();
            assert_eq!(template.prompt_id, name);
            assert_ne!(template.prompt_version, "unknown");
            assert!(!template.system_prompt.is_empty(), "{} has no system prompt", name);
        }
    }

    #[test]
    fn test_front_matter_defaults() {
        let t = PromptTemplate::parse("plain", "Hello $name").unwrap();
        assert_eq!(t.prompt_id, "plain");
        assert_eq!(t.prompt_version, "unknown");
        assert_eq!(t.system_prompt, "");

        let t = PromptTemplate::parse(
            "x",
            "---\nprompt_id: custom\nprompt_version: 2\nsystem_prompt: |\n  Be brief.\n  Cite facts.\n---\nBody\n",
        )
        .unwrap();
        assert_eq!(t.identity().to_string(), "custom@2");
        assert_eq!(t.system_prompt, "Be brief.\nCite facts.");
        assert_eq!(t.body, "Body");
    }

    #[test]
    fn test_malformed_front_matter_is_fatal() {
        let err = PromptTemplate::parse("bad", "---\nprompt_id: [unclosed\n---\nBody").unwrap_err();
        assert!(matches!(err, Error::Template(_)));
    }

    #[test]
    fn test_safe_substitution() {
        let store = PromptStore::builtin().unwrap();
        let vars = PromptVars::new().set("role", "hawk").set("n", 3);
        let out = store.substitute("  $role costs $$5, ${n} times; $missing and ${missing} stay; $ alone  ", &vars);
        assert_eq!(out, "hawk costs $5, 3 times; $missing and ${missing} stay; $ alone");
    }

    #[test]
    fn test_missing_template_is_an_error() {
        let store = PromptStore::builtin().unwrap();
        assert!(matches!(store.get("meeting_nope"), Err(Error::Template(_))));
    }

    #[test]
    fn test_directory_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("meeting_vote.md"),
            "---\nprompt_id: meeting_vote\nprompt_version: local\nsystem_prompt: Vote.\n---\nVote as $role_role.",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = PromptStore::with_overrides(dir.path()).unwrap();
        assert_eq!(store.names().len(), 9);
        assert_eq!(store.identity("meeting_vote").unwrap().prompt_version, "local");
        let vars = PromptVars::new().set("role_role", "dove");
        assert_eq!(store.render("meeting_vote", &vars).unwrap(), "Vote as dove.");
    }
}
