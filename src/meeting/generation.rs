//! One templated, JSON-producing generation call
//!
//! Every agent call goes through [`MeetingGenerator::generate_json`]: render
//! the template, send `[system, user]`, parse one JSON object with a single
//! corrective re-prompt, and append an audit record.

use crate::chat::{CompletionRequest, Message};
use crate::error::Result;
use crate::json::{self, Object};
use crate::llm_client::LlmClient;
use crate::prompts::{PromptStore, PromptVars};
use crate::storage::{PromptAudit, PromptRunRecord};
use chrono::Utc;
use std::sync::Arc;

/// Corrective re-prompts allowed per call
pub const CORRECTIVE_RETRIES: usize = 1;

/// Built-in template names
pub mod templates {
    /// Blackboard extraction
    pub const BLACKBOARD: &str = "meeting_blackboard";
    /// Private stance card
    pub const STANCE_CARD: &str = "meeting_stance_card";
    /// Opening statement or directed answer
    pub const PUBLIC_SPEECH: &str = "meeting_public_speech";
    /// Chair question selection
    pub const CHAIR_QUESTIONS: &str = "meeting_chair_questions";
    /// Chair package proposal
    pub const CHAIR_PACKAGES: &str = "meeting_chair_packages";
    /// Per-role package views
    pub const PACKAGE_PREFERENCE: &str = "meeting_package_preference";
    /// Formal vote
    pub const VOTE: &str = "meeting_vote";
    /// Secretary round summary
    pub const SECRETARY_ROUND: &str = "meeting_secretary_round";
    /// Statement and minutes
    pub const STATEMENT_MINUTES: &str = "meeting_statement_minutes";
}

/// Sampling parameters for one call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    /// Temperature
    pub temperature: f32,
    /// Token limit
    pub max_tokens: u32,
}

impl Sampling {
    const fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }

    /// Blackboard extraction
    pub const BLACKBOARD: Sampling = Sampling::new(0.2, 1800);
    /// Stance card
    pub const STANCE_CARD: Sampling = Sampling::new(0.25, 1200);
    /// Public speech
    pub const SPEECH: Sampling = Sampling::new(0.35, 900);
    /// Chair questions
    pub const CHAIR_QUESTIONS: Sampling = Sampling::new(0.25, 900);
    /// Chair packages
    pub const CHAIR_PACKAGES: Sampling = Sampling::new(0.2, 900);
    /// Package preference
    pub const PACKAGE_PREFERENCE: Sampling = Sampling::new(0.25, 900);
    /// Vote
    pub const VOTE: Sampling = Sampling::new(0.25, 700);
    /// Secretary summary
    pub const SECRETARY: Sampling = Sampling::new(0.2, 900);
    /// Statement and minutes
    pub const STATEMENT: Sampling = Sampling::new(0.25, 2000);
}

/// Shared generation context for one meeting run
#[derive(Clone)]
pub struct MeetingGenerator {
    client: Arc<dyn LlmClient>,
    prompts: Arc<PromptStore>,
    model: String,
    meeting_id: String,
    audit: Option<PromptAudit>,
}

impl MeetingGenerator {
    /// Create a generator without an audit log
    pub fn new(
        client: Arc<dyn LlmClient>,
        prompts: Arc<PromptStore>,
        model: impl Into<String>,
        meeting_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            prompts,
            model: model.into(),
            meeting_id: meeting_id.into(),
            audit: None,
        }
    }

    /// Record every call in `audit`
    pub fn with_audit(mut self, audit: PromptAudit) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Meeting this generator serves
    pub fn meeting_id(&self) -> &str {
        &self.meeting_id
    }

    /// Template store in use
    pub fn prompts(&self) -> &PromptStore {
        &self.prompts
    }

    /// Render `template`, generate, and parse one JSON object.
    ///
    /// `agent_role` names the caller (`blackboard`, `chair`, `secretary` or a
    /// role) in logs and the audit record; requests are labelled
    /// `<template>:<agent_role>`.
    pub async fn generate_json(
        &self,
        agent_role: &str,
        template: &str,
        vars: &PromptVars,
        sampling: Sampling,
    ) -> Result<Object> {
        let prompt = self.prompts.get(template)?;
        let user_prompt = self.prompts.render(template, vars)?;
        let label = format!("{}:{}", template, agent_role);

        let request = CompletionRequest::new(
            self.model.clone(),
            vec![
                Message::system(prompt.system_prompt.clone()),
                Message::user(user_prompt.clone()),
            ],
        )
        .with_temperature(sampling.temperature)
        .with_max_tokens(sampling.max_tokens)
        .with_label(label.clone());

        tracing::debug!(
            "[{}] {} ({}, {} prompt chars)",
            self.meeting_id,
            label,
            prompt.identity(),
            user_prompt.chars().count()
        );

        let client = self.client.clone();
        let reply = json::with_corrective_retry(request, CORRECTIVE_RETRIES, move |req| {
            let client = client.clone();
            async move {
                let response = client.complete(req).await?;
                response.text().map(str::to_string)
            }
        })
        .await?;

        if let Some(audit) = &self.audit {
            let record = PromptRunRecord {
                meeting_id: self.meeting_id.clone(),
                prompt_id: prompt.prompt_id.clone(),
                prompt_version: prompt.prompt_version.clone(),
                agent_role: agent_role.to_string(),
                model: self.model.clone(),
                temperature: sampling.temperature,
                max_tokens: sampling.max_tokens,
                timestamp: Utc::now(),
                attempts: reply.attempts,
                prompt_chars: user_prompt.chars().count(),
                output_chars: reply.raw.chars().count(),
                system_prompt: prompt.system_prompt.clone(),
                user_prompt,
                output_text: reply.raw.clone(),
            };
            if let Err(e) = audit.record(&record).await {
                tracing::warn!("[{}] prompt audit write failed: {}", self.meeting_id, e);
            }
        }

        Ok(reply.object)
    }
}
