//! In-memory generation client for tests

use crate::chat::{CompletionRequest, CompletionResponse};
use crate::error::{Error, Result};
use crate::llm_client::LlmClient;
use crate::meeting::generation::MeetingGenerator;
use crate::prompts::PromptStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

#[derive(Default)]
struct Script {
    queued: HashMap<String, VecDeque<String>>,
    always: HashMap<String, String>,
    requests: Vec<CompletionRequest>,
}

/// Replies keyed by request label.
///
/// A key matches a label exactly or by its template part (the text before the
/// first `:`); exact keys win. Queued replies are used once, in order, before
/// the `always` reply for the same key.
#[derive(Clone, Default)]
pub(crate) struct ScriptedClient {
    script: Arc<Mutex<Script>>,
}

impl ScriptedClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a one-time reply
    pub(crate) fn reply(self, key: &str, text: &str) -> Self {
        self.script
            .lock()
            .queued
            .entry(key.to_string())
            .or_default()
            .push_back(text.to_string());
        self
    }

    /// Reply with `text` whenever nothing is queued
    pub(crate) fn always(self, key: &str, text: &str) -> Self {
        self.script
            .lock()
            .always
            .insert(key.to_string(), text.to_string());
        self
    }

    /// Every request received, in order
    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.script.lock().requests.clone()
    }

    /// Requests whose label matches `key`
    pub(crate) fn calls(&self, key: &str) -> usize {
        self.script
            .lock()
            .requests
            .iter()
            .filter(|r| r.label.as_deref().is_some_and(|label| key_matches(key, label)))
            .count()
    }

    /// Requests whose label matches `key`
    pub(crate) fn requests_for(&self, key: &str) -> Vec<CompletionRequest> {
        self.script
            .lock()
            .requests
            .iter()
            .filter(|r| r.label.as_deref().is_some_and(|label| key_matches(key, label)))
            .cloned()
            .collect()
    }
}

fn key_matches(key: &str, label: &str) -> bool {
    label == key || label.split(':').next() == Some(key)
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let label = request.label.clone().unwrap_or_default();
        let mut script = self.script.lock();
        script.requests.push(request);

        let template = label.split(':').next().unwrap_or_default().to_string();
        for key in [label.as_str(), template.as_str()] {
            if let Some(text) = script.queued.get_mut(key).and_then(VecDeque::pop_front) {
                return Ok(CompletionResponse::from_text("scripted", text));
            }
            if let Some(text) = script.always.get(key) {
                return Ok(CompletionResponse::from_text("scripted", text.clone()));
            }
        }
        Err(Error::other(format!("no scripted reply for {}", label)))
    }

    fn client_type(&self) -> &str {
        "scripted"
    }

    fn endpoint(&self) -> &str {
        "memory://scripted"
    }
}

/// Generator over the built-in templates backed by `client`
pub(crate) fn generator_with(client: &ScriptedClient, meeting_id: &str) -> MeetingGenerator {
    MeetingGenerator::new(
        Arc::new(client.clone()),
        Arc::new(PromptStore::builtin().expect("built-in templates parse")),
        "test-model",
        meeting_id,
    )
}
