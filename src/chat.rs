//! OpenAI-compatible chat-completions client

use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use crate::llm_client::LlmClient;
use crate::retry::with_backoff;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Chat-completions client (DeepSeek, OpenAI and compatible servers)
pub struct ChatClient {
    /// HTTP client
    client: Client,
    /// Configuration
    config: GenerationConfig,
    /// Precomputed endpoint URL
    url: String,
}

impl ChatClient {
    /// Create a new client with the given configuration
    pub fn new(config: GenerationConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let url = config.completions_url();

        Ok(Self { client, config, url })
    }

    /// Get the configuration
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    async fn send_once(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.config.api_key())
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::api(status.as_u16(), error_text));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl LlmClient for ChatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let label = request.label.as_deref().unwrap_or("chat completion").to_string();
        tracing::debug!(
            "POST {} model={} messages={} ({})",
            self.url,
            request.model,
            request.messages.len(),
            label
        );
        with_backoff(&self.config.retry, &label, || self.send_once(&request)).await
    }

    fn client_type(&self) -> &str {
        "chat-completions"
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

/// Completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier
    pub model: String,
    /// Messages in the conversation
    pub messages: Vec<Message>,
    /// Temperature for sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens for completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Local label for logs (the prompt template id); never sent
    #[serde(skip)]
    pub label: Option<String>,
}

impl CompletionRequest {
    /// Create a new completion request
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            label: None,
        }
    }

    /// Set the temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the log label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Append a message, e.g. a corrective follow-up
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }
}

/// Message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: MessageRole,
    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
}

/// Completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Unique identifier
    #[serde(default)]
    pub id: String,
    /// Model used
    #[serde(default)]
    pub model: String,
    /// Choices
    pub choices: Vec<Choice>,
    /// Token usage
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl CompletionResponse {
    /// Build a single-choice response, mostly for in-process clients
    pub fn from_text(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            model: model.into(),
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: Some(MessageRole::Assistant),
                    content: Some(text.into()),
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: None,
        }
    }

    /// Text of the first choice
    pub fn text(&self) -> Result<&str> {
        let choice = self
            .choices
            .first()
            .ok_or_else(|| Error::other("Completion response contained no choices"))?;
        Ok(choice.message.content.as_deref().unwrap_or_default())
    }
}

/// Choice in completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Index of the choice
    #[serde(default)]
    pub index: u32,
    /// Message content
    pub message: ResponseMessage,
    /// Finish reason
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Assistant message as returned by the endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Role (normally assistant)
    #[serde(default)]
    pub role: Option<MessageRole>,
    /// Content; some servers send null for empty output
    #[serde(default)]
    pub content: Option<String>,
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens
    pub prompt_tokens: u64,
    /// Completion tokens
    pub completion_tokens: u64,
    /// Total tokens
    pub total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use std::time::Duration;
    use url::Url;

    fn client_for(server: &mockito::ServerGuard, attempts: u32) -> ChatClient {
        let config = GenerationConfig::new("test-key")
            .unwrap()
            .with_base_url(Url::parse(&server.url()).unwrap())
            .with_retry(RetryPolicy::new(
                attempts,
                Duration::from_millis(1),
                Duration::from_millis(2),
            ));
        ChatClient::new(config).unwrap()
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(
            "deepseek-chat",
            vec![Message::system("extract"), Message::user("facts please")],
        )
        .with_temperature(0.2)
        .with_max_tokens(100)
        .with_label("meeting_blackboard")
    }

    #[test]
    fn test_label_is_not_serialized() {
        let json = serde_json::to_value(request()).unwrap();
        assert!(json.get("label").is_none());
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["max_tokens"], 100);
    }

    #[tokio::test]
    async fn test_complete_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id":"c1","model":"deepseek-chat","choices":[{"index":0,"message":{"role":"assistant","content":"{\"ok\":true}"},"finish_reason":"stop"}],"usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server, 3);
        let response = client.complete(request()).await.unwrap();

        assert_eq!(response.text().unwrap(), "{\"ok\":true}");
        assert_eq!(response.usage.unwrap().total_tokens, 5);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(400)
            .with_body("bad request")
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, 3);
        let err = client.complete(request()).await.unwrap_err();

        assert!(matches!(err, Error::Api { status: 400, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_retried_up_to_limit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .expect(3)
            .create_async()
            .await;

        let client = client_for(&server, 3);
        let err = client.complete(request()).await.unwrap_err();

        assert!(matches!(err, Error::Api { status: 503, .. }));
        mock.assert_async().await;
    }

    #[test]
    fn test_null_content_reads_as_empty() {
        let response: CompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#,
        )
        .unwrap();
        assert_eq!(response.text().unwrap(), "");
    }
}
