use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion service unavailable: {0}")]
    Unavailable(String),
    #[error("completion service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected completion response structure: {0}")]
    Envelope(String),
}

/// Everything needed to talk to the chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
}

pub trait CompletionClient: Send + Sync {
    fn model(&self) -> &str;
    fn max_tokens(&self) -> u32;
    fn complete(&self, system: &str, user: &str) -> Result<Completion, CompletionError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client. One blocking call, no retries.
pub struct OpenAiChat {
    config: CompletionConfig,
    client: Client,
}

impl OpenAiChat {
    pub fn new(config: CompletionConfig) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| CompletionError::Unavailable(err.to_string()))?;
        Ok(Self { config, client })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }
}

impl CompletionClient for OpenAiChat {
    fn model(&self) -> &str {
        &self.config.model
    }

    fn max_tokens(&self) -> u32 {
        self.config.max_tokens
    }

    fn complete(&self, system: &str, user: &str) -> Result<Completion, CompletionError> {
        let payload = build_request(&self.config, system, user);
        let response = self
            .client
            .post(self.url())
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .map_err(|err| CompletionError::Unavailable(err.to_string()))?;

        let status = response.status();
        let text_body = response
            .text()
            .map_err(|err| CompletionError::Unavailable(err.to_string()))?;

        if !status.is_success() {
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body: text_body,
            });
        }

        parse_response(&text_body)
    }
}

fn build_request<'a>(
    config: &'a CompletionConfig,
    system: &'a str,
    user: &'a str,
) -> ChatRequest<'a> {
    ChatRequest {
        model: &config.model,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        messages: [
            ChatMessage {
                role: "system",
                content: system,
            },
            ChatMessage {
                role: "user",
                content: user,
            },
        ],
    }
}

fn parse_response(body: &str) -> Result<Completion, CompletionError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|err| CompletionError::Envelope(err.to_string()))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::Envelope("no choices in response".to_string()))?;
    let text = choice
        .message
        .and_then(|message| message.content)
        .ok_or_else(|| CompletionError::Envelope("choice has no message content".to_string()))?;

    Ok(Completion {
        text,
        usage: response.usage,
        finish_reason: choice.finish_reason,
    })
}
