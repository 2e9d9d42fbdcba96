//! OpenAI Chat Completions client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{send_json, ChatModel, Completion, Credential, Endpoint, ProviderError, Usage};
use crate::message::Message;

/// Client for `POST {base}/chat/completions`.
pub struct OpenAiClient {
    http: reqwest::Client,
    credential: Credential,
    endpoint: Endpoint,
}

impl OpenAiClient {
    /// Create a client that sends `credential` to `endpoint`.
    pub fn new(http: reqwest::Client, credential: Credential, endpoint: Endpoint) -> Self {
        Self {
            http,
            credential,
            endpoint,
        }
    }

    fn translate_request<'a>(&'a self, messages: &'a [Message]) -> OpenAiRequest<'a> {
        OpenAiRequest {
            model: &self.endpoint.model,
            messages: messages
                .iter()
                .map(|m| OpenAiMessage {
                    role: m.role().as_str(),
                    content: m.content(),
                })
                .collect(),
            stream: false,
        }
    }

    fn normalize_response(resp: OpenAiResponse) -> Result<Completion, ProviderError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::call_failed("No choices in response"))?;

        let text = choice.message.content.unwrap_or_default();
        if text.is_empty() {
            let reason = choice.finish_reason.as_deref().unwrap_or("unknown");
            return Err(ProviderError::call_failed(format!(
                "No text in response (finish reason: {reason})"
            )));
        }

        let usage = resp
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens as usize,
                completion_tokens: u.completion_tokens as usize,
            })
            .unwrap_or_default();

        Ok(Completion {
            message: Message::assistant(text),
            usage,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    fn model(&self) -> &str {
        &self.endpoint.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<Completion, ProviderError> {
        let request = self
            .http
            .post(self.endpoint.url("chat/completions"))
            .bearer_auth(self.credential.expose())
            .json(&self.translate_request(messages));

        let body = send_json(request).await?;
        let response: OpenAiResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::call_failed(format!("Failed to parse response: {e}")))?;

        Self::normalize_response(response)
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
