//! Google Gemini client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{send_json, ChatModel, Completion, Credential, Endpoint, ProviderError, Usage};
use crate::message::{Message, Role};

/// Client for `POST {base}/models/{model}:generateContent`.
pub struct GeminiClient {
    http: reqwest::Client,
    credential: Credential,
    endpoint: Endpoint,
}

impl GeminiClient {
    /// Create a client that sends `credential` to `endpoint`.
    pub fn new(http: reqwest::Client, credential: Credential, endpoint: Endpoint) -> Self {
        Self {
            http,
            credential,
            endpoint,
        }
    }

    /// Gemini has no system role inside `contents`; system messages are
    /// joined into `systemInstruction` and assistant turns use role `model`.
    fn translate_request(messages: &[Message]) -> GeminiRequest {
        let system_text = messages
            .iter()
            .filter(|m| m.role() == Role::System)
            .map(Message::content)
            .collect::<Vec<_>>()
            .join("\n\n");

        let system_instruction = if system_text.is_empty() {
            None
        } else {
            Some(GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: system_text }],
            })
        };

        let contents = messages
            .iter()
            .filter_map(|m| {
                let role = match m.role() {
                    Role::User => "user",
                    Role::Assistant => "model",
                    Role::System => return None,
                };
                Some(GeminiContent {
                    role: Some(role.to_string()),
                    parts: vec![GeminiPart {
                        text: m.content().to_string(),
                    }],
                })
            })
            .collect();

        GeminiRequest {
            contents,
            system_instruction,
        }
    }

    fn normalize_response(resp: GeminiResponse) -> Result<Completion, ProviderError> {
        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::call_failed("No candidates in response"))?;

        let text = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
            .unwrap_or_default();

        if text.is_empty() {
            let reason = candidate.finish_reason.as_deref().unwrap_or("unknown");
            return Err(ProviderError::call_failed(format!(
                "No text in response (finish reason: {reason})"
            )));
        }

        let usage = resp
            .usage_metadata
            .map(|u| Usage {
                prompt_tokens: u.prompt_token_count as usize,
                completion_tokens: u.candidates_token_count as usize,
            })
            .unwrap_or_default();

        Ok(Completion {
            message: Message::assistant(text),
            usage,
        })
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    fn model(&self) -> &str {
        &self.endpoint.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<Completion, ProviderError> {
        let path = format!("models/{}:generateContent", self.endpoint.model);
        let request = self
            .http
            .post(self.endpoint.url(&path))
            .header("x-goog-api-key", self.credential.expose())
            .json(&Self::translate_request(messages));

        let body = send_json(request).await?;
        let response: GeminiResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::call_failed(format!("Failed to parse response: {e}")))?;

        Self::normalize_response(response)
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}
