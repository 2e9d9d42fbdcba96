//! Provider adapter.
//!
//! Resolves a logical provider name and a credential into a client bound to
//! that provider, and runs exactly one completion over the conversation.
//! Failures come back as [`ProviderError`] values. The adapter never retries
//! and keeps no state between calls.

mod gemini;
mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::message::Message;

/// Default model for [`Provider::OpenAi`].
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
/// Default model for [`Provider::Google`].
pub const DEFAULT_GOOGLE_MODEL: &str = "gemini-1.5-flash";
/// Default base URL for the OpenAI API.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Default base URL for the Gemini API.
pub const DEFAULT_GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// The LLM services the adapter knows how to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Provider {
    /// OpenAI Chat Completions.
    #[default]
    OpenAi,
    /// Google Gemini.
    Google,
}

impl Provider {
    /// Every supported provider.
    pub const ALL: [Provider; 2] = [Provider::OpenAi, Provider::Google];

    /// The name callers use to select this provider.
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Google => "google",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))
    }
}

/// How unrecognized provider names are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderPolicy {
    /// Unrecognized or empty names use [`Provider::OpenAi`].
    #[default]
    Fallback,
    /// Unrecognized names fail with [`ProviderError::UnknownProvider`].
    Strict,
}

impl ProviderPolicy {
    /// Map a requested provider name to a [`Provider`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use cortex::{Provider, ProviderError, ProviderPolicy};
    ///
    /// assert_eq!(ProviderPolicy::Fallback.resolve("anthropic").unwrap(), Provider::OpenAi);
    /// assert!(matches!(
    ///     ProviderPolicy::Strict.resolve("anthropic"),
    ///     Err(ProviderError::UnknownProvider(_))
    /// ));
    /// ```
    pub fn resolve(self, name: &str) -> Result<Provider, ProviderError> {
        match (self, name.parse::<Provider>()) {
            (_, Ok(provider)) => Ok(provider),
            (ProviderPolicy::Fallback, Err(_)) => {
                tracing::warn!(
                    requested = %name,
                    fallback = %Provider::default(),
                    "Unrecognized provider, using default"
                );
                Ok(Provider::default())
            }
            (ProviderPolicy::Strict, Err(e)) => Err(e),
        }
    }
}

impl FromStr for ProviderPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fallback" => Ok(ProviderPolicy::Fallback),
            "strict" => Ok(ProviderPolicy::Strict),
            other => Err(format!(
                "invalid provider policy '{other}', expected 'fallback' or 'strict'"
            )),
        }
    }
}

/// An API key. The value never appears in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret, for building request headers.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether no usable key was supplied.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("Credential(<empty>)")
        } else {
            f.write_str("Credential(<redacted>)")
        }
    }
}

impl From<String> for Credential {
    fn from(secret: String) -> Self {
        Self(secret)
    }
}

impl From<&str> for Credential {
    fn from(secret: &str) -> Self {
        Self(secret.to_string())
    }
}

/// Per-run provider selection. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// The provider name as requested by the caller.
    pub provider: String,
    /// The key to call it with.
    pub credential: Credential,
}

impl ProviderConfig {
    /// Create a configuration for one run.
    pub fn new(provider: impl Into<String>, credential: impl Into<Credential>) -> Self {
        Self {
            provider: provider.into(),
            credential: credential.into(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(Provider::default().as_str(), Credential::default())
    }
}

/// Anticipated provider failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The requested provider is not supported.
    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),

    /// No API key was supplied.
    #[error("API Key missing")]
    MissingCredential,

    /// The provider could not produce a reply.
    #[error("Provider call failed: {0}")]
    CallFailed(String),
}

impl ProviderError {
    /// Shorthand for [`ProviderError::CallFailed`].
    pub fn call_failed(detail: impl Into<String>) -> Self {
        ProviderError::CallFailed(detail.into())
    }

    /// Stable name of the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::UnknownProvider(_) => "unknown_provider",
            ProviderError::MissingCredential => "missing_credential",
            ProviderError::CallFailed(_) => "call_failed",
        }
    }

    /// The text shown to the user in place of a model reply.
    pub fn notice(&self) -> String {
        format!("Error: {self}")
    }
}

/// Token counts reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    /// Tokens in the request.
    pub prompt_tokens: usize,
    /// Tokens in the reply.
    pub completion_tokens: usize,
}

/// One provider reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// The assistant message.
    pub message: Message,
    /// Reported token usage, zero when the provider omits it.
    pub usage: Usage,
}

/// A client bound to one provider, model and credential.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// The model identifier sent to the provider.
    fn model(&self) -> &str;

    /// Send the whole history and return the assistant reply.
    async fn complete(&self, messages: &[Message]) -> Result<Completion, ProviderError>;
}

/// The contract workflow steps use to reach an LLM.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Produce one assistant message for `messages` using `config`.
    async fn complete(
        &self,
        config: &ProviderConfig,
        messages: &[Message],
    ) -> Result<Completion, ProviderError>;
}

/// Where to reach a provider and which model to ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// API base URL without a trailing path.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Immutable adapter settings, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    /// Treatment of unrecognized provider names.
    pub policy: ProviderPolicy,
    /// Upper bound on a single provider call.
    pub timeout: Option<Duration>,
    /// OpenAI endpoint.
    pub openai: Endpoint,
    /// Gemini endpoint.
    pub google: Endpoint,
}

impl ProviderSettings {
    /// The endpoint configured for `provider`.
    pub fn endpoint(&self, provider: Provider) -> &Endpoint {
        match provider {
            Provider::OpenAi => &self.openai,
            Provider::Google => &self.google,
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            policy: ProviderPolicy::default(),
            timeout: None,
            openai: Endpoint::new(DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL),
            google: Endpoint::new(DEFAULT_GOOGLE_BASE_URL, DEFAULT_GOOGLE_MODEL),
        }
    }
}

/// The default [`CompletionProvider`]: picks a client per call by provider.
///
/// Safe to share across concurrent runs; the only shared pieces are the
/// immutable settings and the HTTP client handle.
#[derive(Debug, Clone)]
pub struct ProviderAdapter {
    http: reqwest::Client,
    settings: Arc<ProviderSettings>,
}

impl ProviderAdapter {
    /// Create an adapter with its own HTTP client.
    pub fn new(settings: ProviderSettings) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self::with_client(http, settings))
    }

    /// Create an adapter around an existing HTTP client.
    pub fn with_client(http: reqwest::Client, settings: ProviderSettings) -> Self {
        Self {
            http,
            settings: Arc::new(settings),
        }
    }

    /// The settings this adapter was built with.
    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// Build the client for `provider`, bound to `credential`.
    pub fn connect(&self, provider: Provider, credential: &Credential) -> Box<dyn ChatModel> {
        let endpoint = self.settings.endpoint(provider).clone();
        match provider {
            Provider::OpenAi => Box::new(OpenAiClient::new(
                self.http.clone(),
                credential.clone(),
                endpoint,
            )),
            Provider::Google => Box::new(GeminiClient::new(
                self.http.clone(),
                credential.clone(),
                endpoint,
            )),
        }
    }
}

#[async_trait]
impl CompletionProvider for ProviderAdapter {
    async fn complete(
        &self,
        config: &ProviderConfig,
        messages: &[Message],
    ) -> Result<Completion, ProviderError> {
        let provider = self.settings.policy.resolve(&config.provider)?;
        if config.credential.is_empty() {
            return Err(ProviderError::MissingCredential);
        }
        if messages.is_empty() {
            return Err(ProviderError::call_failed("no messages to send"));
        }

        let client = self.connect(provider, &config.credential);
        let start = Instant::now();
        let result = match self.settings.timeout {
            Some(limit) => tokio::time::timeout(limit, client.complete(messages))
                .await
                .unwrap_or_else(|_| Err(ProviderError::call_failed("timeout"))),
            None => client.complete(messages).await,
        };
        let duration = start.elapsed();

        match &result {
            Ok(completion) => {
                tracing::info!(
                    provider = %provider,
                    model = %client.model(),
                    duration_ms = %duration.as_millis(),
                    prompt_tokens = completion.usage.prompt_tokens,
                    completion_tokens = completion.usage.completion_tokens,
                    "LLM request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    provider = %provider,
                    model = %client.model(),
                    duration_ms = %duration.as_millis(),
                    error = %e,
                    "LLM request failed"
                );
            }
        }

        result
    }
}

/// Error body shared by the OpenAI and Gemini APIs.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Send a JSON request and return the body of a successful response.
pub(crate) async fn send_json(request: reqwest::RequestBuilder) -> Result<String, ProviderError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            ProviderError::call_failed(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            ProviderError::call_failed(format!("Connection failed: {e}"))
        } else {
            ProviderError::call_failed(format!("Request failed: {e}"))
        }
    })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::call_failed(format!("Failed to read response: {e}")))?;

    if status.is_success() {
        return Ok(body);
    }

    let message = serde_json::from_str::<ApiErrorResponse>(&body)
        .map(|r| r.error.message)
        .unwrap_or(body);
    Err(ProviderError::call_failed(match status.as_u16() {
        401 | 403 => format!("Authentication failed: {message}"),
        429 => format!("Rate limit exceeded: {message}"),
        400 => format!("Invalid request: {message}"),
        500..=599 => format!("Server error: {message}"),
        _ => format!("HTTP {status}: {message}"),
    }))
}

/// Spawn an axum app on a free local port and return its base URL.
#[cfg(test)]
pub(crate) async fn spawn_mock_server(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    fn settings_for(base_url: &str) -> ProviderSettings {
        ProviderSettings {
            openai: Endpoint::new(base_url, "gpt-test"),
            google: Endpoint::new(base_url, "gemini-test"),
            ..ProviderSettings::default()
        }
    }

    #[test]
    fn test_provider_parse_is_case_insensitive() {
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!(" google ".parse::<Provider>().unwrap(), Provider::Google);
        assert_eq!(
            "mistral".parse::<Provider>(),
            Err(ProviderError::UnknownProvider("mistral".to_string()))
        );
    }

    #[test]
    fn test_fallback_policy_defaults_to_openai() {
        assert_eq!(ProviderPolicy::Fallback.resolve("").unwrap(), Provider::OpenAi);
        assert_eq!(ProviderPolicy::Fallback.resolve("claude").unwrap(), Provider::OpenAi);
        assert_eq!(ProviderPolicy::Fallback.resolve("google").unwrap(), Provider::Google);
    }

    #[test]
    fn test_strict_policy_rejects_unknown() {
        let err = ProviderPolicy::Strict.resolve("claude").unwrap_err();
        assert_eq!(err.notice(), "Error: Unknown provider 'claude'");
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("Strict".parse::<ProviderPolicy>().unwrap(), ProviderPolicy::Strict);
        assert!("lenient".parse::<ProviderPolicy>().is_err());
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let cfg = ProviderConfig::new("openai", "sk-very-secret");
        let printed = format!("{cfg:?}");
        assert!(!printed.contains("sk-very-secret"));
        assert!(printed.contains("<redacted>"));
        assert!(Credential::new("   ").is_empty());
    }

    #[test]
    fn test_missing_credential_notice() {
        assert_eq!(ProviderError::MissingCredential.notice(), "Error: API Key missing");
    }

    #[tokio::test]
    async fn test_missing_credential_skips_network() {
        // Nothing listens on port 9; any request would fail with a connection error.
        let adapter = ProviderAdapter::new(settings_for("http://127.0.0.1:9")).unwrap();
        let messages = [Message::user("hello")];

        let err = adapter
            .complete(&ProviderConfig::new("openai", ""), &messages)
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::MissingCredential);
    }

    #[tokio::test]
    async fn test_strict_adapter_reports_unknown_provider() {
        let settings = ProviderSettings {
            policy: ProviderPolicy::Strict,
            ..settings_for("http://127.0.0.1:9")
        };
        let adapter = ProviderAdapter::new(settings).unwrap();

        let err = adapter
            .complete(&ProviderConfig::new("cohere", "key"), &[Message::user("hi")])
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::UnknownProvider("cohere".to_string()));
    }

    #[tokio::test]
    async fn test_fallback_adapter_routes_unknown_to_openai() {
        let app = Router::new().route(
            "/chat/completions",
            post(|Json(body): Json<Value>| async move {
                Json(json!({
                    "choices": [{"message": {"role": "assistant", "content": body["model"]}}],
                }))
            }),
        );
        let base = spawn_mock_server(app).await;
        let adapter = ProviderAdapter::new(settings_for(&base)).unwrap();

        let completion = adapter
            .complete(&ProviderConfig::new("who-knows", "key"), &[Message::user("hi")])
            .await
            .unwrap();
        assert_eq!(completion.message, Message::assistant("gpt-test"));
    }

    #[tokio::test]
    async fn test_timeout_becomes_call_failed() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"choices": []}))
            }),
        );
        let base = spawn_mock_server(app).await;
        let settings = ProviderSettings {
            timeout: Some(Duration::from_millis(50)),
            ..settings_for(&base)
        };
        let adapter = ProviderAdapter::new(settings).unwrap();

        let err = adapter
            .complete(&ProviderConfig::new("openai", "key"), &[Message::user("hi")])
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::call_failed("timeout"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_call_failed() {
        let adapter = ProviderAdapter::new(settings_for("http://127.0.0.1:9")).unwrap();

        let err = adapter
            .complete(&ProviderConfig::new("google", "key"), &[Message::user("hi")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "call_failed");
        assert!(err.notice().starts_with("Error: "));
    }

    #[test]
    fn test_connect_uses_configured_model() {
        let adapter = ProviderAdapter::new(settings_for("http://localhost")).unwrap();
        let credential = Credential::new("key");
        assert_eq!(adapter.connect(Provider::OpenAi, &credential).model(), "gpt-test");
        assert_eq!(adapter.connect(Provider::Google, &credential).model(), "gemini-test");
    }
}
