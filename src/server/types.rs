//! Request and response bodies.

use serde::{Deserialize, Serialize};

use crate::provider::Provider;

/// Default page size for note listings.
pub const DEFAULT_LIMIT: usize = 100;
/// Largest page a single listing returns.
pub const MAX_LIMIT: usize = 1000;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

#[derive(Debug, Serialize)]
pub struct WelcomeResponse {
    pub message: &'static str,
}

/// Body of `POST /chat`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
}

fn default_provider() -> String {
    Provider::default().as_str().to_string()
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

/// Query string of `GET /notes`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

impl ListQuery {
    /// The requested page size, capped at [`MAX_LIMIT`].
    pub fn limit(&self) -> usize {
        self.limit.min(MAX_LIMIT)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
