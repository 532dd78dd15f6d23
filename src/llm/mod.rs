//! Generative model access.
//!
//! Holds the tier registry, the prompt assembler, the remote generation
//! client and the invoker that validates responses and applies the
//! fallback chain.

mod invoker;
pub mod prompt;
pub mod registry;
mod vertex;

pub use invoker::{InvocationError, ModelInvoker, RemoteErrorCode, extract_candidate_text};
pub use prompt::{OUTPUT_FORMAT_CONTRACT, PARTIAL_ANALYSIS_MARKER, PromptAssembler};
pub use registry::{
    BASELINE_TIER, DEFAULT_TIER, FALLBACK_CHAIN, GenerationParameters, ModelProfile,
    ModelRegistry, PREMIUM_TIER,
};
pub use vertex::VertexClient;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A remote text generation backend.
///
/// Implementations issue exactly one call per invocation and never retry;
/// retries and fallback are the invoker's concern.
pub trait GenerationClient: Send + Sync {
    /// The backend name, used in logs.
    fn name(&self) -> &'static str;

    /// Sends a generation request for the given tier profile.
    ///
    /// Returns `Ok(None)` when the remote answered successfully with an
    /// empty body.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::Remote`] for structured API errors and
    /// [`InvocationError::Transport`] for network failures and timeouts.
    fn generate(
        &self,
        profile: &ModelProfile,
        request: &GenerateContentRequest,
    ) -> Result<Option<GenerateContentResponse>, InvocationError>;
}

/// A text part of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    /// The text, if this is a text part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// A message in a generation request or a candidate's content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    /// `user` in requests, `model` in responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Message parts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<Part>>,
}

/// A harm-category block threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    /// Harm category, e.g. `HARM_CATEGORY_DANGEROUS_CONTENT`.
    pub category: String,
    /// Block threshold, e.g. `BLOCK_ONLY_HIGH`.
    pub threshold: String,
}

/// Body of a `generateContent` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    /// Conversation contents (a single user turn).
    pub contents: Vec<Content>,
    /// Sampling parameters.
    pub generation_config: GenerationParameters,
    /// Safety thresholds.
    pub safety_settings: Vec<SafetySetting>,
}

impl GenerateContentRequest {
    /// Builds a single-turn request for a tier profile.
    #[must_use]
    pub fn new(prompt: &str, profile: &ModelProfile) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: Some(vec![Part {
                    text: Some(prompt.to_string()),
                }]),
            }],
            generation_config: profile.generation_parameters,
            safety_settings: profile
                .safety_thresholds
                .iter()
                .map(|(category, threshold)| SafetySetting {
                    category: category.clone(),
                    threshold: threshold.clone(),
                })
                .collect(),
        }
    }
}

/// A response candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Generated content.
    #[serde(default)]
    pub content: Option<Content>,
    /// Why generation stopped (e.g. `STOP`, `SAFETY`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Body of a successful `generateContent` response.
///
/// Every level is optional so that each missing piece can be reported
/// as its own validation failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateContentResponse {
    /// Generated candidates.
    #[serde(default)]
    pub candidates: Option<Vec<Candidate>>,
}

impl GenerateContentResponse {
    /// Builds a response with a single text candidate.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            candidates: Some(vec![Candidate {
                content: Some(Content {
                    role: Some("model".to_string()),
                    parts: Some(vec![Part {
                        text: Some(text.into()),
                    }]),
                }),
                finish_reason: Some("STOP".to_string()),
            }]),
        }
    }
}

/// HTTP client configuration for generation calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlmHttpConfig {
    /// Per-call timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
    /// Overall request budget; no fallback hop starts after it elapses.
    pub request_deadline_ms: u64,
}

impl Default for LlmHttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 25_000,
            connect_timeout_ms: 3_000,
            request_deadline_ms: 55_000,
        }
    }
}

impl LlmHttpConfig {
    /// Loads HTTP configuration from config file settings.
    #[must_use]
    pub fn from_config(config: &crate::config::HttpSettings) -> Self {
        let mut settings = Self::default();
        if let Some(timeout_ms) = config.timeout_ms {
            settings.timeout_ms = timeout_ms;
        }
        if let Some(connect_timeout_ms) = config.connect_timeout_ms {
            settings.connect_timeout_ms = connect_timeout_ms;
        }
        if let Some(request_deadline_ms) = config.request_deadline_ms {
            settings.request_deadline_ms = request_deadline_ms;
        }
        settings
    }

    /// The request deadline as a duration.
    #[must_use]
    pub const fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }
}

/// Builds a blocking HTTP client for generation requests with configured timeouts.
///
/// Must not be called from within an async runtime context.
#[must_use]
pub fn build_http_client(config: LlmHttpConfig) -> reqwest::blocking::Client {
    let mut builder = reqwest::blocking::Client::builder();
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }

    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build generation HTTP client: {err}");
        reqwest::blocking::Client::new()
    })
}

/// Extracts JSON from a model response, handling markdown code blocks.
#[must_use]
pub fn extract_json_from_response(response: &str) -> &str {
    let trimmed = response.trim();

    // ```json ... ```
    if let Some(start) = trimmed.find("```json") {
        let json_start = start + 7;
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // ``` ... ``` without a language marker
    if let Some(start) = trimmed.find("```") {
        let content_start = start + 3;
        let after_marker = &trimmed[content_start..];
        let json_start = after_marker
            .find('{')
            .map_or(content_start, |pos| content_start + pos);
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // Outermost braces
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                return &trimmed[start..=end];
            }
        }
    }

    trimmed
}
