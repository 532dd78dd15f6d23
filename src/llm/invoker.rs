//! Model invocation with response validation and a one-hop fallback.

use super::{GenerateContentRequest, GenerateContentResponse, GenerationClient, ModelRegistry};
use crate::models::{InvocationMetadata, InvocationResult};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error as ThisError;

/// Structured status code carried by a remote API error body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteErrorCode {
    /// `RESOURCE_EXHAUSTED` (429): rate limit or quota.
    ResourceExhausted,
    /// `UNAVAILABLE` (503): model temporarily unavailable.
    Unavailable,
    /// `INVALID_ARGUMENT` (400): request rejected by this model.
    InvalidArgument,
    /// `PERMISSION_DENIED` (403).
    PermissionDenied,
    /// `UNAUTHENTICATED` (401).
    Unauthenticated,
    /// `NOT_FOUND` (404).
    NotFound,
    /// `DEADLINE_EXCEEDED` (504).
    DeadlineExceeded,
    /// `INTERNAL` (500).
    Internal,
    /// Any other status string, or none at all.
    Other(String),
}

impl RemoteErrorCode {
    /// Parses the `status` field of an error body, falling back to the HTTP code.
    #[must_use]
    pub fn parse(status: Option<&str>, http_code: u16) -> Self {
        match status.map(str::trim).filter(|s| !s.is_empty()) {
            Some(status) => Self::from_status(status),
            None => Self::from_http_code(http_code),
        }
    }

    fn from_status(status: &str) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "RESOURCE_EXHAUSTED" => Self::ResourceExhausted,
            "UNAVAILABLE" => Self::Unavailable,
            "INVALID_ARGUMENT" => Self::InvalidArgument,
            "PERMISSION_DENIED" => Self::PermissionDenied,
            "UNAUTHENTICATED" => Self::Unauthenticated,
            "NOT_FOUND" => Self::NotFound,
            "DEADLINE_EXCEEDED" => Self::DeadlineExceeded,
            "INTERNAL" => Self::Internal,
            other => Self::Other(other.to_string()),
        }
    }

    fn from_http_code(code: u16) -> Self {
        match code {
            400 => Self::InvalidArgument,
            401 => Self::Unauthenticated,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            429 => Self::ResourceExhausted,
            500 => Self::Internal,
            503 => Self::Unavailable,
            504 => Self::DeadlineExceeded,
            other => Self::Other(format!("HTTP_{other}")),
        }
    }

    /// Canonical status string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::Unavailable => "UNAVAILABLE",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::NotFound => "NOT_FOUND",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::Internal => "INTERNAL",
            Self::Other(status) => status,
        }
    }
}

impl fmt::Display for RemoteErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single generation call.
///
/// The six shape variants map one-to-one onto the response validation
/// stages, in order.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum InvocationError {
    /// The remote call returned no body.
    #[error("model '{tier}' returned no response")]
    MissingResponse {
        /// Tier attempted.
        tier: String,
    },

    /// The response has no `candidates` field.
    #[error("model '{tier}' response has no candidates field")]
    MissingCandidates {
        /// Tier attempted.
        tier: String,
    },

    /// The `candidates` list is empty.
    #[error("model '{tier}' returned an empty candidate list")]
    EmptyCandidates {
        /// Tier attempted.
        tier: String,
    },

    /// The first candidate has no `content.parts`.
    #[error("model '{tier}' candidate content is malformed")]
    MalformedContent {
        /// Tier attempted.
        tier: String,
    },

    /// The first candidate's parts list is empty.
    #[error("model '{tier}' candidate has no parts")]
    EmptyParts {
        /// Tier attempted.
        tier: String,
    },

    /// The first part has no text or empty text.
    #[error("model '{tier}' candidate part has no text")]
    MissingText {
        /// Tier attempted.
        tier: String,
    },

    /// The remote API returned a structured error.
    #[error("model '{tier}' failed with {code}: {message}")]
    Remote {
        /// Tier attempted.
        tier: String,
        /// Structured status code.
        code: RemoteErrorCode,
        /// Error message from the API.
        message: String,
    },

    /// The call never produced an HTTP response.
    #[error("model '{tier}' request failed ({kind}): {message}")]
    Transport {
        /// Tier attempted.
        tier: String,
        /// `timeout`, `connect`, `request`, `body` or `unknown`.
        kind: &'static str,
        /// Underlying error message.
        message: String,
    },

    /// Neither the requested tier nor the default tier is registered.
    #[error("model '{tier}' is not registered")]
    UnknownTier {
        /// Tier requested.
        tier: String,
    },
}

impl InvocationError {
    /// Tier the failed call was made against.
    #[must_use]
    pub fn tier(&self) -> &str {
        match self {
            Self::MissingResponse { tier }
            | Self::MissingCandidates { tier }
            | Self::EmptyCandidates { tier }
            | Self::MalformedContent { tier }
            | Self::EmptyParts { tier }
            | Self::MissingText { tier }
            | Self::Remote { tier, .. }
            | Self::Transport { tier, .. }
            | Self::UnknownTier { tier } => tier,
        }
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::MissingResponse { .. } => "missing_response",
            Self::MissingCandidates { .. } => "missing_candidates",
            Self::EmptyCandidates { .. } => "empty_candidates",
            Self::MalformedContent { .. } => "malformed_content",
            Self::EmptyParts { .. } => "empty_parts",
            Self::MissingText { .. } => "missing_text",
            Self::Remote { code, .. } => code.as_str(),
            Self::Transport { kind, .. } => *kind,
            Self::UnknownTier { .. } => "unknown_tier",
        }
    }

    /// Returns true if the failure warrants a fallback hop.
    ///
    /// Only remote errors qualify: resource exhaustion, quota, model
    /// unavailability and argument rejection. The structured code decides
    /// first; the message is consulted only when the code is unrecognized.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote { code, message, .. } => match code {
                RemoteErrorCode::ResourceExhausted
                | RemoteErrorCode::Unavailable
                | RemoteErrorCode::InvalidArgument => true,
                RemoteErrorCode::Other(_) => message_suggests_retry(message),
                _ => false,
            },
            _ => false,
        }
    }
}

fn message_suggests_retry(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("resource exhausted")
        || lower.contains("resource_exhausted")
        || lower.contains("quota")
        || lower.contains("unavailable")
        || lower.contains("invalid argument")
        || lower.contains("invalid_argument")
}

/// Extracts the first candidate's first text part.
///
/// # Errors
///
/// Returns the [`InvocationError`] variant for the first validation stage
/// that fails.
pub fn extract_candidate_text(
    tier: &str,
    response: Option<GenerateContentResponse>,
) -> Result<String, InvocationError> {
    let tier = || tier.to_string();

    let response = response.ok_or_else(|| InvocationError::MissingResponse { tier: tier() })?;
    let candidates = response
        .candidates
        .ok_or_else(|| InvocationError::MissingCandidates { tier: tier() })?;
    let candidate = candidates
        .into_iter()
        .next()
        .ok_or_else(|| InvocationError::EmptyCandidates { tier: tier() })?;
    let parts = candidate
        .content
        .and_then(|content| content.parts)
        .ok_or_else(|| InvocationError::MalformedContent { tier: tier() })?;
    let part = parts
        .into_iter()
        .next()
        .ok_or_else(|| InvocationError::EmptyParts { tier: tier() })?;

    part.text
        .filter(|text| !text.is_empty())
        .ok_or_else(|| InvocationError::MissingText { tier: tier() })
}

/// Sends prompts to a tier and applies the fallback chain.
#[derive(Clone)]
pub struct ModelInvoker {
    client: Arc<dyn GenerationClient>,
    registry: Arc<ModelRegistry>,
    request_deadline: Duration,
}

impl fmt::Debug for ModelInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelInvoker")
            .field("client", &self.client.name())
            .field("request_deadline", &self.request_deadline)
            .finish_non_exhaustive()
    }
}

impl ModelInvoker {
    /// Default budget for the whole invocation, including any fallback hop.
    pub const DEFAULT_REQUEST_DEADLINE: Duration = Duration::from_secs(55);

    /// Creates an invoker.
    #[must_use]
    pub fn new(client: Arc<dyn GenerationClient>, registry: Arc<ModelRegistry>) -> Self {
        Self {
            client,
            registry,
            request_deadline: Self::DEFAULT_REQUEST_DEADLINE,
        }
    }

    /// Sets the request deadline after which no fallback hop is attempted.
    #[must_use]
    pub const fn with_request_deadline(mut self, deadline: Duration) -> Self {
        self.request_deadline = deadline;
        self
    }

    /// Budget after which no fallback hop is attempted.
    #[must_use]
    pub const fn request_deadline(&self) -> Duration {
        self.request_deadline
    }

    /// The tier registry.
    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Name of the underlying generation client.
    #[must_use]
    pub fn client_name(&self) -> &'static str {
        self.client.name()
    }

    /// Invokes the model for `tier`, retrying once on the fallback tier.
    ///
    /// Unknown tiers use the default tier's profile.
    ///
    /// # Errors
    ///
    /// Returns the last [`InvocationError`] when the call (and the fallback
    /// hop, if one was taken) fails.
    pub fn invoke(&self, prompt: &str, tier: &str) -> Result<InvocationResult, InvocationError> {
        let start = Instant::now();
        let resolved = self.resolve_tier(tier)?;

        let err = match self.attempt(prompt, &resolved) {
            Ok(text) => return Ok(Self::finish(prompt, text, resolved, None, start)),
            Err(err) => err,
        };

        if !err.is_retryable() {
            tracing::error!(
                tier = %resolved,
                error_code = err.code(),
                error = %err,
                "Model invocation failed (not retryable)"
            );
            return Err(err);
        }

        let Some(fallback) = self.registry.fallback_for(&resolved).map(str::to_string) else {
            tracing::error!(tier = %resolved, error_code = err.code(), "No fallback tier configured");
            return Err(err);
        };

        if fallback == resolved {
            tracing::error!(tier = %resolved, error_code = err.code(), "Fallback tier equals failed tier");
            return Err(err);
        }

        if start.elapsed() >= self.request_deadline {
            tracing::error!(
                tier = %resolved,
                fallback_tier = %fallback,
                elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                "Request deadline elapsed, skipping fallback"
            );
            return Err(err);
        }

        tracing::warn!(
            tier = %resolved,
            fallback_tier = %fallback,
            error_code = err.code(),
            error = %err,
            "Retrying with fallback tier"
        );
        metrics::counter!(
            "llm_fallbacks_total",
            "from" => resolved.clone(),
            "to" => fallback.clone()
        )
        .increment(1);

        match self.attempt(prompt, &fallback) {
            Ok(text) => Ok(Self::finish(prompt, text, fallback, Some(resolved), start)),
            Err(fallback_err) => {
                tracing::error!(
                    tier = %resolved,
                    fallback_tier = %fallback,
                    error_code = fallback_err.code(),
                    error = %fallback_err,
                    "Fallback tier failed"
                );
                Err(fallback_err)
            },
        }
    }

    fn resolve_tier(&self, tier: &str) -> Result<String, InvocationError> {
        self.registry
            .profile_or_default(tier)
            .map(|profile| profile.tier_id.clone())
            .map_err(|_| InvocationError::UnknownTier {
                tier: tier.to_string(),
            })
    }

    fn attempt(&self, prompt: &str, tier: &str) -> Result<String, InvocationError> {
        let profile = self
            .registry
            .get(tier)
            .ok_or_else(|| InvocationError::UnknownTier {
                tier: tier.to_string(),
            })?;

        let span = tracing::info_span!(
            "llm.request",
            client = self.client.name(),
            tier = tier,
            model = %profile.model_name,
            status = tracing::field::Empty,
            error_code = tracing::field::Empty
        );
        let _enter = span.enter();

        let request = GenerateContentRequest::new(prompt, profile);
        let attempt_start = Instant::now();
        let result = self
            .client
            .generate(profile, &request)
            .and_then(|response| extract_candidate_text(tier, response));
        let elapsed_ms = attempt_start.elapsed().as_secs_f64() * 1000.0;

        let status = if result.is_ok() { "success" } else { "error" };
        span.record("status", status);
        if let Err(err) = &result {
            span.record("error_code", err.code());
        }

        metrics::counter!(
            "llm_requests_total",
            "tier" => tier.to_string(),
            "status" => status
        )
        .increment(1);
        metrics::histogram!("llm_request_duration_ms", "tier" => tier.to_string())
            .record(elapsed_ms);

        result
    }

    fn finish(
        prompt: &str,
        raw_text: String,
        tier_used: String,
        fallback_from: Option<String>,
        start: Instant,
    ) -> InvocationResult {
        let processing_time_seconds = start.elapsed().as_secs_f64();
        tracing::info!(
            tier = %tier_used,
            fallback_from = fallback_from.as_deref(),
            processing_time_seconds,
            output_length = raw_text.chars().count(),
            "Model invocation succeeded"
        );

        InvocationResult {
            metadata: InvocationMetadata {
                timestamp: Utc::now(),
                input_length: prompt.chars().count(),
                output_length: raw_text.chars().count(),
            },
            raw_text,
            tier_used,
            processing_time_seconds,
            fallback_from,
        }
    }
}
