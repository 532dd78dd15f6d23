//! Vertex AI `generateContent` client.

use super::{
    GenerateContentRequest, GenerateContentResponse, GenerationClient, InvocationError,
    LlmHttpConfig, ModelProfile, RemoteErrorCode, build_http_client,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Vertex AI client.
pub struct VertexClient {
    /// GCP project identifier.
    project_id: String,
    /// Region, e.g. `us-central1`.
    location: String,
    /// Base endpoint override; defaults to the regional endpoint.
    endpoint: Option<String>,
    /// OAuth bearer token.
    access_token: Option<SecretString>,
    /// HTTP client.
    client: reqwest::blocking::Client,
}

impl VertexClient {
    /// Default region.
    pub const DEFAULT_LOCATION: &'static str = "us-central1";

    /// Creates a client for a project in the default region.
    ///
    /// Must not be called from within an async runtime context.
    #[must_use]
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            location: Self::DEFAULT_LOCATION.to_string(),
            endpoint: None,
            access_token: None,
            client: build_http_client(LlmHttpConfig::default()),
        }
    }

    /// Sets the region.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Overrides the base endpoint (scheme and host, no trailing slash).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_access_token(mut self, token: SecretString) -> Self {
        self.access_token = Some(token);
        self
    }

    /// Sets HTTP client timeouts.
    #[must_use]
    pub fn with_http_config(mut self, config: LlmHttpConfig) -> Self {
        self.client = build_http_client(config);
        self
    }

    /// Full `generateContent` URL for a model.
    #[must_use]
    pub fn model_url(&self, model_name: &str) -> String {
        let base = self.endpoint.clone().unwrap_or_else(|| {
            format!("https://{}-aiplatform.googleapis.com", self.location)
        });
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{model_name}:generateContent",
            base.trim_end_matches('/'),
            self.project_id,
            self.location,
        )
    }

    fn validate(&self, tier: &str) -> Result<&SecretString, InvocationError> {
        if self.project_id.trim().is_empty() {
            return Err(InvocationError::Remote {
                tier: tier.to_string(),
                code: RemoteErrorCode::Unauthenticated,
                message: "GOOGLE_CLOUD_PROJECT not set".to_string(),
            });
        }
        self.access_token
            .as_ref()
            .ok_or_else(|| InvocationError::Remote {
                tier: tier.to_string(),
                code: RemoteErrorCode::Unauthenticated,
                message: "VERTEX_ACCESS_TOKEN not set".to_string(),
            })
    }
}

impl GenerationClient for VertexClient {
    fn name(&self) -> &'static str {
        "vertex"
    }

    fn generate(
        &self,
        profile: &ModelProfile,
        request: &GenerateContentRequest,
    ) -> Result<Option<GenerateContentResponse>, InvocationError> {
        let tier = profile.tier_id.as_str();
        let token = self.validate(tier)?;

        tracing::info!(
            client = "vertex",
            tier,
            model = %profile.model_name,
            "Making generation request"
        );

        let response = self
            .client
            .post(self.model_url(&profile.model_name))
            .bearer_auth(token.expose_secret())
            .header("content-type", "application/json")
            .json(request)
            .send()
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connect"
                } else if e.is_request() {
                    "request"
                } else {
                    "unknown"
                };
                tracing::error!(
                    client = "vertex",
                    tier,
                    model = %profile.model_name,
                    error = %e,
                    error_kind = kind,
                    "Generation request failed"
                );
                InvocationError::Transport {
                    tier: tier.to_string(),
                    kind,
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        let body = response.text().map_err(|e| InvocationError::Transport {
            tier: tier.to_string(),
            kind: if e.is_timeout() { "timeout" } else { "body" },
            message: e.to_string(),
        })?;

        if !status.is_success() {
            let (code, message) = parse_error_body(status.as_u16(), &body);
            tracing::error!(
                client = "vertex",
                tier,
                model = %profile.model_name,
                status = %status,
                error_code = %code,
                "Generation API returned error status"
            );
            return Err(InvocationError::Remote {
                tier: tier.to_string(),
                code,
                message,
            });
        }

        parse_success_body(tier, &body)
    }
}

/// Error body: `{"error": {"code", "message", "status"}}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

fn parse_error_body(http_code: u16, body: &str) -> (RemoteErrorCode, String) {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (
            RemoteErrorCode::parse(envelope.error.status.as_deref(), http_code),
            envelope.error.message,
        ),
        Err(_) => (RemoteErrorCode::parse(None, http_code), body.trim().to_string()),
    }
}

fn parse_success_body(
    tier: &str,
    body: &str,
) -> Result<Option<GenerateContentResponse>, InvocationError> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(None);
    }
    serde_json::from_str(trimmed).map(Some).map_err(|e| {
        tracing::error!(client = "vertex", tier, error = %e, "Failed to parse generation response");
        InvocationError::MalformedContent {
            tier: tier.to_string(),
        }
    })
}
