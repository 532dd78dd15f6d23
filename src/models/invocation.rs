//! Model invocation result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Basic metadata about a generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationMetadata {
    /// When the call completed.
    pub timestamp: DateTime<Utc>,
    /// Prompt length in characters.
    pub input_length: usize,
    /// Response text length in characters.
    pub output_length: usize,
}

/// Successful result of a generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    /// Text extracted from the first candidate's first part.
    pub raw_text: String,
    /// Tier that produced the text.
    pub tier_used: String,
    /// Wall-clock time of the whole invocation, including any fallback hop.
    pub processing_time_seconds: f64,
    /// Call metadata.
    pub metadata: InvocationMetadata,
    /// Originally requested tier when a fallback hop produced the text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_from: Option<String>,
}

impl InvocationResult {
    /// Returns true if the text came from a fallback tier.
    #[must_use]
    pub const fn used_fallback(&self) -> bool {
        self.fallback_from.is_some()
    }
}
