//! Prompt audit logging.
//!
//! Each audited prompt yields one entry on the `audit` tracing target. The
//! entry identifies the prompt by its SHA-256 digest and length; neither the
//! prompt nor the transcription text is ever logged.

use crate::models::{PromptRequest, SessionType, Specialty};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Event type recorded for assembled prompts.
pub const PROMPT_ASSEMBLED_EVENT: &str = "prompt.assembled";

/// Audit record for one assembled prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptAuditEntry {
    /// Unique entry ID.
    pub id: String,
    /// When the prompt was assembled.
    pub timestamp: DateTime<Utc>,
    /// Event type.
    pub event_type: String,
    /// Request correlation ID, when inside a request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Specialty block used.
    pub specialty: Specialty,
    /// Session block used (ignored in chunked mode).
    pub session_type: SessionType,
    /// 1-based chunk index, in chunked mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
    /// Total chunks, in chunked mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u32>,
    /// Whether a knowledge base was injected.
    pub knowledge_base: bool,
    /// Prompt length in characters.
    pub prompt_length: usize,
    /// Hex-encoded SHA-256 of the prompt.
    pub prompt_sha256: String,
}

impl PromptAuditEntry {
    /// Builds the audit entry for a prompt assembled from `request`.
    #[must_use]
    pub fn from_request(request: &PromptRequest<'_>, prompt: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: PROMPT_ASSEMBLED_EVENT.to_string(),
            request_id: crate::observability::current_request_id(),
            specialty: request.specialty,
            session_type: request.session_type,
            chunk_index: request.chunk.map(|c| c.index),
            total_chunks: request.chunk.map(|c| c.total),
            knowledge_base: request.knowledge_base.is_some(),
            prompt_length: prompt.chars().count(),
            prompt_sha256: prompt_digest(prompt),
        }
    }

    /// Emits the entry on the `audit` target.
    pub fn record(&self) {
        match serde_json::to_string(self) {
            Ok(entry) => tracing::info!(
                target: "audit",
                audit_id = %self.id,
                event_type = %self.event_type,
                prompt_sha256 = %self.prompt_sha256,
                entry = %entry,
                "Prompt audit entry"
            ),
            Err(e) => tracing::warn!(target: "audit", error = %e, "Failed to serialize audit entry"),
        }
    }
}

/// Hex-encoded SHA-256 digest of a prompt.
#[must_use]
pub fn prompt_digest(prompt: &str) -> String {
    hex::encode(Sha256::digest(prompt.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KnowledgeBase;

    #[test]
    fn test_prompt_digest_known_value() {
        assert_eq!(
            prompt_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_entry_from_chunked_request() {
        let kb = KnowledgeBase::default();
        let request = PromptRequest::new("texto de la sesión")
            .with_specialty(Specialty::Neurology)
            .with_knowledge_base(Some(&kb))
            .with_chunk(Some(2), Some(3));
        let entry = PromptAuditEntry::from_request(&request, "prompt ñ");

        assert_eq!(entry.event_type, PROMPT_ASSEMBLED_EVENT);
        assert_eq!(entry.specialty, Specialty::Neurology);
        assert_eq!(entry.chunk_index, Some(2));
        assert_eq!(entry.total_chunks, Some(3));
        assert!(entry.knowledge_base);
        assert_eq!(entry.prompt_length, 8);
        assert_eq!(entry.prompt_sha256, prompt_digest("prompt ñ"));
    }

    #[test]
    fn test_entry_never_contains_text() {
        let transcription = "paciente con dolor torácico";
        let request = PromptRequest::new(transcription);
        let entry = PromptAuditEntry::from_request(&request, transcription);
        let json = serde_json::to_string(&entry).unwrap();

        assert!(!json.contains(transcription));
        assert!(!json.contains("chunk_index"));
    }
}
