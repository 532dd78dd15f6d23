//! Prompt request and knowledge-base types.

use super::{SessionType, Specialty};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A term and its clinical definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermDefinition {
    /// The term.
    pub term: String,
    /// Its definition.
    pub definition: String,
}

/// Clinical rules and terminology keyed by specialty.
///
/// Keys may use any alias accepted by [`Specialty::from_alias`]. Entries
/// for aliases of one specialty are merged in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    /// Clinical rules per specialty.
    #[serde(default)]
    pub rules: BTreeMap<String, Vec<String>>,
    /// Terminology per specialty.
    #[serde(default)]
    pub terminology: BTreeMap<String, Vec<TermDefinition>>,
}

impl KnowledgeBase {
    /// Loads a knowledge base from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_knowledge_base".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        serde_json::from_str(&contents).map_err(|e| Error::OperationFailed {
            operation: "parse_knowledge_base".to_string(),
            cause: format!("{}: {e}", path.display()),
        })
    }

    /// Rules that apply to a specialty.
    #[must_use]
    pub fn rules_for(&self, specialty: Specialty) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|(key, _)| Specialty::from_alias(key) == Some(specialty))
            .flat_map(|(_, rules)| rules.iter().map(String::as_str))
            .collect()
    }

    /// Terminology that applies to a specialty.
    #[must_use]
    pub fn terminology_for(&self, specialty: Specialty) -> Vec<&TermDefinition> {
        self.terminology
            .iter()
            .filter(|(key, _)| Specialty::from_alias(key) == Some(specialty))
            .flat_map(|(_, terms)| terms.iter())
            .collect()
    }

    /// Returns true if the knowledge base holds no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.values().all(Vec::is_empty) && self.terminology.values().all(Vec::is_empty)
    }
}

/// Position of a chunk within a chunked transcription (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPosition {
    /// 1-based index of this chunk.
    pub index: u32,
    /// Total number of chunks.
    pub total: u32,
}

impl ChunkPosition {
    /// Normalizes raw chunk fields.
    ///
    /// Returns `None` when no total was given or the total is zero
    /// (whole-transcription mode). The index is clamped into `1..=total`.
    #[must_use]
    pub fn normalize(index: Option<u32>, total: Option<u32>) -> Option<Self> {
        let total = total.filter(|t| *t > 0)?;
        let index = index.unwrap_or(1).clamp(1, total);
        Some(Self { index, total })
    }

    /// Returns true if the transcription was split into more than one chunk.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        self.total > 1
    }
}

/// Inputs for prompt assembly.
#[derive(Debug, Clone, Copy)]
pub struct PromptRequest<'a> {
    /// Transcription text (or chunk text) to analyze.
    pub transcription: &'a str,
    /// Clinical specialty.
    pub specialty: Specialty,
    /// Session type.
    pub session_type: SessionType,
    /// Optional knowledge base to inject.
    pub knowledge_base: Option<&'a KnowledgeBase>,
    /// Chunk position, when analyzing a fragment.
    pub chunk: Option<ChunkPosition>,
}

impl<'a> PromptRequest<'a> {
    /// Creates a whole-transcription request with default specialty and session.
    #[must_use]
    pub fn new(transcription: &'a str) -> Self {
        Self {
            transcription,
            specialty: Specialty::default(),
            session_type: SessionType::default(),
            knowledge_base: None,
            chunk: None,
        }
    }

    /// Sets the specialty.
    #[must_use]
    pub const fn with_specialty(mut self, specialty: Specialty) -> Self {
        self.specialty = specialty;
        self
    }

    /// Sets the session type.
    #[must_use]
    pub const fn with_session_type(mut self, session_type: SessionType) -> Self {
        self.session_type = session_type;
        self
    }

    /// Sets the knowledge base.
    #[must_use]
    pub const fn with_knowledge_base(mut self, knowledge_base: Option<&'a KnowledgeBase>) -> Self {
        self.knowledge_base = knowledge_base;
        self
    }

    /// Sets the chunk position from raw index/total fields.
    #[must_use]
    pub fn with_chunk(mut self, index: Option<u32>, total: Option<u32>) -> Self {
        self.chunk = ChunkPosition::normalize(index, total);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_kb() -> KnowledgeBase {
        let mut kb = KnowledgeBase::default();
        kb.rules.insert(
            "Fisioterapia".to_string(),
            vec!["Evaluar rango de movimiento".to_string()],
        );
        kb.rules.insert(
            "physiotherapy".to_string(),
            vec!["Registrar escala EVA".to_string()],
        );
        kb.terminology.insert(
            "cardiologia".to_string(),
            vec![TermDefinition {
                term: "FEVI".to_string(),
                definition: "Fracción de eyección del ventrículo izquierdo".to_string(),
            }],
        );
        kb
    }

    #[test]
    fn test_rules_for_merges_aliases() {
        let kb = sample_kb();
        let mut rules = kb.rules_for(Specialty::Physiotherapy);
        rules.sort_unstable();
        assert_eq!(
            rules,
            vec!["Evaluar rango de movimiento", "Registrar escala EVA"]
        );
        assert!(kb.rules_for(Specialty::Neurology).is_empty());
    }

    #[test]
    fn test_alias_merge_order_is_stable() {
        let json = r#"{
            "rules": {
                "fisioterapia": ["Regla A"],
                "physiotherapy": ["Regla B"],
                "fisio": ["Regla C"],
                "kinesiologia": ["Regla D"]
            },
            "terminology": {}
        }"#;
        let expected = vec!["Regla C", "Regla A", "Regla D", "Regla B"];
        for _ in 0..20 {
            let kb: KnowledgeBase = serde_json::from_str(json).unwrap();
            assert_eq!(kb.rules_for(Specialty::Physiotherapy), expected);
        }
    }

    #[test]
    fn test_terminology_for() {
        let kb = sample_kb();
        let terms = kb.terminology_for(Specialty::Cardiology);
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].term, "FEVI");
    }

    #[test]
    fn test_is_empty() {
        assert!(KnowledgeBase::default().is_empty());
        assert!(!sample_kb().is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(
            &path,
            r#"{"rules": {"neurologia": ["Escala de Glasgow"]}, "terminology": {}}"#,
        )
        .unwrap();

        let kb = KnowledgeBase::load_from_file(&path).unwrap();
        assert_eq!(kb.rules_for(Specialty::Neurology), vec!["Escala de Glasgow"]);
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(&path, "not json").unwrap();

        let err = KnowledgeBase::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("parse_knowledge_base"));
    }

    #[test]
    fn test_chunk_normalize() {
        assert_eq!(ChunkPosition::normalize(Some(2), None), None);
        assert_eq!(ChunkPosition::normalize(Some(2), Some(0)), None);
        assert_eq!(
            ChunkPosition::normalize(Some(2), Some(3)),
            Some(ChunkPosition { index: 2, total: 3 })
        );
        assert_eq!(
            ChunkPosition::normalize(Some(9), Some(3)),
            Some(ChunkPosition { index: 3, total: 3 })
        );
        assert_eq!(
            ChunkPosition::normalize(None, Some(1)),
            Some(ChunkPosition { index: 1, total: 1 })
        );
        assert!(!ChunkPosition { index: 1, total: 1 }.is_partial());
    }
}
