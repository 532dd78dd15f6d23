//! Clinical analysis request/response types.
//!
//! Field names are camelCase on the wire to match the front-end contract.

use super::CostEstimate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Severity of a clinical warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Requires immediate attention.
    High,
    /// Should be addressed in this session.
    Medium,
    /// Informational.
    Low,
}

/// Priority of a clinical suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    /// High priority.
    High,
    /// Medium priority.
    Medium,
    /// Low priority.
    Low,
}

/// A clinical warning raised by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    /// Identifier assigned by the model.
    pub id: String,
    /// Severity level.
    pub severity: Severity,
    /// Category (e.g. `contraindication`, `red_flag`).
    pub category: String,
    /// Short title.
    pub title: String,
    /// Description of the finding.
    pub description: String,
    /// Recommended action.
    pub recommendation: String,
    /// Supporting evidence quoted from the transcription.
    pub evidence: Vec<String>,
}

/// A clinical suggestion raised by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Identifier assigned by the model.
    pub id: String,
    /// Suggestion type (e.g. `question`, `test`, `treatment`).
    #[serde(rename = "type")]
    pub suggestion_type: String,
    /// Short title.
    pub title: String,
    /// Description.
    pub description: String,
    /// Clinical rationale.
    pub rationale: String,
    /// Priority level.
    pub priority: Priority,
}

/// Completeness scores (0-100) for each SOAP section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SoapScores {
    /// Subjective section.
    pub subjective: f64,
    /// Objective section.
    pub objective: f64,
    /// Assessment section.
    pub assessment: f64,
    /// Plan section.
    pub plan: f64,
}

impl SoapScores {
    /// Returns each score with its section name.
    #[must_use]
    pub const fn entries(&self) -> [(&'static str, f64); 4] {
        [
            ("subjective", self.subjective),
            ("objective", self.objective),
            ("assessment", self.assessment),
            ("plan", self.plan),
        ]
    }
}

/// SOAP note completeness analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoapAnalysis {
    /// Completeness per section.
    pub completeness_scores: SoapScores,
    /// Elements missing from the note.
    pub missing_elements: Vec<String>,
}

/// Quality assessment of the clinical session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuality {
    /// Named quality scores (0-100), e.g. `communication`, `clinicalReasoning`.
    pub scores: BTreeMap<String, f64>,
    /// Areas the clinician could improve.
    pub areas_for_improvement: Vec<String>,
}

/// Structured analysis parsed from the model response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalAnalysis {
    /// Clinical warnings.
    pub warnings: Vec<Warning>,
    /// Clinical suggestions.
    pub suggestions: Vec<Suggestion>,
    /// SOAP completeness analysis.
    pub soap_analysis: SoapAnalysis,
    /// Session quality assessment.
    pub session_quality: SessionQuality,
}

impl ClinicalAnalysis {
    /// Lists schema violations that serde cannot express.
    ///
    /// Scores must lie within `0..=100`.
    #[must_use]
    pub fn schema_violations(&self) -> Vec<String> {
        let soap = self
            .soap_analysis
            .completeness_scores
            .entries()
            .into_iter()
            .map(|(name, score)| (format!("soapAnalysis.completenessScores.{name}"), score));
        let quality = self
            .session_quality
            .scores
            .iter()
            .map(|(name, score)| (format!("sessionQuality.scores.{name}"), *score));

        soap.chain(quality)
            .filter(|(_, score)| !(0.0..=100.0).contains(score))
            .map(|(path, score)| format!("{path} out of range: {score}"))
            .collect()
    }

    /// Number of high-severity warnings.
    #[must_use]
    pub fn high_severity_count(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| w.severity == Severity::High)
            .count()
    }
}

/// Inbound analysis request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    /// Transcription text. Required and non-empty.
    #[serde(default)]
    pub transcription: String,
    /// Clinical specialty alias.
    #[serde(default)]
    pub specialty: Option<String>,
    /// Session type alias.
    #[serde(default)]
    pub session_type: Option<String>,
    /// Force a model tier, bypassing red-flag selection.
    #[serde(default)]
    pub force_model: Option<String>,
    /// 1-based chunk index when the caller splits long transcriptions.
    #[serde(default)]
    pub chunk_index: Option<u32>,
    /// Total number of chunks.
    #[serde(default)]
    pub total_chunks: Option<u32>,
}

impl AnalysisRequest {
    /// Creates a request for a transcription with default context.
    #[must_use]
    pub fn new(transcription: impl Into<String>) -> Self {
        Self {
            transcription: transcription.into(),
            ..Default::default()
        }
    }

    /// Sets the specialty.
    #[must_use]
    pub fn with_specialty(mut self, specialty: impl Into<String>) -> Self {
        self.specialty = Some(specialty.into());
        self
    }

    /// Sets the session type.
    #[must_use]
    pub fn with_session_type(mut self, session_type: impl Into<String>) -> Self {
        self.session_type = Some(session_type.into());
        self
    }

    /// Forces a model tier.
    #[must_use]
    pub fn with_force_model(mut self, tier: impl Into<String>) -> Self {
        self.force_model = Some(tier.into());
        self
    }
}

/// Cost optimization details reported back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostOptimization {
    /// Red flags counted during selection.
    pub red_flags_detected: usize,
    /// Selection reasoning.
    pub reasoning: String,
    /// Cost estimate for the call.
    pub cost_analysis: CostEstimate,
}

/// Metadata envelope attached to a successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    /// End-to-end processing time in milliseconds.
    pub processing_time_ms: u64,
    /// Tier that produced the analysis (after any fallback).
    pub model_used: String,
    /// Selection and cost details.
    pub cost_optimization: CostOptimization,
    /// Service version.
    pub version: String,
}

/// Successful analysis response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    /// Always true for this type.
    pub success: bool,
    /// The parsed analysis.
    #[serde(flatten)]
    pub analysis: ClinicalAnalysis,
    /// Response metadata.
    pub metadata: ResponseMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "warnings": [{
            "id": "w1",
            "severity": "HIGH",
            "category": "red_flag",
            "title": "Dolor torácico",
            "description": "Dolor irradiado a brazo izquierdo",
            "recommendation": "Derivar a urgencias",
            "evidence": ["dolor pecho irradiado a brazo izquierdo"]
        }],
        "suggestions": [{
            "id": "s1",
            "type": "test",
            "title": "ECG",
            "description": "Solicitar electrocardiograma",
            "rationale": "Descartar síndrome coronario",
            "priority": "HIGH"
        }],
        "soapAnalysis": {
            "completenessScores": {"subjective": 80, "objective": 40, "assessment": 60, "plan": 50},
            "missingElements": ["signos vitales"]
        },
        "sessionQuality": {
            "scores": {"communication": 85, "clinicalReasoning": 70},
            "areasForImprovement": ["documentar exploración física"]
        }
    }"#;

    #[test]
    fn test_clinical_analysis_deserialize() {
        let analysis: ClinicalAnalysis = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(analysis.warnings.len(), 1);
        assert_eq!(analysis.warnings[0].severity, Severity::High);
        assert_eq!(analysis.suggestions[0].suggestion_type, "test");
        assert_eq!(analysis.suggestions[0].priority, Priority::High);
        assert!((analysis.soap_analysis.completeness_scores.objective - 40.0).abs() < f64::EPSILON);
        assert_eq!(analysis.high_severity_count(), 1);
        assert!(analysis.schema_violations().is_empty());
    }

    #[test]
    fn test_schema_violations_reports_out_of_range_scores() {
        let mut analysis: ClinicalAnalysis = serde_json::from_str(SAMPLE).unwrap();
        analysis.soap_analysis.completeness_scores.plan = 140.0;
        analysis
            .session_quality
            .scores
            .insert("empathy".to_string(), -3.0);

        let violations = analysis.schema_violations();
        assert_eq!(violations.len(), 2);
        assert!(violations[0].contains("completenessScores.plan"));
        assert!(violations[1].contains("sessionQuality.scores.empathy"));
    }

    #[test]
    fn test_missing_required_fields_rejected() {
        let without_plan = SAMPLE.replace(r#", "plan": 50"#, "");
        assert!(serde_json::from_str::<ClinicalAnalysis>(&without_plan).is_err());

        let without_rationale = SAMPLE.replace(r#""rationale": "Descartar síndrome coronario","#, "");
        assert!(serde_json::from_str::<ClinicalAnalysis>(&without_rationale).is_err());

        let without_areas = SAMPLE.replace(
            r#",
            "areasForImprovement": ["documentar exploración física"]"#,
            "",
        );
        assert!(serde_json::from_str::<ClinicalAnalysis>(&without_areas).is_err());
    }

    #[test]
    fn test_unknown_severity_rejected() {
        let json = SAMPLE.replace(r#""severity": "HIGH""#, r#""severity": "URGENT""#);
        assert!(serde_json::from_str::<ClinicalAnalysis>(&json).is_err());
    }

    #[test]
    fn test_analysis_request_camel_case() {
        let request: AnalysisRequest = serde_json::from_str(
            r#"{"transcription": "texto", "sessionType": "followup", "forceModel": "premium", "totalChunks": 3, "chunkIndex": 2}"#,
        )
        .unwrap();
        assert_eq!(request.session_type.as_deref(), Some("followup"));
        assert_eq!(request.force_model.as_deref(), Some("premium"));
        assert_eq!(request.chunk_index, Some(2));
        assert_eq!(request.total_chunks, Some(3));
    }

    #[test]
    fn test_analysis_request_missing_transcription_defaults_empty() {
        let request: AnalysisRequest = serde_json::from_str(r#"{"specialty": "fisioterapia"}"#).unwrap();
        assert!(request.transcription.is_empty());
    }

    #[test]
    fn test_response_flattens_analysis() {
        let analysis: ClinicalAnalysis = serde_json::from_str(SAMPLE).unwrap();
        let response = AnalysisResponse {
            success: true,
            analysis,
            metadata: ResponseMetadata {
                processing_time_ms: 1200,
                model_used: "premium".to_string(),
                cost_optimization: CostOptimization {
                    red_flags_detected: 3,
                    reasoning: "3 banderas rojas críticas detectadas".to_string(),
                    cost_analysis: CostEstimate::unavailable(),
                },
                version: "test".to_string(),
            },
        };

        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("warnings").is_some());
        assert!(value.get("soapAnalysis").is_some());
        assert_eq!(value["metadata"]["modelUsed"], "premium");
        assert_eq!(value["metadata"]["costOptimization"]["redFlagsDetected"], 3);
        assert_eq!(value["success"], true);
    }
}
