//! Clinical analysis pipeline.
//!
//! Wires red-flag selection, prompt assembly, model invocation and response
//! parsing for one request at a time. All shared state is read-only.

use super::ModelSelector;
use crate::config::BrainConfig;
use crate::llm::{
    GenerationClient, LlmHttpConfig, ModelInvoker, ModelRegistry, PromptAssembler, VertexClient,
    extract_json_from_response,
};
use crate::models::{
    AnalysisRequest, AnalysisResponse, ClinicalAnalysis, CostOptimization, KnowledgeBase,
    ModelSelection, PromptRequest, ResponseMetadata, SelectionOptions, SessionType, Specialty,
};
use crate::{Error, Result};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Instant;

/// Service version reported in response metadata.
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// End-to-end clinical analysis service.
pub struct ClinicalBrainService {
    selector: ModelSelector,
    assembler: PromptAssembler,
    invoker: ModelInvoker,
    knowledge_base: Option<Arc<KnowledgeBase>>,
}

impl ClinicalBrainService {
    /// Creates a service from its parts.
    #[must_use]
    pub const fn new(
        selector: ModelSelector,
        assembler: PromptAssembler,
        invoker: ModelInvoker,
    ) -> Self {
        Self {
            selector,
            assembler,
            invoker,
            knowledge_base: None,
        }
    }

    /// Sets the knowledge base injected into every prompt.
    #[must_use]
    pub fn with_knowledge_base(mut self, knowledge_base: Option<Arc<KnowledgeBase>>) -> Self {
        self.knowledge_base = knowledge_base;
        self
    }

    /// Builds the service with a Vertex AI client from configuration.
    ///
    /// Must not be called from within an async runtime context.
    ///
    /// # Errors
    ///
    /// Returns an error if the model registry is invalid or the configured
    /// knowledge base cannot be loaded.
    pub fn from_config(config: &BrainConfig) -> Result<Self> {
        let http = LlmHttpConfig::from_config(&config.http);

        let mut client = VertexClient::new(config.vertex.project_id.clone())
            .with_location(config.vertex.location.clone())
            .with_http_config(http);
        if let Some(endpoint) = &config.vertex.endpoint {
            client = client.with_endpoint(endpoint.clone());
        }
        if let Some(token) = &config.vertex.access_token {
            client = client.with_access_token(SecretString::clone(token));
        }

        Self::build(config, Arc::new(client), http)
    }

    /// Builds the service from configuration with a caller-supplied client.
    ///
    /// # Errors
    ///
    /// Returns an error if the model registry is invalid or the configured
    /// knowledge base cannot be loaded.
    pub fn with_client(config: &BrainConfig, client: Arc<dyn GenerationClient>) -> Result<Self> {
        Self::build(config, client, LlmHttpConfig::from_config(&config.http))
    }

    fn build(
        config: &BrainConfig,
        client: Arc<dyn GenerationClient>,
        http: LlmHttpConfig,
    ) -> Result<Self> {
        let registry = ModelRegistry::builtin().with_model_overrides(config.model_overrides());
        registry.validate()?;
        let registry = Arc::new(registry);

        let knowledge_base = config.load_knowledge_base()?.map(Arc::new);
        if let Some(kb) = &knowledge_base {
            tracing::info!(specialties = kb.rules.len(), "Knowledge base loaded");
        }

        let selector = ModelSelector::new(Arc::clone(&registry))
            .with_output_token_estimate(config.selection.output_token_estimate);
        let assembler = PromptAssembler::new().with_audit(config.features.audit_log);
        let invoker = ModelInvoker::new(client, registry)
            .with_request_deadline(http.request_deadline());

        tracing::info!(
            client = invoker.client_name(),
            audit_log = config.features.audit_log,
            "Clinical brain service ready"
        );

        Ok(Self::new(selector, assembler, invoker).with_knowledge_base(knowledge_base))
    }

    /// The model selector.
    #[must_use]
    pub const fn selector(&self) -> &ModelSelector {
        &self.selector
    }

    /// Selects a tier for a request without invoking any model.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty transcription and `UnknownTier`
    /// for an unknown forced tier.
    pub fn select(&self, request: &AnalysisRequest) -> Result<ModelSelection> {
        let transcription = validate_transcription(&request.transcription)?;
        self.selector
            .select_tier(transcription, &selection_options(request))
    }

    /// Assembles the prompt a request would send.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty transcription.
    pub fn prompt_for(&self, request: &AnalysisRequest) -> Result<String> {
        let transcription = validate_transcription(&request.transcription)?;
        Ok(self.assembler.build_prompt(&self.prompt_request(request, transcription)))
    }

    /// Runs the full pipeline for one request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` or `UnknownTier` for bad requests, `Invocation`
    /// when the remote call fails after any fallback hop, and `Parsing` when
    /// the model output is not a valid analysis.
    pub fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse> {
        let start = Instant::now();
        let span = tracing::info_span!(
            "clinical_brain.analyze",
            request_id = crate::observability::current_request_id().as_deref(),
            specialty = tracing::field::Empty,
            tier = tracing::field::Empty,
        );
        let _enter = span.enter();

        let result = self.run(request, start);

        let status = match &result {
            Ok(_) => "success",
            Err(err) => err.kind(),
        };
        metrics::counter!("clinical_brain_requests_total", "status" => status).increment(1);

        match &result {
            Ok(response) => tracing::info!(
                model_used = %response.metadata.model_used,
                warnings = response.analysis.warnings.len(),
                high_severity = response.analysis.high_severity_count(),
                processing_time_ms = response.metadata.processing_time_ms,
                "Analysis complete"
            ),
            Err(err) if err.is_client_error() => {
                tracing::info!(error = %err, kind = err.kind(), "Analysis request rejected");
            },
            Err(err) => tracing::error!(error = %err, kind = err.kind(), "Analysis failed"),
        }

        result
    }

    fn run(&self, request: &AnalysisRequest, start: Instant) -> Result<AnalysisResponse> {
        let transcription = validate_transcription(&request.transcription)?;

        let selection = self
            .selector
            .select_tier(transcription, &selection_options(request))?;

        let prompt_request = self.prompt_request(request, transcription);
        let span = tracing::Span::current();
        span.record("specialty", prompt_request.specialty.as_str());
        span.record("tier", selection.selected_tier.as_str());

        let prompt = self.assembler.build_prompt(&prompt_request);
        let invocation = self.invoker.invoke(&prompt, &selection.selected_tier)?;
        let analysis = parse_analysis(&invocation.raw_text)?;

        let processing_time_ms =
            u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        Ok(AnalysisResponse {
            success: true,
            analysis,
            metadata: ResponseMetadata {
                processing_time_ms,
                model_used: invocation.tier_used,
                cost_optimization: CostOptimization {
                    red_flags_detected: selection.red_flags_detected,
                    reasoning: selection.reasoning,
                    cost_analysis: selection.cost_estimate,
                },
                version: SERVICE_VERSION.to_string(),
            },
        })
    }

    fn prompt_request<'a>(
        &'a self,
        request: &'a AnalysisRequest,
        transcription: &'a str,
    ) -> PromptRequest<'a> {
        PromptRequest::new(transcription)
            .with_specialty(Specialty::parse_opt(request.specialty.as_deref()))
            .with_session_type(SessionType::parse_opt(request.session_type.as_deref()))
            .with_knowledge_base(self.knowledge_base.as_deref())
            .with_chunk(request.chunk_index, request.total_chunks)
    }
}

impl std::fmt::Debug for ClinicalBrainService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClinicalBrainService")
            .field("selector", &self.selector)
            .field("assembler", &self.assembler)
            .field("knowledge_base", &self.knowledge_base.is_some())
            .finish_non_exhaustive()
    }
}

fn validate_transcription(transcription: &str) -> Result<&str> {
    if transcription.trim().is_empty() {
        return Err(Error::InvalidInput(
            "transcription is required and must not be empty".to_string(),
        ));
    }
    Ok(transcription)
}

fn selection_options(request: &AnalysisRequest) -> SelectionOptions {
    request
        .force_model
        .as_deref()
        .map(str::trim)
        .filter(|tier| !tier.is_empty())
        .map(SelectionOptions::forced)
        .unwrap_or_default()
}

/// Parses model output into a clinical analysis.
///
/// Code fences and surrounding prose are stripped before parsing.
///
/// # Errors
///
/// Returns `Parsing` if no valid analysis JSON can be extracted or a score
/// is out of range.
pub fn parse_analysis(raw_text: &str) -> Result<ClinicalAnalysis> {
    let json = extract_json_from_response(raw_text);

    let analysis: ClinicalAnalysis = serde_json::from_str(json).map_err(|e| {
        metrics::counter!("analysis_parse_failures_total").increment(1);
        tracing::warn!(
            error = %e,
            response_length = raw_text.len(),
            "Model response is not a valid analysis"
        );
        Error::Parsing {
            cause: e.to_string(),
        }
    })?;

    let violations = analysis.schema_violations();
    if !violations.is_empty() {
        metrics::counter!("analysis_parse_failures_total").increment(1);
        tracing::warn!(violations = violations.len(), "Model analysis violates schema");
        return Err(Error::Parsing {
            cause: violations.join("; "),
        });
    }

    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GenerateContentRequest, GenerateContentResponse, InvocationError, ModelProfile};
    use std::sync::Mutex;

    const VALID_ANALYSIS: &str = r#"{
        "warnings": [{
            "id": "w1",
            "severity": "HIGH",
            "category": "cardiovascular",
            "title": "Posible síndrome coronario",
            "description": "Dolor torácico irradiado",
            "recommendation": "Derivar a urgencias",
            "evidence": ["dolor pecho irradiado"]
        }],
        "suggestions": [],
        "soapAnalysis": {
            "completenessScores": {"subjective": 80, "objective": 40, "assessment": 60, "plan": 30},
            "missingElements": ["signos vitales"]
        },
        "sessionQuality": {
            "scores": {"comunicacion": 85},
            "areasForImprovement": []
        }
    }"#;

    struct RecordingClient {
        reply: String,
        prompts: Mutex<Vec<(String, String)>>,
    }

    impl RecordingClient {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl GenerationClient for RecordingClient {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn generate(
            &self,
            profile: &ModelProfile,
            request: &GenerateContentRequest,
        ) -> std::result::Result<Option<GenerateContentResponse>, InvocationError> {
            let text = request
                .contents
                .first()
                .and_then(|c| c.parts.as_ref())
                .and_then(|p| p.first())
                .and_then(|p| p.text.clone())
                .unwrap_or_default();
            self.prompts
                .lock()
                .unwrap()
                .push((profile.tier_id.clone(), text));
            Ok(Some(GenerateContentResponse::from_text(self.reply.clone())))
        }
    }

    fn service(reply: &str) -> (ClinicalBrainService, Arc<RecordingClient>) {
        let client = Arc::new(RecordingClient::new(reply));
        let service =
            ClinicalBrainService::with_client(&BrainConfig::default(), client.clone()).unwrap();
        (service, client)
    }

    #[test]
    fn test_injected_client_honors_deadline_override() {
        let config = BrainConfig::default().with_overrides_from(|name| {
            (name == "CLINICAL_BRAIN_REQUEST_DEADLINE_MS").then(|| "1234".to_string())
        });
        let client = Arc::new(RecordingClient::new(VALID_ANALYSIS));
        let service = ClinicalBrainService::with_client(&config, client).unwrap();
        assert_eq!(
            service.invoker.request_deadline(),
            std::time::Duration::from_millis(1234)
        );
    }

    #[test]
    fn test_empty_transcription_is_invalid_input() {
        let (service, client) = service(VALID_ANALYSIS);
        let err = service.analyze(&AnalysisRequest::new("   \n")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(client.prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_red_flags_route_to_premium() {
        let (service, client) = service(VALID_ANALYSIS);
        let response = service
            .analyze(&AnalysisRequest::new(
                "Paciente refiere dolor pecho irradiado a brazo izquierdo con sudoración",
            ))
            .unwrap();

        assert!(response.success);
        assert_eq!(response.metadata.model_used, "premium");
        assert!(response.metadata.cost_optimization.red_flags_detected >= 2);
        assert!(
            response
                .metadata
                .cost_optimization
                .reasoning
                .contains("banderas rojas críticas detectadas")
        );
        assert_eq!(response.metadata.version, SERVICE_VERSION);
        assert_eq!(response.analysis.high_severity_count(), 1);

        let prompts = client.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].0, "premium");
    }

    #[test]
    fn test_forced_tier_and_specialty_flow_into_prompt() {
        let (service, client) = service(VALID_ANALYSIS);
        let request = AnalysisRequest::new("Control de rodilla sin novedades")
            .with_specialty("fisioterapia")
            .with_force_model("baseline");
        let response = service.analyze(&request).unwrap();

        assert_eq!(response.metadata.model_used, "baseline");
        assert_eq!(response.metadata.cost_optimization.reasoning, "forced");

        let prompts = client.prompts.lock().unwrap();
        assert!(prompts[0].1.contains("Fisioterapia"));
        assert!(prompts[0].1.contains("Control de rodilla sin novedades"));
    }

    #[test]
    fn test_blank_force_model_is_ignored() {
        let (service, _client) = service(VALID_ANALYSIS);
        let selection = service
            .select(&AnalysisRequest::new("Control rutinario").with_force_model("  "))
            .unwrap();
        assert_eq!(selection.selected_tier, "fast");
    }

    #[test]
    fn test_unknown_forced_tier_is_client_error() {
        let (service, client) = service(VALID_ANALYSIS);
        let err = service
            .analyze(&AnalysisRequest::new("Control rutinario").with_force_model("ultra"))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownTier(ref t) if t == "ultra"));
        assert!(err.is_client_error());
        assert!(client.prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unparseable_output_is_parsing_error() {
        let (service, _client) = service("Lo siento, no puedo ayudar con eso.");
        let err = service
            .analyze(&AnalysisRequest::new("Control rutinario"))
            .unwrap_err();
        assert!(matches!(err, Error::Parsing { .. }));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_parse_analysis_strips_fences() {
        let fenced = format!("Aquí está el análisis:\n```json\n{VALID_ANALYSIS}\n```");
        let analysis = parse_analysis(&fenced).unwrap();
        assert_eq!(analysis.warnings.len(), 1);
        assert_eq!(analysis.soap_analysis.missing_elements, vec!["signos vitales"]);
    }

    #[test]
    fn test_parse_analysis_rejects_out_of_range_score() {
        let bad = VALID_ANALYSIS.replace("\"plan\": 30", "\"plan\": 130");
        let err = parse_analysis(&bad).unwrap_err();
        match err {
            Error::Parsing { cause } => assert!(cause.contains("plan")),
            other => panic!("expected parsing error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_analysis_rejects_missing_scores() {
        let raw = r#"{"warnings":[],"suggestions":[],"soapAnalysis":{"completenessScores":{}},"sessionQuality":{}}"#;
        let err = parse_analysis(raw).unwrap_err();
        assert!(matches!(err, Error::Parsing { .. }));
    }

    #[test]
    fn test_parse_analysis_rejects_missing_quality_scores() {
        let bad = VALID_ANALYSIS.replace(r#""scores": {"comunicacion": 85},"#, "");
        assert!(matches!(
            parse_analysis(&bad).unwrap_err(),
            Error::Parsing { .. }
        ));
    }

    #[test]
    fn test_prompt_for_marks_partial_chunk() {
        let (service, _client) = service(VALID_ANALYSIS);
        let mut request = AnalysisRequest::new("segunda parte de la sesión");
        request.chunk_index = Some(2);
        request.total_chunks = Some(3);
        let prompt = service.prompt_for(&request).unwrap();
        assert!(prompt.contains(crate::llm::PARTIAL_ANALYSIS_MARKER));
    }
}
