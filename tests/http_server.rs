//! HTTP router tests.
//!
//! Drives the axum router in-process with `tower::ServiceExt::oneshot`.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use clinical_brain::llm::{
    GenerateContentRequest, GenerateContentResponse, GenerationClient, InvocationError,
    ModelProfile, RemoteErrorCode,
};
use clinical_brain::observability::REQUEST_ID_HEADER;
use clinical_brain::{BrainConfig, ClinicalBrainService};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const ANALYSIS_JSON: &str = r#"{
    "warnings": [],
    "suggestions": [],
    "soapAnalysis": {
        "completenessScores": {"subjective": 60, "objective": 60, "assessment": 60, "plan": 60},
        "missingElements": []
    },
    "sessionQuality": {"scores": {}, "areasForImprovement": []}
}"#;

/// Client that always answers with the same reply.
struct FixedClient(Result<Option<GenerateContentResponse>, InvocationError>);

impl GenerationClient for FixedClient {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn generate(
        &self,
        _profile: &ModelProfile,
        _request: &GenerateContentRequest,
    ) -> Result<Option<GenerateContentResponse>, InvocationError> {
        self.0.clone()
    }
}

fn app_with(client: FixedClient, max_body_bytes: usize) -> axum::Router {
    let service =
        ClinicalBrainService::with_client(&BrainConfig::default(), Arc::new(client)).unwrap();
    clinical_brain::server::router(Arc::new(service), max_body_bytes)
}

fn app() -> axum::Router {
    app_with(
        FixedClient(Ok(Some(GenerateContentResponse::from_text(ANALYSIS_JSON)))),
        1024 * 1024,
    )
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_health() {
    let response = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_analyze_success_on_both_routes() {
    for uri in ["/analyze", "/"] {
        let request = json!({
            "transcription": "Paciente refiere dolor pecho irradiado a brazo izquierdo con sudoración",
            "specialty": "cardiologia",
        });
        let response = app()
            .oneshot(post(uri, request.to_string()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK, "route {uri}");
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        let body = read_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["metadata"]["modelUsed"], "premium");
        assert!(body["warnings"].is_array());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_request_id_is_echoed() {
    let request = Request::builder()
        .method("POST")
        .uri("/analyze")
        .header("content-type", "application/json")
        .header(REQUEST_ID_HEADER, "consulta-42")
        .body(Body::from(json!({"transcription": "Control rutinario"}).to_string()))
        .unwrap();
    let response = app().oneshot(request).await.unwrap();

    assert_eq!(
        response.headers()[REQUEST_ID_HEADER].to_str().unwrap(),
        "consulta-42"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_transcription_is_bad_request() {
    let response = app()
        .oneshot(post("/analyze", json!({"specialty": "general"}).to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("transcription"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_malformed_json_is_bad_request() {
    let response = app()
        .oneshot(post("/analyze", "{\"transcription\": "))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "malformed JSON body");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_forced_tier_is_bad_request() {
    let request = json!({"transcription": "Control rutinario", "forceModel": "ultra"});
    let response = app()
        .oneshot(post("/analyze", request.to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["details"], "ultra");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_oversized_body_is_rejected() {
    let transcription = "a".repeat(512);
    let response = app_with(
        FixedClient(Ok(Some(GenerateContentResponse::from_text(ANALYSIS_JSON)))),
        128,
    )
    .oneshot(post(
        "/analyze",
        json!({"transcription": transcription}).to_string(),
    ))
    .await
    .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = read_json(response).await;
    assert_eq!(body["success"], false);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invocation_failure_is_server_error_without_internals() {
    let client = FixedClient(Err(InvocationError::Remote {
        tier: "fast".to_string(),
        code: RemoteErrorCode::PermissionDenied,
        message: "project 98765 lacks aiplatform.endpoints.predict".to_string(),
    }));
    let response = app_with(client, 1024)
        .oneshot(post(
            "/analyze",
            json!({"transcription": "Control rutinario"}).to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["details"], "PERMISSION_DENIED");
    assert!(!body.to_string().contains("98765"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unparseable_model_output_is_server_error() {
    let client = FixedClient(Ok(Some(GenerateContentResponse::from_text("sin JSON"))));
    let response = app_with(client, 1024)
        .oneshot(post(
            "/analyze",
            json!({"transcription": "Control rutinario"}).to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json(response).await;
    assert_eq!(body["error"], "model response could not be parsed");
}
