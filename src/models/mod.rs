//! Data models for the clinical brain pipeline.
//!
//! Selection, prompt and invocation types are request-scoped and never
//! persisted; the knowledge base is loaded once at startup.

mod analysis;
mod clinical;
mod invocation;
mod prompt;
mod selection;

pub use analysis::{
    AnalysisRequest, AnalysisResponse, ClinicalAnalysis, CostOptimization, Priority,
    ResponseMetadata, SessionQuality, Severity, SoapAnalysis, SoapScores, Suggestion, Warning,
};
pub use clinical::{SessionType, Specialty};
pub use invocation::{InvocationMetadata, InvocationResult};
pub use prompt::{ChunkPosition, KnowledgeBase, PromptRequest, TermDefinition};
pub use selection::{CostEstimate, ModelSelection, SelectionOptions, SelectionReason};
