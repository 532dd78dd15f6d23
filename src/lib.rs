//! # Clinical Brain
//!
//! Cost-optimized model selection and prompt assembly for clinical
//! transcription analysis.
//!
//! Given a medical transcription, the pipeline:
//!
//! 1. counts critical clinical red flags in the text,
//! 2. picks a model tier (fast or premium) and estimates the cost of the call,
//! 3. assembles a structured prompt from specialty, session, knowledge-base and
//!    output-contract fragments,
//! 4. invokes the remote generation API with a one-hop fallback chain, and
//! 5. parses the model output into a [`ClinicalAnalysis`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use clinical_brain::{AnalysisRequest, ClinicalBrainService, BrainConfig};
//!
//! let service = ClinicalBrainService::from_config(&BrainConfig::load_default())?;
//! let response = service.analyze(&AnalysisRequest::new(
//!     "Paciente refiere dolor pecho irradiado a brazo izquierdo con sudoración",
//! ))?;
//! println!("{}", response.metadata.model_used);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod llm;
pub mod models;
pub mod observability;
pub mod security;
pub mod server;
pub mod services;

// Re-exports for convenience
pub use config::{BrainConfig, FeatureFlags};
pub use llm::{GenerationClient, InvocationError, ModelInvoker, ModelRegistry, PromptAssembler};
pub use models::{
    AnalysisRequest, AnalysisResponse, ClinicalAnalysis, InvocationResult, ModelSelection,
    PromptRequest, SessionType, Specialty,
};
pub use services::{ClinicalBrainService, FlagDetector, ModelSelector, RedFlagDetector};

/// Error type for clinical brain operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When | HTTP |
/// |---------|-------------|------|
/// | `InvalidInput` | Empty transcription, malformed request body | 400 |
/// | `UnknownTier` | A forced tier is not in the model registry | 400 |
/// | `Selection` | Red-flag counting or cost estimation fails (recovered, never surfaced) | - |
/// | `Invocation` | Remote call failed or returned a malformed payload | 500 |
/// | `Parsing` | Model text is not valid JSON or violates the analysis schema | 500 |
/// | `OperationFailed` | Config loading, I/O, server startup | 500 |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A forced model tier does not exist in the registry.
    #[error("unknown model tier: {0}")]
    UnknownTier(String),

    /// Internal fault during red-flag counting or cost estimation.
    ///
    /// The model selector recovers from this by failing open to the default
    /// tier, so it never reaches a caller through the pipeline.
    #[error("model selection failed: {0}")]
    Selection(String),

    /// The remote generation call failed or its response was malformed.
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    /// The model response could not be parsed into a clinical analysis.
    #[error("failed to parse model response: {cause}")]
    Parsing {
        /// The underlying cause.
        cause: String,
    },

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Returns true if the error was caused by the caller's input.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::UnknownTier(_))
    }

    /// Short machine-readable label used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::UnknownTier(_) => "unknown_tier",
            Self::Selection(_) => "selection",
            Self::Invocation(_) => "invocation",
            Self::Parsing { .. } => "parsing",
            Self::OperationFailed { .. } => "operation_failed",
        }
    }
}

/// Result type alias for clinical brain operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("transcription is empty".to_string());
        assert_eq!(err.to_string(), "invalid input: transcription is empty");

        let err = Error::UnknownTier("ultra".to_string());
        assert_eq!(err.to_string(), "unknown model tier: ultra");

        let err = Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: "not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "operation 'read_config_file' failed: not found"
        );
    }

    #[test]
    fn test_client_error_classification() {
        assert!(Error::InvalidInput(String::new()).is_client_error());
        assert!(Error::UnknownTier("x".to_string()).is_client_error());
        assert!(
            !Error::Parsing {
                cause: "eof".to_string()
            }
            .is_client_error()
        );
        let err = Error::Invocation(InvocationError::MissingResponse {
            tier: "fast".to_string(),
        });
        assert!(!err.is_client_error());
        assert_eq!(err.kind(), "invocation");
    }
}
