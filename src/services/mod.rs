//! Business logic services.
//!
//! Red-flag detection and tier selection feed the analysis pipeline; the
//! chunker splits long transcriptions for fragment-by-fragment analysis.

mod analysis;
mod chunking;
mod model_selection;
mod red_flags;

pub use analysis::{ClinicalBrainService, SERVICE_VERSION, parse_analysis};
pub use chunking::chunk_transcription;
pub use model_selection::{
    DEFAULT_OUTPUT_TOKEN_ESTIMATE, FALLBACK_REASONING, FORCED_REASONING, ModelSelector,
    PREMIUM_RED_FLAG_THRESHOLD,
};
pub use red_flags::{FlagCategory, FlagDetector, FlagMatch, RED_FLAG_LEXICON, RedFlagDetector};
