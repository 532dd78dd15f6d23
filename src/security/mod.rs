//! Security features.
//!
//! Prompt audit logging.

mod audit;

pub use audit::{PROMPT_ASSEMBLED_EVENT, PromptAuditEntry, prompt_digest};
