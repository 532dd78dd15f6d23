//! Red-flag driven model tier selection.

use super::{FlagDetector, RedFlagDetector};
use crate::llm::{DEFAULT_TIER, ModelProfile, ModelRegistry, PREMIUM_TIER};
use crate::models::{CostEstimate, ModelSelection, SelectionOptions, SelectionReason};
use crate::{Error, Result};
use chrono::Utc;
use std::sync::Arc;

/// Red-flag count at or above which the premium tier is selected.
pub const PREMIUM_RED_FLAG_THRESHOLD: usize = 2;

/// Default output-token estimate used for cost comparison.
pub const DEFAULT_OUTPUT_TOKEN_ESTIMATE: usize = 1500;

/// Reasoning recorded when the caller forced a tier.
pub const FORCED_REASONING: &str = "forced";

/// Reasoning recorded when selection failed open.
pub const FALLBACK_REASONING: &str = "fallback due to error";

/// Chooses a model tier for a transcription.
#[derive(Clone)]
pub struct ModelSelector {
    detector: Arc<dyn FlagDetector>,
    registry: Arc<ModelRegistry>,
    output_token_estimate: usize,
}

impl std::fmt::Debug for ModelSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSelector")
            .field("output_token_estimate", &self.output_token_estimate)
            .finish_non_exhaustive()
    }
}

impl ModelSelector {
    /// Creates a selector using the lexicon detector.
    #[must_use]
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            detector: Arc::new(RedFlagDetector::new()),
            registry,
            output_token_estimate: DEFAULT_OUTPUT_TOKEN_ESTIMATE,
        }
    }

    /// Replaces the red-flag detector.
    #[must_use]
    pub fn with_detector(mut self, detector: Arc<dyn FlagDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Sets the output-token estimate used for cost comparison.
    #[must_use]
    pub const fn with_output_token_estimate(mut self, tokens: usize) -> Self {
        self.output_token_estimate = tokens;
        self
    }

    /// Selects a tier for the transcription.
    ///
    /// Internal detection or estimation failures fail open to the default
    /// tier instead of surfacing.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTier` if a forced tier is not in the registry.
    pub fn select_tier(
        &self,
        transcription: &str,
        options: &SelectionOptions,
    ) -> Result<ModelSelection> {
        let selection = match options.force_tier.as_deref() {
            Some(tier) => self.forced(transcription, tier)?,
            None => self.detect(transcription).unwrap_or_else(|err| {
                tracing::warn!(
                    error = %err,
                    default_tier = DEFAULT_TIER,
                    "Model selection failed, using default tier"
                );
                Self::fail_open(&err)
            }),
        };

        tracing::info!(
            tier = %selection.selected_tier,
            reason = selection.reason.as_str(),
            red_flags = selection.red_flags_detected,
            estimated_cost = selection.cost_estimate.tier_cost,
            "Model tier selected"
        );
        metrics::counter!(
            "model_selection_total",
            "tier" => selection.selected_tier.clone(),
            "reason" => selection.reason.as_str()
        )
        .increment(1);

        Ok(selection)
    }

    fn forced(&self, transcription: &str, tier: &str) -> Result<ModelSelection> {
        if !self.registry.contains(tier) {
            return Err(Error::UnknownTier(tier.to_string()));
        }

        let cost_estimate = self
            .estimate_cost(transcription, tier)
            .unwrap_or_else(|_| CostEstimate::unavailable());

        Ok(ModelSelection {
            selected_tier: tier.to_string(),
            red_flags_detected: 0,
            reason: SelectionReason::Forced,
            reasoning: FORCED_REASONING.to_string(),
            cost_estimate,
            timestamp: Utc::now(),
            error: None,
        })
    }

    fn detect(&self, transcription: &str) -> Result<ModelSelection> {
        let count = self.detector.count(transcription)?;

        let (tier, reason, reasoning) = if count >= PREMIUM_RED_FLAG_THRESHOLD {
            (
                PREMIUM_TIER,
                SelectionReason::RedFlags,
                format!(
                    "{count} banderas rojas críticas detectadas - usando modelo premium para máxima seguridad clínica"
                ),
            )
        } else {
            (
                DEFAULT_TIER,
                SelectionReason::CostOptimized,
                format!(
                    "{count} banderas rojas críticas detectadas (umbral {PREMIUM_RED_FLAG_THRESHOLD}) - usando modelo rápido para optimizar costos"
                ),
            )
        };

        Ok(ModelSelection {
            selected_tier: tier.to_string(),
            red_flags_detected: count,
            reason,
            reasoning,
            cost_estimate: self.estimate_cost(transcription, tier)?,
            timestamp: Utc::now(),
            error: None,
        })
    }

    fn fail_open(err: &Error) -> ModelSelection {
        ModelSelection {
            selected_tier: DEFAULT_TIER.to_string(),
            red_flags_detected: 0,
            reason: SelectionReason::ErrorFallback,
            reasoning: FALLBACK_REASONING.to_string(),
            cost_estimate: CostEstimate::unavailable(),
            timestamp: Utc::now(),
            error: Some(err.to_string()),
        }
    }

    fn profile(&self, tier: &str) -> Result<&ModelProfile> {
        self.registry
            .get(tier)
            .ok_or_else(|| Error::Selection(format!("no cost profile for tier '{tier}'")))
    }

    /// Estimates the cost of analyzing the transcription on `tier`,
    /// compared against the premium tier.
    ///
    /// # Errors
    ///
    /// Returns `Selection` if either tier has no profile.
    pub fn estimate_cost(&self, transcription: &str, tier: &str) -> Result<CostEstimate> {
        let input_tokens = transcription.chars().count() / 4;
        let output_tokens = self.output_token_estimate;

        let tier_cost = self.profile(tier)?.estimate_cost(input_tokens, output_tokens);
        let premium_cost = self
            .profile(PREMIUM_TIER)?
            .estimate_cost(input_tokens, output_tokens);

        let savings = premium_cost - tier_cost;
        let savings_percent = if premium_cost > 0.0 {
            savings / premium_cost * 100.0
        } else {
            0.0
        };
        let savings_description = if tier == PREMIUM_TIER {
            "Modelo premium seleccionado: sin ahorro frente a la alternativa de máxima seguridad"
                .to_string()
        } else {
            format!("Ahorro estimado de ${savings:.6} ({savings_percent:.1}%) frente al modelo premium")
        };

        Ok(CostEstimate {
            tier_cost,
            alternative_tier_cost: premium_cost,
            savings,
            savings_percent,
            savings_description,
        })
    }
}
