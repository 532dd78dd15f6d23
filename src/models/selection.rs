//! Model selection result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Options that influence tier selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionOptions {
    /// Skip red-flag detection and use this tier.
    pub force_tier: Option<String>,
}

impl SelectionOptions {
    /// Creates options that force a specific tier.
    #[must_use]
    pub fn forced(tier: impl Into<String>) -> Self {
        Self {
            force_tier: Some(tier.into()),
        }
    }
}

/// Comparative cost estimate for a single generation call (USD).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimate {
    /// Estimated cost on the selected tier.
    pub tier_cost: f64,
    /// Estimated cost on the premium tier.
    pub alternative_tier_cost: f64,
    /// `alternative_tier_cost - tier_cost`.
    pub savings: f64,
    /// Savings as a percentage of the premium cost (0 when premium was chosen).
    pub savings_percent: f64,
    /// Human-readable summary of the savings.
    pub savings_description: String,
}

impl CostEstimate {
    /// Estimate used when estimation itself failed.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            tier_cost: 0.0,
            alternative_tier_cost: 0.0,
            savings: 0.0,
            savings_percent: 0.0,
            savings_description: "Estimación de costo no disponible".to_string(),
        }
    }
}

/// Why a tier was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    /// The caller forced the tier.
    Forced,
    /// Red-flag count reached the premium threshold.
    RedFlags,
    /// Red-flag count stayed below the premium threshold.
    CostOptimized,
    /// Detection or estimation failed; fell open to the default tier.
    ErrorFallback,
}

impl SelectionReason {
    /// Returns the reason as a metrics label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Forced => "forced",
            Self::RedFlags => "red_flags",
            Self::CostOptimized => "cost_optimized",
            Self::ErrorFallback => "error_fallback",
        }
    }
}

/// Result of model tier selection for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSelection {
    /// Registry key of the chosen tier.
    pub selected_tier: String,
    /// Number of distinct red-flag phrases found (0 when forced or on error).
    pub red_flags_detected: usize,
    /// Classification of the decision.
    pub reason: SelectionReason,
    /// Human-readable reasoning.
    pub reasoning: String,
    /// Comparative cost estimate.
    pub cost_estimate: CostEstimate,
    /// When the selection was made.
    pub timestamp: DateTime<Utc>,
    /// Error message when selection failed open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelSelection {
    /// Returns true if the selection failed open after an internal error.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self.reason, SelectionReason::ErrorFallback)
    }
}
