//! Static model tier registry and fallback chain.
//!
//! The registry is built once at startup, validated, and shared by reference.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tier used when nothing else applies.
pub const DEFAULT_TIER: &str = "fast";

/// Tier selected when enough red flags are detected.
pub const PREMIUM_TIER: &str = "premium";

/// Oldest, cheapest tier; only reached through the fallback chain.
pub const BASELINE_TIER: &str = "baseline";

/// Static fallback chain: failed tier → tier to retry with.
pub const FALLBACK_CHAIN: &[(&str, &str)] = &[
    (PREMIUM_TIER, DEFAULT_TIER),
    (DEFAULT_TIER, BASELINE_TIER),
    (BASELINE_TIER, DEFAULT_TIER),
];

/// Sampling parameters sent with each generation request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParameters {
    /// Sampling temperature.
    pub temperature: f32,
    /// Top-k sampling.
    pub top_k: u32,
    /// Nucleus sampling.
    pub top_p: f32,
    /// Maximum number of output tokens.
    pub max_output_tokens: u32,
    /// Number of candidates to generate.
    pub candidate_count: u32,
}

/// Static description of a model tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelProfile {
    /// Registry key.
    pub tier_id: String,
    /// Remote model identifier.
    pub model_name: String,
    /// USD per million input tokens.
    pub input_cost_per_million_tokens: f64,
    /// USD per million output tokens.
    pub output_cost_per_million_tokens: f64,
    /// Observed safety rating on clinical evaluations.
    pub empirical_safety_rating: String,
    /// Observed average latency.
    pub average_latency_seconds: f64,
    /// Generation parameters.
    pub generation_parameters: GenerationParameters,
    /// Harm category → block threshold.
    pub safety_thresholds: BTreeMap<String, String>,
}

impl ModelProfile {
    /// Estimates the cost of a call with the given token counts (USD).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn estimate_cost(&self, input_tokens: usize, output_tokens: usize) -> f64 {
        let input_cost = (input_tokens as f64 / 1_000_000.0) * self.input_cost_per_million_tokens;
        let output_cost =
            (output_tokens as f64 / 1_000_000.0) * self.output_cost_per_million_tokens;
        input_cost + output_cost
    }
}

/// Clinical content legitimately discusses injuries, drugs and self-harm, so
/// only high-probability harm is blocked.
fn clinical_safety_thresholds(dangerous_content: &str) -> BTreeMap<String, String> {
    [
        ("HARM_CATEGORY_HARASSMENT", "BLOCK_ONLY_HIGH"),
        ("HARM_CATEGORY_HATE_SPEECH", "BLOCK_ONLY_HIGH"),
        ("HARM_CATEGORY_SEXUALLY_EXPLICIT", "BLOCK_ONLY_HIGH"),
        ("HARM_CATEGORY_DANGEROUS_CONTENT", dangerous_content),
    ]
    .into_iter()
    .map(|(category, threshold)| (category.to_string(), threshold.to_string()))
    .collect()
}

/// Registry of model tiers.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    profiles: BTreeMap<String, ModelProfile>,
    fallbacks: BTreeMap<String, String>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModelRegistry {
    /// Builds the built-in registry (fast, premium, baseline).
    #[must_use]
    pub fn builtin() -> Self {
        let profiles = [
            ModelProfile {
                tier_id: DEFAULT_TIER.to_string(),
                model_name: "gemini-2.5-flash".to_string(),
                input_cost_per_million_tokens: 0.30,
                output_cost_per_million_tokens: 2.50,
                empirical_safety_rating: "alta (sin falsos negativos en casos sin banderas rojas)"
                    .to_string(),
                average_latency_seconds: 4.0,
                generation_parameters: GenerationParameters {
                    temperature: 0.2,
                    top_k: 40,
                    top_p: 0.8,
                    max_output_tokens: 8192,
                    candidate_count: 1,
                },
                safety_thresholds: clinical_safety_thresholds("BLOCK_ONLY_HIGH"),
            },
            ModelProfile {
                tier_id: PREMIUM_TIER.to_string(),
                model_name: "gemini-2.5-pro".to_string(),
                input_cost_per_million_tokens: 1.25,
                output_cost_per_million_tokens: 10.00,
                empirical_safety_rating: "máxima (100% de detección de banderas rojas)".to_string(),
                average_latency_seconds: 12.0,
                generation_parameters: GenerationParameters {
                    temperature: 0.1,
                    top_k: 32,
                    top_p: 0.9,
                    max_output_tokens: 8192,
                    candidate_count: 1,
                },
                safety_thresholds: clinical_safety_thresholds("BLOCK_ONLY_HIGH"),
            },
            ModelProfile {
                tier_id: BASELINE_TIER.to_string(),
                model_name: "gemini-2.0-flash".to_string(),
                input_cost_per_million_tokens: 0.10,
                output_cost_per_million_tokens: 0.40,
                empirical_safety_rating: "media (respaldo de disponibilidad)".to_string(),
                average_latency_seconds: 3.0,
                generation_parameters: GenerationParameters {
                    temperature: 0.2,
                    top_k: 40,
                    top_p: 0.8,
                    max_output_tokens: 8192,
                    candidate_count: 1,
                },
                safety_thresholds: clinical_safety_thresholds("BLOCK_MEDIUM_AND_ABOVE"),
            },
        ]
        .into_iter()
        .map(|profile| (profile.tier_id.clone(), profile))
        .collect();

        let fallbacks = FALLBACK_CHAIN
            .iter()
            .map(|(from, to)| ((*from).to_string(), (*to).to_string()))
            .collect();

        Self {
            profiles,
            fallbacks,
        }
    }

    /// Builds a registry from explicit profiles and fallback pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if the result fails [`ModelRegistry::validate`].
    pub fn from_parts(
        profiles: impl IntoIterator<Item = ModelProfile>,
        fallbacks: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self> {
        let registry = Self {
            profiles: profiles
                .into_iter()
                .map(|profile| (profile.tier_id.clone(), profile))
                .collect(),
            fallbacks: fallbacks.into_iter().collect(),
        };
        registry.validate()?;
        Ok(registry)
    }

    /// Overrides the remote model name of existing tiers.
    ///
    /// Unknown tiers are ignored with a warning.
    #[must_use]
    pub fn with_model_overrides<'a>(
        mut self,
        overrides: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        for (tier, model_name) in overrides {
            match self.profiles.get_mut(tier) {
                Some(profile) => {
                    tracing::debug!(tier, model_name, "Overriding tier model");
                    profile.model_name = model_name.to_string();
                },
                None => tracing::warn!(tier, "Ignoring model override for unknown tier"),
            }
        }
        self
    }

    /// Checks the registry invariants.
    ///
    /// The default and premium tiers must exist, and every tier named in the
    /// fallback chain must exist.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` describing the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        for required in [DEFAULT_TIER, PREMIUM_TIER] {
            if !self.contains(required) {
                return Err(Error::OperationFailed {
                    operation: "validate_model_registry".to_string(),
                    cause: format!("required tier '{required}' is missing"),
                });
            }
        }

        for (from, to) in &self.fallbacks {
            for tier in [from, to] {
                if !self.contains(tier) {
                    return Err(Error::OperationFailed {
                        operation: "validate_model_registry".to_string(),
                        cause: format!("fallback chain references unknown tier '{tier}'"),
                    });
                }
            }
        }

        Ok(())
    }

    /// Returns true if the tier exists.
    #[must_use]
    pub fn contains(&self, tier: &str) -> bool {
        self.profiles.contains_key(tier)
    }

    /// Looks up a tier profile.
    #[must_use]
    pub fn get(&self, tier: &str) -> Option<&ModelProfile> {
        self.profiles.get(tier)
    }

    /// Looks up a tier profile, falling back to the default tier.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTier` only if the default tier itself is missing,
    /// which [`ModelRegistry::validate`] rules out.
    pub fn profile_or_default(&self, tier: &str) -> Result<&ModelProfile> {
        self.get(tier)
            .or_else(|| {
                tracing::warn!(tier, default = DEFAULT_TIER, "Unknown tier, using default");
                self.get(DEFAULT_TIER)
            })
            .ok_or_else(|| Error::UnknownTier(DEFAULT_TIER.to_string()))
    }

    /// Returns the tier to retry with after `tier` fails.
    #[must_use]
    pub fn fallback_for(&self, tier: &str) -> Option<&str> {
        self.fallbacks.get(tier).map(String::as_str)
    }

    /// Iterates over all tier identifiers.
    pub fn tiers(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_is_valid() {
        let registry = ModelRegistry::builtin();
        assert!(registry.validate().is_ok());
        assert_eq!(
            registry.tiers().collect::<Vec<_>>(),
            vec![BASELINE_TIER, DEFAULT_TIER, PREMIUM_TIER]
        );
    }

    #[test]
    fn test_fallback_chain() {
        let registry = ModelRegistry::builtin();
        assert_eq!(registry.fallback_for(PREMIUM_TIER), Some(DEFAULT_TIER));
        assert_eq!(registry.fallback_for(DEFAULT_TIER), Some(BASELINE_TIER));
        assert_eq!(registry.fallback_for(BASELINE_TIER), Some(DEFAULT_TIER));
        assert_eq!(registry.fallback_for("unknown"), None);
    }

    #[test]
    fn test_profile_or_default() {
        let registry = ModelRegistry::builtin();
        let profile = registry.profile_or_default("does-not-exist").unwrap();
        assert_eq!(profile.tier_id, DEFAULT_TIER);

        let profile = registry.profile_or_default(PREMIUM_TIER).unwrap();
        assert_eq!(profile.tier_id, PREMIUM_TIER);
    }

    #[test]
    fn test_estimate_cost() {
        let registry = ModelRegistry::builtin();
        let premium = registry.get(PREMIUM_TIER).unwrap();
        // 1M input tokens + 1M output tokens
        let cost = premium.estimate_cost(1_000_000, 1_000_000);
        assert!((cost - 11.25).abs() < 1e-9);
        assert!(premium.estimate_cost(0, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_premium_costs_more_than_fast() {
        let registry = ModelRegistry::builtin();
        let fast = registry.get(DEFAULT_TIER).unwrap();
        let premium = registry.get(PREMIUM_TIER).unwrap();
        assert!(premium.estimate_cost(1000, 1500) > fast.estimate_cost(1000, 1500));
    }

    #[test]
    fn test_validate_rejects_dangling_fallback() {
        let builtin = ModelRegistry::builtin();
        let profiles: Vec<ModelProfile> = [DEFAULT_TIER, PREMIUM_TIER]
            .iter()
            .filter_map(|tier| builtin.get(tier).cloned())
            .collect();

        let result = ModelRegistry::from_parts(
            profiles,
            vec![(DEFAULT_TIER.to_string(), BASELINE_TIER.to_string())],
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("baseline"));
    }

    #[test]
    fn test_validate_requires_premium() {
        let builtin = ModelRegistry::builtin();
        let profiles: Vec<ModelProfile> = builtin.get(DEFAULT_TIER).cloned().into_iter().collect();

        let result = ModelRegistry::from_parts(profiles, Vec::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_model_overrides() {
        let registry =
            ModelRegistry::builtin().with_model_overrides([(PREMIUM_TIER, "gemini-3-pro"), ("nope", "x")]);
        assert_eq!(registry.get(PREMIUM_TIER).unwrap().model_name, "gemini-3-pro");
        assert!(!registry.contains("nope"));
    }

    #[test]
    fn test_safety_thresholds_cover_dangerous_content() {
        let registry = ModelRegistry::builtin();
        for tier in [DEFAULT_TIER, PREMIUM_TIER, BASELINE_TIER] {
            let profile = registry.get(tier).unwrap();
            assert!(profile.safety_thresholds.contains_key("HARM_CATEGORY_DANGEROUS_CONTENT"));
        }
    }
}
