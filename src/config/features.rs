//! Feature flags for optional functionality.

/// Feature flags for optional clinical brain behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Emit a prompt audit entry for every assembled prompt.
    pub audit_log: bool,
}

impl FeatureFlags {
    /// Creates feature flags with all features disabled.
    #[must_use]
    pub const fn none() -> Self {
        Self { audit_log: false }
    }

    /// Creates feature flags with all features enabled.
    #[must_use]
    pub const fn all() -> Self {
        Self { audit_log: true }
    }
}
