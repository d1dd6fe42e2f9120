//! Feature flags consulted by the scope authorizer.

use std::collections::BTreeMap;

use apigate_core::FeatureGate;

/// Fixed feature flag table. Flags not present in the table are enabled.
#[derive(Debug, Clone, Default)]
pub struct FeatureFlags {
    flags: BTreeMap<String, bool>,
}

impl FeatureFlags {
    #[must_use]
    pub fn new(flags: BTreeMap<String, bool>) -> Self {
        Self { flags }
    }
}

impl FeatureGate for FeatureFlags {
    fn is_enabled(&self, flag: &str) -> bool {
        self.flags.get(flag).copied().unwrap_or(true)
    }
}
