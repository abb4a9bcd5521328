//! Capability declarations used by middleware filters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A set of receive or send capabilities declared by a bot.
///
/// Capabilities are named flags (`text`, `echo`, `quickReply`, ...). A
/// capability counts as supported only when it is declared `true`; absent
/// names are unsupported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(BTreeMap<String, bool>);

impl Capabilities {
    /// Creates an empty capability set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a capability (builder pattern).
    pub fn with(mut self, name: impl Into<String>, supported: bool) -> Self {
        self.0.insert(name.into(), supported);
        self
    }

    /// Declares a capability.
    pub fn set(&mut self, name: impl Into<String>, supported: bool) {
        self.0.insert(name.into(), supported);
    }

    /// Returns whether the capability is declared and `true`.
    pub fn supports(&self, name: &str) -> bool {
        self.0.get(name).copied().unwrap_or(false)
    }

    /// Iterates over supported capability names.
    pub fn supported(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, supported)| **supported)
            .map(|(name, _)| name.as_str())
    }
}

impl<S: Into<String>> FromIterator<(S, bool)> for Capabilities {
    fn from_iter<I: IntoIterator<Item = (S, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
