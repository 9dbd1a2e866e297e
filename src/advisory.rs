//! Once-per-session advisory deduplication.
//!
//! Hint keys have the form `{hintType}_{feature}` so the same hint type is
//! tracked independently for every feature.

use std::fmt;

use crate::error::Result;
use crate::session::{SessionKey, SessionStore};

/// Kinds of deduplicated advisories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HintType {
    /// Context for the feature has not been loaded before a test run.
    ContextReminder,
}

impl HintType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContextReminder => "context_reminder",
        }
    }
}

impl fmt::Display for HintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dedup key for one hint type on one feature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HintKey(String);

impl HintKey {
    #[must_use]
    pub fn new(hint_type: HintType, feature: &str) -> Self {
        Self(format!("{}_{}", hint_type.as_str(), feature))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Claims a hint for emission.
pub struct AdvisoryDeduplicator<'a, S: SessionStore> {
    store: &'a S,
}

impl<'a, S: SessionStore> AdvisoryDeduplicator<'a, S> {
    #[must_use]
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Persists the hint as shown. Returns `true` if this call added it.
    ///
    /// The store serialises the update per key, so among concurrent callers
    /// exactly one gets `true`.
    pub fn mark_shown(&self, key: &SessionKey, hint: &HintKey) -> Result<bool> {
        self.store.mark_hint_shown(key, hint)
    }
}
