//! Per-feature attempt state and its persistence.
//!
//! A [`Session`] holds everything the gates need to know about one
//! (session id, feature) pair: how many fix attempts were recorded, the
//! category of each failure, which advisories were already shown, and whether
//! the caller parked the feature by marking its test as skipped.
//!
//! # Architecture
//!
//! ```text
//! SessionStore (trait)
//!   ├── FileSessionStore   one JSON record per key, fs2 lock per key
//!   └── MockSessionStore   in-memory, with failure injection (testing)
//!
//! Session
//!   ├── metadata: RecordMetadata (version, ids, timestamps)
//!   ├── attempt_count / failure_categories
//!   ├── shown_hints
//!   ├── max_attempts (fixed at creation)
//!   ├── skipped
//!   └── acknowledged_at (per-attempt gate releases)
//! ```
//!
//! # Forward Compatibility
//!
//! Records carry a schema version. Incompatible or corrupted records are
//! reported as storage errors and kept on disk until the session is cleared.

pub mod persistence;

pub use persistence::FileSessionStore;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::advisory::HintKey;
use crate::error::{GuardError, Result};

/// Current schema version for session records.
/// Increment when making breaking changes to the serialization format.
pub const SESSION_RECORD_VERSION: u32 = 1;

/// Minimum supported schema version for backward compatibility.
pub const MIN_SUPPORTED_VERSION: u32 = 1;

// ============================================================================
// Keys and labels
// ============================================================================

/// Identifies one session record: an opaque session id plus a feature name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    session_id: String,
    feature: String,
}

impl SessionKey {
    /// Builds a key, rejecting blank session ids and feature names.
    pub fn new(session_id: impl Into<String>, feature: impl Into<String>) -> Result<Self> {
        let session_id = session_id.into().trim().to_string();
        let feature = feature.into().trim().to_string();

        if session_id.is_empty() {
            return Err(GuardError::invalid_request("session id must not be empty"));
        }
        if feature.is_empty() {
            return Err(GuardError::invalid_request("feature must not be empty"));
        }

        Ok(Self {
            session_id,
            feature,
        })
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn feature(&self) -> &str {
        &self.feature
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session_id, self.feature)
    }
}

/// Label produced by the external failure classifier.
///
/// Labels are normalised (trimmed, lowercased) so that `Selector-Timeout` and
/// `selector-timeout` compare equal. Equality is the only operation the gates
/// rely on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureCategory(String);

impl FailureCategory {
    /// Creates a category from a classifier label.
    pub fn new(label: impl AsRef<str>) -> Result<Self> {
        let normalised = label.as_ref().trim().to_lowercase();
        if normalised.is_empty() {
            return Err(GuardError::invalid_request(
                "failure category must not be empty",
            ));
        }
        Ok(Self(normalised))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for FailureCategory {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Evidence a caller can record out-of-band to release an attempt gate.
///
/// A recorded acknowledgement covers the current attempt only: the next
/// recorded failure invalidates it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Acknowledgement {
    /// External research into the repeated failure happened.
    ExternalResearch,
    /// A deep analysis of all attempts so far happened.
    DeepAnalysis,
}

impl fmt::Display for Acknowledgement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExternalResearch => write!(f, "external-research"),
            Self::DeepAnalysis => write!(f, "deep-analysis"),
        }
    }
}

// ============================================================================
// Session record
// ============================================================================

/// Record metadata containing version, identity, and timing information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordMetadata {
    /// Schema version for forward compatibility.
    pub version: u32,
    /// Session the record belongs to.
    pub session_id: String,
    /// Feature the record belongs to.
    pub feature: String,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

/// Persisted attempt state for one (session, feature) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub metadata: RecordMetadata,
    attempt_count: u32,
    failure_categories: Vec<FailureCategory>,
    shown_hints: BTreeSet<String>,
    max_attempts: u32,
    #[serde(default)]
    skipped: bool,
    /// Attempt count at which each acknowledgement was recorded.
    #[serde(default)]
    acknowledged_at: BTreeMap<Acknowledgement, u32>,
}

impl Session {
    /// Creates a fresh record with zero attempts.
    #[must_use]
    pub fn new(key: &SessionKey, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            metadata: RecordMetadata {
                version: SESSION_RECORD_VERSION,
                session_id: key.session_id().to_string(),
                feature: key.feature().to_string(),
                created_at: now,
                updated_at: now,
            },
            attempt_count: 0,
            failure_categories: Vec::new(),
            shown_hints: BTreeSet::new(),
            max_attempts,
            skipped: false,
            acknowledged_at: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    #[must_use]
    pub fn failure_categories(&self) -> &[FailureCategory] {
        &self.failure_categories
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    /// Hint keys shown so far, in sorted order.
    pub fn shown_hints(&self) -> impl Iterator<Item = &str> {
        self.shown_hints.iter().map(String::as_str)
    }

    #[must_use]
    pub fn has_shown(&self, hint: &HintKey) -> bool {
        self.shown_hints.contains(hint.as_str())
    }

    /// The most recently recorded failure category.
    #[must_use]
    pub fn latest_category(&self) -> Option<&FailureCategory> {
        self.failure_categories.last()
    }

    /// How many recorded failures share the latest failure's category.
    ///
    /// Counts every occurrence in the sequence, not only a trailing run.
    #[must_use]
    pub fn latest_category_count(&self) -> u32 {
        let Some(latest) = self.latest_category() else {
            return 0;
        };
        self.failure_categories
            .iter()
            .filter(|c| *c == latest)
            .count() as u32
    }

    /// Attempts left before the ceiling is reached.
    #[must_use]
    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt_count)
    }

    /// Appends a classified failure and bumps the attempt counter.
    pub fn record_failure(&mut self, category: FailureCategory) {
        self.failure_categories.push(category);
        self.attempt_count = self.failure_categories.len() as u32;
        self.touch();
    }

    /// Adds a hint key. Returns `false` if it was already present.
    pub fn mark_hint_shown(&mut self, hint: &HintKey) -> bool {
        let inserted = self.shown_hints.insert(hint.as_str().to_string());
        if inserted {
            self.touch();
        }
        inserted
    }

    /// Parks the feature for the rest of the session. Returns `false` if it
    /// was already skipped.
    pub fn mark_skipped(&mut self) -> bool {
        let changed = !self.skipped;
        self.skipped = true;
        if changed {
            self.touch();
        }
        changed
    }

    /// Records an acknowledgement for the current attempt.
    pub fn acknowledge(&mut self, ack: Acknowledgement) {
        self.acknowledged_at.insert(ack, self.attempt_count);
        self.touch();
    }

    /// True if `ack` was recorded and no failure was recorded since.
    #[must_use]
    pub fn is_acknowledged(&self, ack: Acknowledgement) -> bool {
        self.acknowledged_at.get(&ack) == Some(&self.attempt_count)
    }

    /// Checks if the record's schema version can be loaded.
    #[must_use]
    pub fn is_version_compatible(&self) -> bool {
        self.metadata.version >= MIN_SUPPORTED_VERSION
            && self.metadata.version <= SESSION_RECORD_VERSION
    }

    fn touch(&mut self) {
        self.metadata.updated_at = Utc::now();
    }
}

// ============================================================================
// Store abstraction
// ============================================================================

/// Durable keyed storage for [`Session`] records.
///
/// Every mutating call is a read-modify-write that implementations must
/// serialise per key.
pub trait SessionStore {
    /// Load the record for `key`, creating and persisting a fresh one if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage is unavailable.
    fn get(&self, key: &SessionKey) -> Result<Session>;

    /// Append a failure category and increment the attempt count.
    ///
    /// Returns the updated record.
    fn record_failure(&self, key: &SessionKey, category: FailureCategory) -> Result<Session>;

    /// Idempotently add a hint key. Returns `true` if it was newly added.
    fn mark_hint_shown(&self, key: &SessionKey, hint: &HintKey) -> Result<bool>;

    /// Idempotently park the feature. Returns `true` if this call changed it.
    fn mark_skipped(&self, key: &SessionKey) -> Result<bool>;

    /// Record an acknowledgement for the current attempt.
    fn acknowledge(&self, key: &SessionKey, ack: Acknowledgement) -> Result<Session>;

    /// Remove every record of a session. Returns how many were removed.
    fn clear(&self, session_id: &str) -> Result<usize>;

    /// Feature names recorded under a session, sorted.
    fn features(&self, session_id: &str) -> Result<Vec<String>>;
}
