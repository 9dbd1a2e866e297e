//! Mock implementations of the store and context seams.
//!
//! These mocks provide controllable test doubles for external dependencies,
//! enabling deterministic unit tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use crate::advisory::HintKey;
use crate::context::ContextSource;
use crate::error::{GuardError, Result};
use crate::session::{Acknowledgement, FailureCategory, Session, SessionKey, SessionStore};

/// Mock context store.
///
/// # Example
///
/// ```rust,ignore
/// let context = MockContextSource::with_features(&["login"]);
/// assert!(context.context_exists("login"));
/// context.add("checkout");
/// ```
#[derive(Debug, Default)]
pub struct MockContextSource {
    features: Mutex<HashSet<String>>,
    lookups: AtomicU32,
}

impl MockContextSource {
    /// Create a mock with no context loaded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock with context loaded for the given features.
    #[must_use]
    pub fn with_features(features: &[&str]) -> Self {
        let mock = Self::new();
        for feature in features {
            mock.add(feature);
        }
        mock
    }

    /// Load context for a feature.
    pub fn add(&self, feature: &str) {
        if let Ok(mut features) = self.features.lock() {
            features.insert(feature.to_string());
        }
    }

    /// Unload context for a feature.
    pub fn remove(&self, feature: &str) {
        if let Ok(mut features) = self.features.lock() {
            features.remove(feature);
        }
    }

    /// Number of `context_exists` calls made so far.
    #[must_use]
    pub fn lookups(&self) -> u32 {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl ContextSource for MockContextSource {
    fn context_exists(&self, feature: &str) -> bool {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.features
            .lock()
            .map(|features| features.contains(feature))
            .unwrap_or(false)
    }
}

/// In-memory session store.
///
/// Reads and writes can be made to fail to exercise storage error paths.
///
/// # Example
///
/// ```rust,ignore
/// let store = MockSessionStore::new(25);
/// store.fail_reads(true);
/// assert!(store.get(&key).is_err());
/// ```
#[derive(Debug)]
pub struct MockSessionStore {
    records: Mutex<BTreeMap<SessionKey, Session>>,
    max_attempts: u32,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MockSessionStore {
    /// Create an empty store whose new records get `max_attempts`.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            max_attempts,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every read fail with a storage error.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write fail with a storage error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn records(&self, key: &str) -> Result<std::sync::MutexGuard<'_, BTreeMap<SessionKey, Session>>> {
        self.records
            .lock()
            .map_err(|_| GuardError::storage(key, "mock store poisoned"))
    }

    fn update<T>(&self, key: &SessionKey, f: impl FnOnce(&mut Session) -> T) -> Result<T> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(GuardError::storage(key.to_string(), "injected write failure"));
        }
        let mut records = self.records(&key.to_string())?;
        let session = records
            .entry(key.clone())
            .or_insert_with(|| Session::new(key, self.max_attempts));
        Ok(f(session))
    }
}

impl SessionStore for MockSessionStore {
    fn get(&self, key: &SessionKey) -> Result<Session> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(GuardError::storage(key.to_string(), "injected read failure"));
        }
        let mut records = self.records(&key.to_string())?;
        Ok(records
            .entry(key.clone())
            .or_insert_with(|| Session::new(key, self.max_attempts))
            .clone())
    }

    fn record_failure(&self, key: &SessionKey, category: FailureCategory) -> Result<Session> {
        self.update(key, |session| {
            session.record_failure(category);
            session.clone()
        })
    }

    fn mark_hint_shown(&self, key: &SessionKey, hint: &HintKey) -> Result<bool> {
        self.update(key, |session| session.mark_hint_shown(hint))
    }

    fn mark_skipped(&self, key: &SessionKey) -> Result<bool> {
        self.update(key, Session::mark_skipped)
    }

    fn acknowledge(&self, key: &SessionKey, ack: Acknowledgement) -> Result<Session> {
        self.update(key, |session| {
            session.acknowledge(ack);
            session.clone()
        })
    }

    fn clear(&self, session_id: &str) -> Result<usize> {
        let mut records = self.records(session_id)?;
        let before = records.len();
        records.retain(|key, _| key.session_id() != session_id);
        Ok(before - records.len())
    }

    fn features(&self, session_id: &str) -> Result<Vec<String>> {
        let records = self.records(session_id)?;
        Ok(records
            .keys()
            .filter(|key| key.session_id() == session_id)
            .map(|key| key.feature().to_string())
            .collect())
    }
}
