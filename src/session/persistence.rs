//! File-backed session store with atomic writes and per-key locking.
//!
//! Layout:
//!
//! ```text
//! <state_dir>/sessions/<session>/<feature>.json       record
//! <state_dir>/sessions/<session>/<feature>.json.lock  fs2 lock
//! <state_dir>/sessions/<session>/<feature>.json.tmp   write staging
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::{
    Acknowledgement, FailureCategory, Session, SessionKey, SessionStore, SESSION_RECORD_VERSION,
};
use crate::advisory::HintKey;
use crate::error::{GuardError, IntoGuardError, Result};

/// Directory under the state dir that holds one sub-directory per session.
const SESSIONS_DIR: &str = "sessions";

/// Record file extension.
const RECORD_EXT: &str = "json";

/// Temporary file suffix for atomic writes.
const TMP_SUFFIX: &str = ".tmp";

/// Lock file suffix for concurrent access prevention.
const LOCK_SUFFIX: &str = ".lock";

/// Longest readable prefix kept from an id before hashing.
const MAX_NAME_LEN: usize = 64;

/// Session store keeping one JSON record per (session, feature).
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    /// Root directory holding per-session directories.
    dir: PathBuf,
    /// Ceiling copied into newly created records.
    max_attempts: u32,
}

impl FileSessionStore {
    /// Creates a store rooted at `<state_dir>/sessions`.
    #[must_use]
    pub fn new(state_dir: impl AsRef<Path>, max_attempts: u32) -> Self {
        Self {
            dir: state_dir.as_ref().join(SESSIONS_DIR),
            max_attempts,
        }
    }

    /// Returns the directory holding all records of a session.
    #[must_use]
    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.dir.join(file_safe_name(session_id))
    }

    /// Returns the path of the record for `key`.
    #[must_use]
    pub fn record_path(&self, key: &SessionKey) -> PathBuf {
        self.session_dir(key.session_id())
            .join(format!("{}.{RECORD_EXT}", file_safe_name(key.feature())))
    }

    fn tmp_path(&self, key: &SessionKey) -> PathBuf {
        with_suffix(&self.record_path(key), TMP_SUFFIX)
    }

    /// Returns the path of the lock file guarding `key`.
    #[must_use]
    pub fn lock_path(&self, key: &SessionKey) -> PathBuf {
        with_suffix(&self.record_path(key), LOCK_SUFFIX)
    }

    /// Runs `f` while holding the exclusive lock for `key`.
    ///
    /// The lock is released when the lock file handle drops.
    fn with_lock<T>(&self, key: &SessionKey, f: impl FnOnce() -> Result<T>) -> Result<T> {
        fs::create_dir_all(self.session_dir(key.session_id()))
            .into_guard_storage(&key.to_string())?;

        let lock_path = self.lock_path(key);
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        FileExt::lock_exclusive(&lock_file).map_err(|e| GuardError::Lock {
            path: lock_path.clone(),
            message: e.to_string(),
        })?;

        f()
    }

    /// Read-modify-write of one record under its lock.
    fn update<T>(&self, key: &SessionKey, f: impl FnOnce(&mut Session) -> T) -> Result<T> {
        self.with_lock(key, || {
            let mut session = self
                .load(key)?
                .unwrap_or_else(|| Session::new(key, self.max_attempts));
            let out = f(&mut session);
            self.save(key, &session)?;
            Ok(out)
        })
    }

    /// Writes a record atomically. Callers must hold the key lock.
    fn save(&self, key: &SessionKey, session: &Session) -> Result<()> {
        let tmp_path = self.tmp_path(key);
        let json = serde_json::to_string_pretty(session)?;

        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(json.as_bytes())?;
        tmp_file.sync_all()?;

        fs::rename(&tmp_path, self.record_path(key)).into_guard_storage(&key.to_string())?;
        debug!(key = %key, attempts = session.attempt_count(), "session record saved");
        Ok(())
    }

    /// Loads a record. Callers must hold the key lock.
    ///
    /// Corrupted or incompatible records are left in place and reported as a
    /// storage error, so a damaged record never resets the attempt budget.
    /// `clear` removes them.
    fn load(&self, key: &SessionKey) -> Result<Option<Session>> {
        let path = self.record_path(key);

        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        parse_record(key, &path, &contents).map(Some)
    }

    /// Reads a record without creating it. Intended for reporting readers.
    pub fn peek(&self, key: &SessionKey) -> Result<Option<Session>> {
        let path = self.record_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        parse_record(key, &path, &contents).map(Some)
    }
}

/// Parses and version-checks a record.
fn parse_record(key: &SessionKey, path: &Path, contents: &str) -> Result<Session> {
    let session: Session = serde_json::from_str(contents).map_err(|e| {
        warn!("Corrupted session record at {}: {}", path.display(), e);
        GuardError::storage(
            key.to_string(),
            format!("corrupted record at {}: {e}", path.display()),
        )
    })?;

    if !session.is_version_compatible() {
        warn!(
            "Incompatible session record version {} at {} (supported: {})",
            session.metadata.version,
            path.display(),
            SESSION_RECORD_VERSION
        );
        return Err(GuardError::storage(
            key.to_string(),
            format!(
                "record version {} is not supported (supported: {})",
                session.metadata.version, SESSION_RECORD_VERSION
            ),
        ));
    }

    Ok(session)
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &SessionKey) -> Result<Session> {
        self.with_lock(key, || match self.load(key)? {
            Some(session) => Ok(session),
            None => {
                let session = Session::new(key, self.max_attempts);
                self.save(key, &session)?;
                debug!(key = %key, max_attempts = self.max_attempts, "session record created");
                Ok(session)
            }
        })
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
        let dir = self.session_dir(session_id);
        if !dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(&dir)? {
            if entry?.path().extension().and_then(|e| e.to_str()) == Some(RECORD_EXT) {
                removed += 1;
            }
        }
        fs::remove_dir_all(&dir)?;
        debug!(session = session_id, removed, "session cleared");
        Ok(removed)
    }

    fn features(&self, session_id: &str) -> Result<Vec<String>> {
        let dir = self.session_dir(session_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut features = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            let contents = fs::read_to_string(&path)?;
            match serde_json::from_str::<Session>(&contents) {
                Ok(session) => features.push(session.metadata.feature),
                Err(e) => warn!("Skipping unreadable record {}: {}", path.display(), e),
            }
        }
        features.sort();
        Ok(features)
    }
}

/// Maps an arbitrary id to a file name.
///
/// Ids that are already safe are used verbatim. Anything else is sanitised and
/// suffixed with a short SHA-256 of the original so distinct ids stay distinct.
fn file_safe_name(id: &str) -> String {
    let safe: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();

    if safe == id {
        return safe;
    }

    let digest = hex::encode(Sha256::digest(id.as_bytes()));
    format!("{safe}-{}", &digest[..12])
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}
