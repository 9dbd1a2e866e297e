//! Context availability checks.
//!
//! Gates ask whether reference material for a feature has been loaded before
//! letting new tests be written for it. The answer is never cached: a user can
//! add context between two invocations and the next call must see it.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

/// File extensions accepted as context documents.
const CONTEXT_EXTENSIONS: &[&str] = &["md", "txt"];

/// How deep the recursive fallback search descends.
const MAX_SEARCH_DEPTH: usize = 4;

/// Source of truth for "is context loaded for this feature?".
pub trait ContextSource {
    /// Returns true if reference material for `feature` is available.
    fn context_exists(&self, feature: &str) -> bool;
}

/// Context stored as documents under a directory.
///
/// Context for feature `F` exists when the directory contains `F.md`, `F.txt`,
/// a non-empty `F/` directory, or, anywhere below it, a file whose stem is `F`.
#[derive(Debug, Clone)]
pub struct DirectoryContextSource {
    dir: PathBuf,
}

impl DirectoryContextSource {
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn direct_match(&self, feature: &str) -> bool {
        let named_file = CONTEXT_EXTENSIONS
            .iter()
            .any(|ext| self.dir.join(format!("{feature}.{ext}")).is_file());
        if named_file {
            return true;
        }

        let feature_dir = self.dir.join(feature);
        feature_dir.is_dir()
            && std::fs::read_dir(&feature_dir)
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false)
    }

    fn nested_match(&self, feature: &str) -> bool {
        WalkDir::new(&self.dir)
            .max_depth(MAX_SEARCH_DEPTH)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .any(|e| {
                let path = e.path();
                let ext_ok = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| CONTEXT_EXTENSIONS.contains(&ext))
                    .unwrap_or(false);
                ext_ok && path.file_stem().and_then(|s| s.to_str()) == Some(feature)
            })
    }
}

impl ContextSource for DirectoryContextSource {
    fn context_exists(&self, feature: &str) -> bool {
        // Path-like names would resolve to the context dir or its parent.
        if feature.is_empty() || feature.contains(['/', '\\']) || matches!(feature, "." | "..") {
            return false;
        }

        if !self.dir.is_dir() {
            debug!(dir = %self.dir.display(), "context directory missing");
            return false;
        }

        let found = self.direct_match(feature) || self.nested_match(feature);
        debug!(feature, found, "context lookup");
        found
    }
}

impl<T: ContextSource + ?Sized> ContextSource for &T {
    fn context_exists(&self, feature: &str) -> bool {
        (**self).context_exists(feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn source() -> (DirectoryContextSource, TempDir) {
        let temp = TempDir::new().unwrap();
        let source = DirectoryContextSource::new(temp.path().join("context"));
        (source, temp)
    }

    #[test]
    fn test_missing_directory_means_no_context() {
        let (source, _temp) = source();
        assert!(!source.context_exists("login"));
    }

    #[test]
    fn test_markdown_file_counts() {
        let (source, _temp) = source();
        fs::create_dir_all(source.dir()).unwrap();
        fs::write(source.dir().join("login.md"), "# Login flow").unwrap();

        assert!(source.context_exists("login"));
        assert!(!source.context_exists("checkout"));
    }

    #[test]
    fn test_feature_directory_must_be_non_empty() {
        let (source, _temp) = source();
        let feature_dir = source.dir().join("checkout");
        fs::create_dir_all(&feature_dir).unwrap();
        assert!(!source.context_exists("checkout"));

        fs::write(feature_dir.join("notes.txt"), "cart rules").unwrap();
        assert!(source.context_exists("checkout"));
    }

    #[test]
    fn test_nested_file_counts() {
        let (source, _temp) = source();
        let nested = source.dir().join("auth").join("flows");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("login.md"), "steps").unwrap();

        assert!(source.context_exists("login"));
    }

    #[test]
    fn test_reflects_changes_between_calls() {
        let (source, _temp) = source();
        fs::create_dir_all(source.dir()).unwrap();
        assert!(!source.context_exists("login"));

        fs::write(source.dir().join("login.txt"), "loaded").unwrap();
        assert!(source.context_exists("login"));

        fs::remove_file(source.dir().join("login.txt")).unwrap();
        assert!(!source.context_exists("login"));
    }

    #[test]
    fn test_path_like_features_never_match() {
        let (source, temp) = source();
        fs::create_dir_all(source.dir()).unwrap();
        fs::write(temp.path().join("secret.md"), "outside").unwrap();

        assert!(!source.context_exists("../secret"));
        assert!(!source.context_exists(""));
    }

    #[test]
    fn test_dot_features_never_match() {
        let (source, _temp) = source();
        fs::create_dir_all(source.dir()).unwrap();
        fs::write(source.dir().join("login.md"), "# Login flow").unwrap();

        // The context dir itself is non-empty, so "." would otherwise match.
        assert!(!source.context_exists("."));
        assert!(!source.context_exists(".."));
    }
}
