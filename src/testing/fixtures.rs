//! Temporary project fixtures.
//!
//! Only available in test builds.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::config::{GuardConfig, GUARD_DIR};
use crate::context::DirectoryContextSource;
use crate::gate::GateEvaluator;
use crate::session::FileSessionStore;

/// A throwaway project directory with default config paths.
pub struct GuardFixture {
    pub temp_dir: TempDir,
    pub config: GuardConfig,
}

impl Default for GuardFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardFixture {
    /// Create an empty project with the default configuration.
    pub fn new() -> Self {
        Self::with_config(GuardConfig::default())
    }

    /// Create an empty project and write `config` to its config file.
    pub fn with_config(config: GuardConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let fixture = Self { temp_dir, config };
        fs::create_dir_all(fixture.path().join(GUARD_DIR)).expect("create guard dir");
        fs::write(
            GuardConfig::config_path(fixture.path()),
            toml::to_string(&fixture.config).expect("serialize config"),
        )
        .expect("write config");
        fixture
    }

    /// Project root.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn state_dir(&self) -> PathBuf {
        self.config.state_dir(self.path())
    }

    pub fn context_dir(&self) -> PathBuf {
        self.config.context_dir(self.path())
    }

    /// Load context for a feature by writing `<feature>.md`.
    pub fn add_context(&self, feature: &str) {
        let dir = self.context_dir();
        fs::create_dir_all(&dir).expect("create context dir");
        fs::write(dir.join(format!("{feature}.md")), format!("# {feature}\n"))
            .expect("write context");
    }

    /// Evaluator backed by the fixture's file store and context directory.
    pub fn evaluator(&self) -> GateEvaluator<FileSessionStore, DirectoryContextSource> {
        GateEvaluator::standard(
            FileSessionStore::new(self.state_dir(), self.config.max_attempts),
            DirectoryContextSource::new(self.context_dir()),
            &self.config,
        )
    }
}
