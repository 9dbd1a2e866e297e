//! Configuration management for fixguard.
//!
//! Configuration lives in `<project>/.fixguard/config.toml`. Every key is
//! optional; a missing file yields [`GuardConfig::default`].
//!
//! # Example config.toml
//!
//! ```toml
//! maxAttempts = 25
//! deepAnalysisThreshold = 12
//! repeatedCategoryThreshold = 2
//! contextDir = "docs/context"
//!
//! [hook]
//! testCommands = ['\bplaywright\s+test\b']
//! testFileGlobs = ["**/*.spec.ts"]
//! ```

use crate::error::{GuardError, Result};
use globset::Glob;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the per-project state and config directory.
pub const GUARD_DIR: &str = ".fixguard";

/// Config file name inside [`GUARD_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

/// Default attempt ceiling for a (session, feature) pair.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 25;

/// Default attempt count at which deep analysis is required.
pub const DEFAULT_DEEP_ANALYSIS_THRESHOLD: u32 = 12;

/// Default number of same-category failures that triggers the research gate.
pub const DEFAULT_REPEATED_CATEGORY_THRESHOLD: u32 = 2;

/// Test runner invocations recognised by the hook when no override is configured.
pub const DEFAULT_TEST_COMMANDS: &[&str] = &[
    r"\bplaywright\s+test\b",
    r"\bnpx\s+playwright\b",
    r"\b(npm|pnpm|yarn)\s+(run\s+)?test\b",
    r"\bjest\b",
    r"\bvitest\b",
    r"\bpytest\b",
    r"\bcargo\s+test\b",
];

/// File globs that identify test files when no override is configured.
pub const DEFAULT_TEST_FILE_GLOBS: &[&str] = &["**/*.spec.*", "**/*.test.*", "**/test_*.py"];

/// Engine configuration loaded from `.fixguard/config.toml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GuardConfig {
    /// Attempt ceiling copied into every new session.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Attempt count at which the deep-analysis gate engages.
    #[serde(default = "default_deep_analysis_threshold")]
    pub deep_analysis_threshold: u32,

    /// Occurrences of the latest failure category that trigger the research gate.
    #[serde(default = "default_repeated_category_threshold")]
    pub repeated_category_threshold: u32,

    /// Where session records are kept (default: `<project>/.fixguard`).
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Where feature context documents live (default: `<project>/.claude/context`).
    #[serde(default)]
    pub context_dir: Option<PathBuf>,

    /// Feature used by the hook when a test command names no test file.
    #[serde(default)]
    pub default_feature: Option<String>,

    #[serde(default)]
    pub hook: HookConfig,
}

/// Classification rules for `fixguard hook`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HookConfig {
    /// Regexes matched against Bash commands to detect test runs.
    #[serde(default = "default_test_commands")]
    pub test_commands: Vec<String>,

    /// Globs matched against written file paths to detect new test files.
    #[serde(default = "default_test_file_globs")]
    pub test_file_globs: Vec<String>,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_deep_analysis_threshold() -> u32 {
    DEFAULT_DEEP_ANALYSIS_THRESHOLD
}

fn default_repeated_category_threshold() -> u32 {
    DEFAULT_REPEATED_CATEGORY_THRESHOLD
}

fn default_test_commands() -> Vec<String> {
    DEFAULT_TEST_COMMANDS.iter().map(|s| s.to_string()).collect()
}

fn default_test_file_globs() -> Vec<String> {
    DEFAULT_TEST_FILE_GLOBS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            test_commands: default_test_commands(),
            test_file_globs: default_test_file_globs(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            deep_analysis_threshold: default_deep_analysis_threshold(),
            repeated_category_threshold: default_repeated_category_threshold(),
            state_dir: None,
            context_dir: None,
            default_feature: None,
            hook: HookConfig::default(),
        }
    }
}

impl GuardConfig {
    /// Load configuration from a project directory.
    ///
    /// A missing config file is not an error. The loaded config is validated.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = Self::config_path(project_dir);

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| GuardError::config_with_path(e.to_string(), path.clone()))?;
        let config: GuardConfig = toml::from_str(&content)
            .map_err(|e| GuardError::config_with_path(e.to_string(), path.clone()))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the config file path for a project
    pub fn config_path(project_dir: &Path) -> PathBuf {
        project_dir.join(GUARD_DIR).join(CONFIG_FILE)
    }

    /// Resolve the state directory, relative paths anchored at the project.
    pub fn state_dir(&self, project_dir: &Path) -> PathBuf {
        match &self.state_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => project_dir.join(dir),
            None => project_dir.join(GUARD_DIR),
        }
    }

    /// Resolve the context directory, relative paths anchored at the project.
    pub fn context_dir(&self, project_dir: &Path) -> PathBuf {
        match &self.context_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => project_dir.join(dir),
            None => project_dir.join(".claude/context"),
        }
    }

    /// Validates thresholds and hook patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Any threshold is zero
    /// - The deep-analysis threshold is not below the attempt ceiling
    /// - A test command regex or test file glob does not compile
    pub fn validate(&self) -> Result<()> {
        let thresholds = [
            ("maxAttempts", self.max_attempts),
            ("deepAnalysisThreshold", self.deep_analysis_threshold),
            ("repeatedCategoryThreshold", self.repeated_category_threshold),
        ];
        for (name, value) in thresholds {
            if value == 0 {
                return Err(GuardError::invalid_config(
                    name,
                    "must be greater than zero",
                ));
            }
        }

        if self.deep_analysis_threshold >= self.max_attempts {
            return Err(GuardError::invalid_config(
                "deepAnalysisThreshold",
                format!(
                    "{} must be below maxAttempts ({})",
                    self.deep_analysis_threshold, self.max_attempts
                ),
            ));
        }

        if let Some(feature) = &self.default_feature {
            if feature.trim().is_empty() {
                return Err(GuardError::invalid_config(
                    "defaultFeature",
                    "must not be empty",
                ));
            }
        }

        for pattern in &self.hook.test_commands {
            Regex::new(pattern).map_err(|e| {
                GuardError::invalid_config("hook.testCommands", format!("{pattern}: {e}"))
            })?;
        }

        for pattern in &self.hook.test_file_globs {
            Glob::new(pattern).map_err(|e| {
                GuardError::invalid_config("hook.testFileGlobs", format!("{pattern}: {e}"))
            })?;
        }

        Ok(())
    }
}
