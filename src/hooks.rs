//! PreToolUse hook payload classification.
//!
//! Hosts call `fixguard hook` before every tool use with a JSON payload on
//! stdin. Payloads that run tests or create new test files become gate
//! requests; everything else passes through untouched.

use std::path::Path;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use fixguard::config::GuardConfig;
use fixguard::gate::{ActionKind, ActionRequest};

/// Tool names that create files.
const WRITE_TOOLS: &[&str] = &["Write"];

/// Flags whose value names the tests to run.
const GREP_FLAGS: &[&str] = &["--grep", "-g"];

/// Hook payload as sent by the host.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookPayload {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: ToolInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolInput {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
}

impl HookPayload {
    pub fn parse(input: &str) -> Result<Self> {
        serde_json::from_str(input).context("hook payload is not valid JSON")
    }
}

/// Turns hook payloads into gate requests.
#[derive(Debug)]
pub struct HookClassifier {
    test_commands: Vec<Regex>,
    test_files: GlobSet,
    default_feature: Option<String>,
}

impl HookClassifier {
    pub fn from_config(config: &GuardConfig) -> Result<Self> {
        let test_commands = config
            .hook
            .test_commands
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("invalid test command pattern: {p}")))
            .collect::<Result<Vec<_>>>()?;

        let mut builder = GlobSetBuilder::new();
        for pattern in &config.hook.test_file_globs {
            builder.add(
                Glob::new(pattern).with_context(|| format!("invalid test file glob: {pattern}"))?,
            );
        }

        Ok(Self {
            test_commands,
            test_files: builder.build()?,
            default_feature: config.default_feature.clone(),
        })
    }

    /// Classify a payload. `None` means the payload is not a guarded action.
    ///
    /// `fallback_session` is used when the payload carries no session id.
    pub fn classify(
        &self,
        payload: &HookPayload,
        project: &Path,
        fallback_session: Option<&str>,
    ) -> Option<ActionRequest> {
        let (action, feature) = self.classify_action(payload, project)?;

        let session_id = payload
            .session_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(fallback_session)?;

        match ActionRequest::new(action, session_id, feature) {
            Ok(request) => Some(request),
            Err(e) => {
                debug!("hook payload ignored: {e}");
                None
            }
        }
    }

    fn classify_action(&self, payload: &HookPayload, project: &Path) -> Option<(ActionKind, String)> {
        let tool = payload.tool_name.as_deref().unwrap_or_default();

        if WRITE_TOOLS.contains(&tool) {
            let file_path = payload.tool_input.file_path.as_deref()?;
            return self
                .new_test_file(file_path, project)
                .map(|feature| (ActionKind::WriteNewTest, feature));
        }

        let command = payload.tool_input.command.as_deref()?;
        if !self.is_test_command(command) {
            return None;
        }
        self.feature_from_command(command)
            .or_else(|| self.default_feature.clone())
            .map(|feature| (ActionKind::RunTest, feature))
    }

    pub fn is_test_command(&self, command: &str) -> bool {
        self.test_commands.iter().any(|re| re.is_match(command))
    }

    pub fn is_test_file(&self, path: &str) -> bool {
        self.test_files.is_match(path)
    }

    /// Feature name for a test file that does not exist yet.
    fn new_test_file(&self, file_path: &str, project: &Path) -> Option<String> {
        if !self.is_test_file(file_path) {
            return None;
        }
        let path = Path::new(file_path);
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            project.join(path)
        };
        if resolved.exists() {
            debug!(path = %resolved.display(), "test file exists, not a new test");
            return None;
        }
        feature_from_test_file(file_path)
    }

    fn feature_from_command(&self, command: &str) -> Option<String> {
        let tokens: Vec<&str> = command.split_whitespace().collect();

        for (i, token) in tokens.iter().enumerate() {
            let token = token.trim_matches(|c| c == '"' || c == '\'');

            if let Some((flag, value)) = token.split_once('=') {
                if GREP_FLAGS.contains(&flag) && !value.is_empty() {
                    return Some(value.trim_matches(|c| c == '"' || c == '\'').to_string());
                }
            }
            if GREP_FLAGS.contains(&token) {
                if let Some(value) = tokens.get(i + 1) {
                    return Some(value.trim_matches(|c| c == '"' || c == '\'').to_string());
                }
            }
            if self.is_test_file(token) {
                return feature_from_test_file(token);
            }
        }
        None
    }
}

/// `tests/login.spec.ts` -> `login`, `test_login.py` -> `login`.
pub fn feature_from_test_file(path: &str) -> Option<String> {
    let name = Path::new(path).file_name()?.to_str()?;
    let name = name.strip_prefix("test_").unwrap_or(name);
    let stem = name.split('.').next().unwrap_or_default();
    let stem = stem.strip_suffix("_test").unwrap_or(stem);

    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn classifier() -> HookClassifier {
        HookClassifier::from_config(&GuardConfig::default()).unwrap()
    }

    fn bash(command: &str) -> HookPayload {
        HookPayload {
            session_id: Some("s-1".to_string()),
            tool_name: Some("Bash".to_string()),
            tool_input: ToolInput {
                command: Some(command.to_string()),
                file_path: None,
            },
        }
    }

    fn write(file_path: &str) -> HookPayload {
        HookPayload {
            session_id: Some("s-1".to_string()),
            tool_name: Some("Write".to_string()),
            tool_input: ToolInput {
                command: None,
                file_path: Some(file_path.to_string()),
            },
        }
    }

    #[test]
    fn test_parse_payload() {
        let payload = HookPayload::parse(
            r#"{"session_id":"abc","tool_name":"Bash","tool_input":{"command":"npx playwright test"}}"#,
        )
        .unwrap();
        assert_eq!(payload.session_id.as_deref(), Some("abc"));
        assert_eq!(
            payload.tool_input.command.as_deref(),
            Some("npx playwright test")
        );
        assert!(HookPayload::parse("not json").is_err());
    }

    #[test]
    fn test_feature_from_test_file() {
        assert_eq!(
            feature_from_test_file("tests/login.spec.ts").as_deref(),
            Some("login")
        );
        assert_eq!(
            feature_from_test_file("checkout.test.js").as_deref(),
            Some("checkout")
        );
        assert_eq!(
            feature_from_test_file("tests/test_login.py").as_deref(),
            Some("login")
        );
        assert_eq!(feature_from_test_file(".spec.ts"), None);
    }

    #[test]
    fn test_run_test_feature_from_file_argument() {
        let temp = TempDir::new().unwrap();
        let request = classifier()
            .classify(
                &bash("npx playwright test tests/login.spec.ts --headed"),
                temp.path(),
                None,
            )
            .unwrap();
        assert_eq!(request.action, ActionKind::RunTest);
        assert_eq!(request.feature(), "login");
        assert_eq!(request.key.session_id(), "s-1");
    }

    #[test]
    fn test_run_test_feature_from_grep() {
        let temp = TempDir::new().unwrap();
        let classifier = classifier();

        let request = classifier
            .classify(&bash("npx playwright test --grep checkout"), temp.path(), None)
            .unwrap();
        assert_eq!(request.feature(), "checkout");

        let request = classifier
            .classify(&bash("npx playwright test -g=search"), temp.path(), None)
            .unwrap();
        assert_eq!(request.feature(), "search");
    }

    #[test]
    fn test_run_test_without_feature_uses_default() {
        let temp = TempDir::new().unwrap();
        assert!(classifier()
            .classify(&bash("npm test"), temp.path(), None)
            .is_none());

        let config = GuardConfig {
            default_feature: Some("app".to_string()),
            ..Default::default()
        };
        let classifier = HookClassifier::from_config(&config).unwrap();
        let request = classifier
            .classify(&bash("npm test"), temp.path(), None)
            .unwrap();
        assert_eq!(request.feature(), "app");
    }

    #[test]
    fn test_non_test_commands_pass_through() {
        let temp = TempDir::new().unwrap();
        let classifier = classifier();
        assert!(classifier
            .classify(&bash("git status"), temp.path(), None)
            .is_none());
        assert!(classifier
            .classify(&bash("ls tests/login.spec.ts"), temp.path(), None)
            .is_none());
    }

    #[test]
    fn test_write_of_new_test_file() {
        let temp = TempDir::new().unwrap();
        let request = classifier()
            .classify(&write("tests/login.spec.ts"), temp.path(), None)
            .unwrap();
        assert_eq!(request.action, ActionKind::WriteNewTest);
        assert_eq!(request.feature(), "login");
    }

    #[test]
    fn test_write_of_existing_test_file_passes_through() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("tests")).unwrap();
        std::fs::write(temp.path().join("tests/login.spec.ts"), "").unwrap();

        assert!(classifier()
            .classify(&write("tests/login.spec.ts"), temp.path(), None)
            .is_none());
    }

    #[test]
    fn test_write_of_non_test_file_passes_through() {
        let temp = TempDir::new().unwrap();
        assert!(classifier()
            .classify(&write("src/login.ts"), temp.path(), None)
            .is_none());
    }

    #[test]
    fn test_session_id_fallback() {
        let temp = TempDir::new().unwrap();
        let mut payload = bash("pytest tests/test_login.py");
        payload.session_id = None;

        let classifier = classifier();
        assert!(classifier.classify(&payload, temp.path(), None).is_none());

        let request = classifier
            .classify(&payload, temp.path(), Some("fallback"))
            .unwrap();
        assert_eq!(request.key.session_id(), "fallback");
        assert_eq!(request.feature(), "login");
    }
}
