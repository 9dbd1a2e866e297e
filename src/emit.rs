//! Decision rendering and exit signals.
//!
//! Rendering is a pure function of decision data: nothing here looks at
//! session state or configuration. Output goes to a diagnostic channel
//! (stderr in the CLI) and never to the guarded action's own output.
//!
//! | Decision | Exit code | Diagnostic output |
//! |---|---|---|
//! | ALLOW | 0 | none |
//! | WARN | 0 | one advisory per finding |
//! | BLOCK | [`BLOCK_EXIT_CODE`] | advisories, then the blocking gate and its remediation |

use std::io::{self, Write};

use clap::ValueEnum;
use colored::Colorize;
use serde_json::json;

use crate::gate::{Finding, FindingDetail, GateDecision, GateKind, ViolationClass};

/// Exit code signalling that the guarded action must not proceed.
pub const BLOCK_EXIT_CODE: i32 = 2;

/// Diagnostic output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Exit code for a decision.
#[must_use]
pub fn exit_code(decision: &GateDecision) -> i32 {
    if decision.is_blocked() {
        BLOCK_EXIT_CODE
    } else {
        0
    }
}

/// One-line statement of what a finding found.
#[must_use]
pub fn describe(finding: &Finding) -> String {
    let feature = &finding.feature;
    match &finding.detail {
        FindingDetail::ContextMissing => {
            format!("No context is loaded for feature '{feature}'.")
        }
        FindingDetail::StorageUnavailable { reason } => {
            format!("Session state for feature '{feature}' is unavailable: {reason}.")
        }
        FindingDetail::RepeatedCategory {
            category,
            occurrences,
            threshold,
        } => format!(
            "'{category}' failures recorded {occurrences} times for feature '{feature}' (limit {threshold})."
        ),
        FindingDetail::AttemptThreshold {
            attempts,
            threshold,
        } => format!(
            "{attempts} fix attempts recorded for feature '{feature}' (deep analysis required from {threshold})."
        ),
        FindingDetail::AttemptCeiling {
            attempts,
            max_attempts,
        } => format!(
            "{attempts} fix attempts recorded for feature '{feature}'; the session ceiling is {max_attempts}."
        ),
    }
}

/// Concrete next step for a finding.
#[must_use]
pub fn remediation(finding: &Finding) -> String {
    let feature = &finding.feature;
    match (&finding.detail, finding.gate) {
        (FindingDetail::ContextMissing, GateKind::ContextMandatory) => format!(
            "Load context for feature '{feature}' before writing new tests for it."
        ),
        (FindingDetail::ContextMissing, _) => format!(
            "Load context for feature '{feature}' so failures can be diagnosed against it."
        ),
        (FindingDetail::StorageUnavailable { .. }, _)
            if finding.class == ViolationClass::MandatoryPrerequisiteMissing =>
        {
            "New tests stay blocked until the session store is reachable again.".to_string()
        }
        (FindingDetail::StorageUnavailable { .. }, _) => {
            "Attempt limits are not enforced for this run.".to_string()
        }
        (FindingDetail::RepeatedCategory { category, .. }, _) => format!(
            "Broaden the investigation: research '{category}' outside the current approach \
             (docs, issue trackers, upstream changes), then retry with --external-research-done \
             or run `fixguard ack external-research`."
        ),
        (FindingDetail::AttemptThreshold { .. }, _) => format!(
            "Stop iterating on '{feature}' and analyse every failed attempt so far, then retry \
             with --deep-analysis-ack or run `fixguard ack deep-analysis`."
        ),
        (FindingDetail::AttemptCeiling { .. }, _) => format!(
            "Mark the test for '{feature}' as known-failing (skip/fixme) and retry with \
             --mark-skipped."
        ),
    }
}

/// Plain-text diagnostic lines for a decision. ALLOW renders nothing.
#[must_use]
pub fn render_text(decision: &GateDecision) -> Vec<String> {
    let mut lines: Vec<String> = decision
        .advisories()
        .iter()
        .map(|finding| {
            format!(
                "Advisory [{}]: {} {}",
                finding.gate,
                describe(finding),
                remediation(finding)
            )
        })
        .collect();

    if let Some(finding) = decision.blocking() {
        lines.push(format!(
            "Blocked [{}] {}: {}",
            finding.gate,
            finding.class,
            describe(finding)
        ));
        lines.push(format!("  Remediation: {}", remediation(finding)));
    }

    lines
}

/// JSON rendering of a decision.
#[must_use]
pub fn render_json(decision: &GateDecision) -> serde_json::Value {
    let finding_json = |finding: &Finding| {
        json!({
            "gate": finding.gate,
            "class": finding.class,
            "feature": finding.feature,
            "detail": finding.detail,
            "message": describe(finding),
            "remediation": remediation(finding),
        })
    };

    json!({
        "decision": decision.label(),
        "exitCode": exit_code(decision),
        "advisories": decision.advisories().iter().map(finding_json).collect::<Vec<_>>(),
        "blocked": decision.blocking().map(finding_json),
    })
}

/// Writes decisions to a diagnostic channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionEmitter {
    format: OutputFormat,
}

impl DecisionEmitter {
    #[must_use]
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Render `decision` to `out` and return the exit code to use.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `out` fails.
    pub fn emit(&self, decision: &GateDecision, out: &mut impl Write) -> io::Result<i32> {
        match self.format {
            OutputFormat::Json => {
                writeln!(out, "{}", render_json(decision))?;
            }
            OutputFormat::Text => {
                for line in render_text(decision) {
                    let line = if line.starts_with("Blocked") {
                        line.red().bold().to_string()
                    } else if line.starts_with("Advisory") {
                        line.yellow().to_string()
                    } else {
                        line
                    };
                    writeln!(out, "{line}")?;
                }
            }
        }
        Ok(exit_code(decision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FailureCategory;

    fn context_missing(gate: GateKind, class: ViolationClass) -> Finding {
        Finding::new(gate, class, "login", FindingDetail::ContextMissing)
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&GateDecision::Allow), 0);
        assert_eq!(
            exit_code(&GateDecision::Warn(vec![context_missing(
                GateKind::ContextAdvisory,
                ViolationClass::AdvisoryCondition
            )])),
            0
        );
        assert_eq!(
            exit_code(&GateDecision::Block {
                finding: context_missing(
                    GateKind::ContextMandatory,
                    ViolationClass::MandatoryPrerequisiteMissing
                ),
                advisories: vec![],
            }),
            BLOCK_EXIT_CODE
        );
    }

    #[test]
    fn test_allow_renders_nothing() {
        assert!(render_text(&GateDecision::Allow).is_empty());
    }

    #[test]
    fn test_warn_renders_one_line_per_advisory() {
        let decision = GateDecision::Warn(vec![context_missing(
            GateKind::ContextAdvisory,
            ViolationClass::AdvisoryCondition,
        )]);
        let lines = render_text(&decision);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("Advisory [Context Advisory]"));
        assert!(lines[0].contains("Load context for feature 'login'"));
    }

    #[test]
    fn test_block_names_gate_class_and_remediation() {
        let decision = GateDecision::Block {
            finding: Finding::new(
                GateKind::ExternalResearch,
                ViolationClass::RepeatedFailurePattern,
                "login",
                FindingDetail::RepeatedCategory {
                    category: FailureCategory::new("selector-timeout").unwrap(),
                    occurrences: 3,
                    threshold: 2,
                },
            ),
            advisories: vec![],
        };
        let lines = render_text(&decision);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[External Research]"));
        assert!(lines[0].contains("RepeatedFailurePattern"));
        assert!(lines[0].contains("'selector-timeout' failures recorded 3 times"));
        assert!(lines[1].contains("Broaden the investigation"));
    }

    #[test]
    fn test_ceiling_remediation_mentions_known_failing() {
        let finding = Finding::new(
            GateKind::MaxAttempts,
            ViolationClass::AttemptBudgetExhausted,
            "login",
            FindingDetail::AttemptCeiling {
                attempts: 25,
                max_attempts: 25,
            },
        );
        assert!(remediation(&finding).contains("known-failing"));
        assert!(describe(&finding).contains("ceiling is 25"));
    }

    #[test]
    fn test_storage_remediation_depends_on_severity() {
        let detail = FindingDetail::StorageUnavailable {
            reason: "disk full".to_string(),
        };
        let closed = Finding::new(
            GateKind::SessionState,
            ViolationClass::MandatoryPrerequisiteMissing,
            "login",
            detail.clone(),
        );
        let open = Finding::new(
            GateKind::SessionState,
            ViolationClass::AdvisoryCondition,
            "login",
            detail,
        );
        assert!(remediation(&closed).contains("blocked"));
        assert!(remediation(&open).contains("not enforced"));
    }

    #[test]
    fn test_json_rendering() {
        let decision = GateDecision::Block {
            finding: context_missing(
                GateKind::ContextMandatory,
                ViolationClass::MandatoryPrerequisiteMissing,
            ),
            advisories: vec![],
        };
        let value = render_json(&decision);
        assert_eq!(value["decision"], "block");
        assert_eq!(value["exitCode"], 2);
        assert_eq!(value["blocked"]["gate"], "context-mandatory");
        assert_eq!(value["blocked"]["class"], "MandatoryPrerequisiteMissing");
        assert_eq!(value["blocked"]["detail"]["kind"], "context-missing");
        assert!(value["advisories"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_emitter_writes_and_returns_exit_code() {
        colored::control::set_override(false);
        let emitter = DecisionEmitter::new(OutputFormat::Text);
        let mut out = Vec::new();

        let code = emitter.emit(&GateDecision::Allow, &mut out).unwrap();
        assert_eq!(code, 0);
        assert!(out.is_empty());

        let decision = GateDecision::Block {
            finding: context_missing(
                GateKind::ContextMandatory,
                ViolationClass::MandatoryPrerequisiteMissing,
            ),
            advisories: vec![],
        };
        let code = emitter.emit(&decision, &mut out).unwrap();
        assert_eq!(code, BLOCK_EXIT_CODE);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Blocked [Context Mandatory]"));
    }
}
