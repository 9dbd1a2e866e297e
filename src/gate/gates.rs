//! The individual gates and the standard ordered pipeline.

use super::{ActionKind, ActionRequest, Finding, FindingDetail, GateKind, ViolationClass};
use crate::advisory::{HintKey, HintType};
use crate::config::GuardConfig;
use crate::session::{Acknowledgement, Session};

/// Everything a gate may look at. Gates have no side effects.
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    pub request: &'a ActionRequest,
    pub session: &'a Session,
    /// Result of the context availability check for this invocation.
    pub context_loaded: bool,
}

impl GateContext<'_> {
    fn feature(&self) -> &str {
        self.request.feature()
    }
}

/// Result of a single gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Pass,
    Warn(Finding),
    Block(Finding),
}

/// A single policy check.
pub trait Gate: Send + Sync {
    /// Identifies the gate in findings and logs.
    fn kind(&self) -> GateKind;

    /// Whether the gate runs for this action kind.
    fn applies_to(&self, action: ActionKind) -> bool;

    /// Evaluate the gate.
    fn check(&self, ctx: &GateContext<'_>) -> GateOutcome;
}

/// Standard pipeline, least severe first.
#[must_use]
pub fn standard_gates(config: &GuardConfig) -> Vec<Box<dyn Gate>> {
    vec![
        Box::new(ContextAdvisoryGate),
        Box::new(ContextMandatoryGate),
        Box::new(ExternalResearchGate::new(config.repeated_category_threshold)),
        Box::new(DeepAnalysisGate::new(config.deep_analysis_threshold)),
        Box::new(MaxAttemptsGate),
    ]
}

// ============================================================================
// Context gates
// ============================================================================

/// Warns once per session when a test run happens without feature context.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextAdvisoryGate;

impl Gate for ContextAdvisoryGate {
    fn kind(&self) -> GateKind {
        GateKind::ContextAdvisory
    }

    fn applies_to(&self, action: ActionKind) -> bool {
        action == ActionKind::RunTest
    }

    fn check(&self, ctx: &GateContext<'_>) -> GateOutcome {
        if ctx.context_loaded {
            return GateOutcome::Pass;
        }

        let hint = HintKey::new(HintType::ContextReminder, ctx.feature());
        if ctx.session.has_shown(&hint) {
            return GateOutcome::Pass;
        }

        GateOutcome::Warn(
            Finding::new(
                self.kind(),
                ViolationClass::AdvisoryCondition,
                ctx.feature(),
                FindingDetail::ContextMissing,
            )
            .with_hint(hint),
        )
    }
}

/// Blocks every new-test write while feature context is missing.
///
/// There is no dedup and no override for this gate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextMandatoryGate;

impl Gate for ContextMandatoryGate {
    fn kind(&self) -> GateKind {
        GateKind::ContextMandatory
    }

    fn applies_to(&self, action: ActionKind) -> bool {
        action == ActionKind::WriteNewTest
    }

    fn check(&self, ctx: &GateContext<'_>) -> GateOutcome {
        if ctx.context_loaded {
            return GateOutcome::Pass;
        }
        GateOutcome::Block(Finding::new(
            self.kind(),
            ViolationClass::MandatoryPrerequisiteMissing,
            ctx.feature(),
            FindingDetail::ContextMissing,
        ))
    }
}

// ============================================================================
// Attempt gates
// ============================================================================

/// Blocks when the latest failure category has recurred `threshold` times,
/// until the caller reports external research.
#[derive(Debug, Clone, Copy)]
pub struct ExternalResearchGate {
    threshold: u32,
}

impl ExternalResearchGate {
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }
}

impl Gate for ExternalResearchGate {
    fn kind(&self) -> GateKind {
        GateKind::ExternalResearch
    }

    fn applies_to(&self, _action: ActionKind) -> bool {
        true
    }

    fn check(&self, ctx: &GateContext<'_>) -> GateOutcome {
        if ctx.session.is_skipped()
            || ctx.request.external_research_done
            || ctx.session.is_acknowledged(Acknowledgement::ExternalResearch)
        {
            return GateOutcome::Pass;
        }

        let Some(category) = ctx.session.latest_category() else {
            return GateOutcome::Pass;
        };
        let occurrences = ctx.session.latest_category_count();
        if occurrences < self.threshold {
            return GateOutcome::Pass;
        }

        GateOutcome::Block(Finding::new(
            self.kind(),
            ViolationClass::RepeatedFailurePattern,
            ctx.feature(),
            FindingDetail::RepeatedCategory {
                category: category.clone(),
                occurrences,
                threshold: self.threshold,
            },
        ))
    }
}

/// Blocks once the attempt count reaches `threshold`, until the caller
/// acknowledges a deep analysis.
#[derive(Debug, Clone, Copy)]
pub struct DeepAnalysisGate {
    threshold: u32,
}

impl DeepAnalysisGate {
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }
}

impl Gate for DeepAnalysisGate {
    fn kind(&self) -> GateKind {
        GateKind::DeepAnalysis
    }

    fn applies_to(&self, _action: ActionKind) -> bool {
        true
    }

    fn check(&self, ctx: &GateContext<'_>) -> GateOutcome {
        let attempts = ctx.session.attempt_count();
        if ctx.session.is_skipped()
            || ctx.request.deep_analysis_ack
            || ctx.session.is_acknowledged(Acknowledgement::DeepAnalysis)
            || attempts < self.threshold
        {
            return GateOutcome::Pass;
        }

        GateOutcome::Block(Finding::new(
            self.kind(),
            ViolationClass::AttemptBudgetExceeded,
            ctx.feature(),
            FindingDetail::AttemptThreshold {
                attempts,
                threshold: self.threshold,
            },
        ))
    }
}

/// Blocks permanently at the session's attempt ceiling unless the feature
/// has been marked skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxAttemptsGate;

impl Gate for MaxAttemptsGate {
    fn kind(&self) -> GateKind {
        GateKind::MaxAttempts
    }

    fn applies_to(&self, _action: ActionKind) -> bool {
        true
    }

    fn check(&self, ctx: &GateContext<'_>) -> GateOutcome {
        let attempts = ctx.session.attempt_count();
        let max_attempts = ctx.session.max_attempts();
        if ctx.session.is_skipped() || attempts < max_attempts {
            return GateOutcome::Pass;
        }

        GateOutcome::Block(Finding::new(
            self.kind(),
            ViolationClass::AttemptBudgetExhausted,
            ctx.feature(),
            FindingDetail::AttemptCeiling {
                attempts,
                max_attempts,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{FailureCategory, SessionKey};

    fn request(action: ActionKind) -> ActionRequest {
        ActionRequest::new(action, "s", "login").unwrap()
    }

    fn session_with(categories: &[&str]) -> Session {
        let key = SessionKey::new("s", "login").unwrap();
        let mut session = Session::new(&key, 25);
        for c in categories {
            session.record_failure(FailureCategory::new(c).unwrap());
        }
        session
    }

    fn check(gate: &dyn Gate, request: &ActionRequest, session: &Session, loaded: bool) -> GateOutcome {
        gate.check(&GateContext {
            request,
            session,
            context_loaded: loaded,
        })
    }

    #[test]
    fn test_standard_gate_order() {
        let kinds: Vec<GateKind> = standard_gates(&GuardConfig::default())
            .iter()
            .map(|g| g.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                GateKind::ContextAdvisory,
                GateKind::ContextMandatory,
                GateKind::ExternalResearch,
                GateKind::DeepAnalysis,
                GateKind::MaxAttempts,
            ]
        );
    }

    #[test]
    fn test_context_gates_apply_to_their_action_only() {
        assert!(ContextAdvisoryGate.applies_to(ActionKind::RunTest));
        assert!(!ContextAdvisoryGate.applies_to(ActionKind::WriteNewTest));
        assert!(ContextMandatoryGate.applies_to(ActionKind::WriteNewTest));
        assert!(!ContextMandatoryGate.applies_to(ActionKind::RunTest));
    }

    #[test]
    fn test_context_advisory_warns_until_hint_shown() {
        let req = request(ActionKind::RunTest);
        let mut session = session_with(&[]);

        match check(&ContextAdvisoryGate, &req, &session, false) {
            GateOutcome::Warn(finding) => {
                assert_eq!(finding.class, ViolationClass::AdvisoryCondition);
                let hint = finding.hint.expect("advisory carries a hint key");
                assert_eq!(hint.as_str(), "context_reminder_login");
                session.mark_hint_shown(&hint);
            }
            other => panic!("expected warn, got {other:?}"),
        }

        assert_eq!(
            check(&ContextAdvisoryGate, &req, &session, false),
            GateOutcome::Pass
        );
        assert_eq!(
            check(&ContextAdvisoryGate, &req, &session_with(&[]), true),
            GateOutcome::Pass
        );
    }

    #[test]
    fn test_context_mandatory_ignores_shown_hints() {
        let req = request(ActionKind::WriteNewTest);
        let mut session = session_with(&[]);
        session.mark_hint_shown(&HintKey::new(HintType::ContextReminder, "login"));
        session.mark_skipped();

        assert!(matches!(
            check(&ContextMandatoryGate, &req, &session, false),
            GateOutcome::Block(_)
        ));
        assert_eq!(
            check(&ContextMandatoryGate, &req, &session, true),
            GateOutcome::Pass
        );
    }

    #[test]
    fn test_external_research_threshold() {
        let gate = ExternalResearchGate::new(2);
        let req = request(ActionKind::RunTest);

        assert_eq!(check(&gate, &req, &session_with(&[]), true), GateOutcome::Pass);
        assert_eq!(
            check(&gate, &req, &session_with(&["timeout"]), true),
            GateOutcome::Pass
        );
        assert_eq!(
            check(&gate, &req, &session_with(&["timeout", "assertion"]), true),
            GateOutcome::Pass
        );

        match check(&gate, &req, &session_with(&["timeout", "assertion", "timeout"]), true) {
            GateOutcome::Block(finding) => {
                assert_eq!(finding.class, ViolationClass::RepeatedFailurePattern);
                assert_eq!(
                    finding.detail,
                    FindingDetail::RepeatedCategory {
                        category: FailureCategory::new("timeout").unwrap(),
                        occurrences: 2,
                        threshold: 2,
                    }
                );
            }
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[test]
    fn test_external_research_released_by_flag() {
        let gate = ExternalResearchGate::new(2);
        let req = request(ActionKind::RunTest).with_external_research(true);
        assert_eq!(
            check(&gate, &req, &session_with(&["x", "x", "x"]), true),
            GateOutcome::Pass
        );
    }

    #[test]
    fn test_recorded_research_covers_current_attempt_only() {
        let gate = ExternalResearchGate::new(2);
        let req = request(ActionKind::RunTest);
        let mut session = session_with(&["x", "x"]);

        session.acknowledge(Acknowledgement::ExternalResearch);
        assert_eq!(check(&gate, &req, &session, true), GateOutcome::Pass);

        session.record_failure(FailureCategory::new("x").unwrap());
        assert!(matches!(
            check(&gate, &req, &session, true),
            GateOutcome::Block(_)
        ));
    }

    #[test]
    fn test_deep_analysis_threshold_and_ack() {
        let gate = DeepAnalysisGate::new(3);
        let session = session_with(&["a", "b", "c"]);

        assert!(matches!(
            check(&gate, &request(ActionKind::RunTest), &session, true),
            GateOutcome::Block(ref f) if f.class == ViolationClass::AttemptBudgetExceeded
        ));
        assert_eq!(
            check(
                &gate,
                &request(ActionKind::RunTest).with_deep_analysis_ack(true),
                &session,
                true
            ),
            GateOutcome::Pass
        );
        assert_eq!(
            check(&gate, &request(ActionKind::RunTest), &session_with(&["a", "b"]), true),
            GateOutcome::Pass
        );
    }

    #[test]
    fn test_max_attempts_ignores_acknowledgements() {
        let key = SessionKey::new("s", "login").unwrap();
        let mut session = Session::new(&key, 2);
        session.record_failure(FailureCategory::new("a").unwrap());
        session.record_failure(FailureCategory::new("b").unwrap());

        let req = request(ActionKind::WriteNewTest)
            .with_external_research(true)
            .with_deep_analysis_ack(true);
        assert!(matches!(
            check(&MaxAttemptsGate, &req, &session, true),
            GateOutcome::Block(ref f) if f.class == ViolationClass::AttemptBudgetExhausted
        ));

        session.mark_skipped();
        assert_eq!(check(&MaxAttemptsGate, &req, &session, true), GateOutcome::Pass);
    }
}
