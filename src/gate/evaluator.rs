//! The gate evaluator: one request in, one decision out.

use tracing::{debug, info, warn};

use super::gates::{standard_gates, Gate, GateContext, GateOutcome};
use super::{
    ActionKind, ActionRequest, Finding, FindingDetail, GateDecision, GateKind, ViolationClass,
};
use crate::advisory::AdvisoryDeduplicator;
use crate::config::GuardConfig;
use crate::context::ContextSource;
use crate::error::{GuardError, Result};
use crate::session::{Acknowledgement, FailureCategory, Session, SessionKey, SessionStore};

/// Runs the ordered gate list against persisted session state.
///
/// The evaluator is the only component that mutates attempt state: failures
/// are recorded through [`GateEvaluator::record_failure`], hints and skip
/// marks are written as a side effect of [`GateEvaluator::evaluate`].
pub struct GateEvaluator<S: SessionStore, C: ContextSource> {
    store: S,
    context: C,
    gates: Vec<Box<dyn Gate>>,
}

impl<S: SessionStore, C: ContextSource> GateEvaluator<S, C> {
    /// Creates an evaluator with the standard gate pipeline.
    #[must_use]
    pub fn standard(store: S, context: C, config: &GuardConfig) -> Self {
        Self::with_gates(store, context, standard_gates(config))
    }

    /// Creates an evaluator with a custom, ordered gate list.
    #[must_use]
    pub fn with_gates(store: S, context: C, gates: Vec<Box<dyn Gate>>) -> Self {
        Self {
            store,
            context,
            gates,
        }
    }

    /// Gate kinds in evaluation order.
    pub fn gate_order(&self) -> impl Iterator<Item = GateKind> + '_ {
        self.gates.iter().map(|g| g.kind())
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record one classified failure for a feature.
    ///
    /// # Errors
    ///
    /// Returns an error for blank ids or category labels, or if the store
    /// cannot persist the update.
    pub fn record_failure(
        &self,
        session_id: &str,
        feature: &str,
        category: &str,
    ) -> Result<Session> {
        let key = SessionKey::new(session_id, feature)?;
        let category = FailureCategory::new(category)?;
        let session = self.store.record_failure(&key, category.clone())?;
        info!(
            key = %key,
            category = %category,
            attempts = session.attempt_count(),
            max_attempts = session.max_attempts(),
            "failure recorded"
        );
        Ok(session)
    }

    /// Record out-of-band evidence that releases an attempt gate for the
    /// current attempt.
    ///
    /// # Errors
    ///
    /// Returns an error for blank ids, or if the store cannot persist the
    /// acknowledgement.
    pub fn acknowledge(
        &self,
        session_id: &str,
        feature: &str,
        ack: Acknowledgement,
    ) -> Result<Session> {
        let key = SessionKey::new(session_id, feature)?;
        let session = self.store.acknowledge(&key, ack)?;
        info!(key = %key, ack = %ack, attempts = session.attempt_count(), "acknowledgement recorded");
        Ok(session)
    }

    /// Evaluate one guarded action.
    ///
    /// Never fails: storage trouble becomes a BLOCK for new-test writes and a
    /// WARN for test runs.
    pub fn evaluate(&self, request: &ActionRequest) -> GateDecision {
        let key = &request.key;

        let mut session = match self.store.get(key) {
            Ok(session) => session,
            Err(e) => return self.storage_failure(request, &e),
        };

        if request.mark_skipped && !session.is_skipped() {
            if let Err(e) = self.store.mark_skipped(key) {
                warn!(key = %key, "failed to persist skip mark: {e}");
            }
            session.mark_skipped();
            info!(key = %key, "feature marked skipped for the rest of the session");
        }

        let ctx = GateContext {
            request,
            session: &session,
            context_loaded: self.context.context_exists(request.feature()),
        };
        let dedup = AdvisoryDeduplicator::new(&self.store);
        let mut advisories = Vec::new();

        for gate in self.gates.iter().filter(|g| g.applies_to(request.action)) {
            match gate.check(&ctx) {
                GateOutcome::Pass => {
                    debug!(gate = %gate.kind(), key = %key, "gate passed");
                }
                GateOutcome::Warn(finding) => {
                    // Only the caller that claims the hint emits it.
                    let emit = match &finding.hint {
                        Some(hint) => match dedup.mark_shown(key, hint) {
                            Ok(claimed) => claimed,
                            Err(e) => {
                                warn!(key = %key, hint = %hint, "failed to persist shown hint: {e}");
                                true
                            }
                        },
                        None => true,
                    };
                    if emit {
                        debug!(gate = %gate.kind(), key = %key, "gate warned");
                        advisories.push(finding);
                    } else {
                        debug!(gate = %gate.kind(), key = %key, "advisory already shown");
                    }
                }
                GateOutcome::Block(finding) => {
                    info!(
                        gate = %gate.kind(),
                        class = %finding.class,
                        key = %key,
                        action = %request.action,
                        "action blocked"
                    );
                    return GateDecision::Block {
                        finding,
                        advisories,
                    };
                }
            }
        }

        if advisories.is_empty() {
            GateDecision::Allow
        } else {
            GateDecision::Warn(advisories)
        }
    }

    /// Fail closed for writes, open for runs.
    fn storage_failure(&self, request: &ActionRequest, error: &GuardError) -> GateDecision {
        warn!(key = %request.key, action = %request.action, "session state unavailable: {error}");

        let detail = FindingDetail::StorageUnavailable {
            reason: error.to_string(),
        };
        match request.action {
            ActionKind::WriteNewTest => GateDecision::Block {
                finding: Finding::new(
                    GateKind::SessionState,
                    ViolationClass::MandatoryPrerequisiteMissing,
                    request.feature(),
                    detail,
                ),
                advisories: Vec::new(),
            },
            ActionKind::RunTest => GateDecision::Warn(vec![Finding::new(
                GateKind::SessionState,
                ViolationClass::AdvisoryCondition,
                request.feature(),
                detail,
            )]),
        }
    }
}
