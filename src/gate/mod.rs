//! Attempt-governance gates.
//!
//! Each guarded action (a test run or the creation of a new test file) is
//! checked by an ordered list of gates. A gate passes, adds an advisory
//! (WARN), or stops the action (BLOCK). The first BLOCK ends evaluation.
//!
//! # Standard Gates
//!
//! | Gate | Action | Blocks when |
//! |---|---|---|
//! | [`ContextAdvisoryGate`] | run-test | never (warns once when context is missing) |
//! | [`ContextMandatoryGate`] | write-new-test | context is missing |
//! | [`ExternalResearchGate`] | both | latest failure category repeated too often |
//! | [`DeepAnalysisGate`] | both | attempt count reached the deep-analysis threshold |
//! | [`MaxAttemptsGate`] | both | attempt count reached the session ceiling |
//!
//! # Example
//!
//! ```rust,ignore
//! use fixguard::gate::{ActionKind, ActionRequest, GateEvaluator};
//!
//! let evaluator = GateEvaluator::standard(store, context, &config);
//! let request = ActionRequest::new(ActionKind::RunTest, "session-1", "login")?;
//! let decision = evaluator.evaluate(&request);
//! for line in fixguard::emit::render_text(&decision) {
//!     eprintln!("{line}");
//! }
//! ```

pub mod evaluator;
pub mod gates;

pub use evaluator::GateEvaluator;
pub use gates::{
    standard_gates, ContextAdvisoryGate, ContextMandatoryGate, DeepAnalysisGate,
    ExternalResearchGate, Gate, GateContext, GateOutcome, MaxAttemptsGate,
};

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::advisory::HintKey;
use crate::error::Result;
use crate::session::{FailureCategory, SessionKey};

// ============================================================================
// Requests
// ============================================================================

/// The kind of guarded action being attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    /// Running (part of) the test suite.
    RunTest,
    /// Writing a test file that does not exist yet.
    WriteNewTest,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunTest => write!(f, "run-test"),
            Self::WriteNewTest => write!(f, "write-new-test"),
        }
    }
}

/// One invocation of a guarded action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub action: ActionKind,
    pub key: SessionKey,
    /// Caller has evidence that external research happened.
    pub external_research_done: bool,
    /// Caller acknowledges a deep analysis of the failures.
    pub deep_analysis_ack: bool,
    /// Caller has marked the feature's test as skipped/disabled.
    pub mark_skipped: bool,
}

impl ActionRequest {
    /// Creates a request with all acknowledgement flags unset.
    pub fn new(
        action: ActionKind,
        session_id: impl Into<String>,
        feature: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            action,
            key: SessionKey::new(session_id, feature)?,
            external_research_done: false,
            deep_analysis_ack: false,
            mark_skipped: false,
        })
    }

    #[must_use]
    pub fn with_external_research(mut self, done: bool) -> Self {
        self.external_research_done = done;
        self
    }

    #[must_use]
    pub fn with_deep_analysis_ack(mut self, ack: bool) -> Self {
        self.deep_analysis_ack = ack;
        self
    }

    #[must_use]
    pub fn with_mark_skipped(mut self, skipped: bool) -> Self {
        self.mark_skipped = skipped;
        self
    }

    #[must_use]
    pub fn feature(&self) -> &str {
        self.key.feature()
    }
}

// ============================================================================
// Findings and decisions
// ============================================================================

/// Which check produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateKind {
    ContextAdvisory,
    ContextMandatory,
    ExternalResearch,
    DeepAnalysis,
    MaxAttempts,
    /// Not a pipeline gate: reported when session state cannot be loaded.
    SessionState,
}

impl GateKind {
    /// Human-readable gate name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ContextAdvisory => "Context Advisory",
            Self::ContextMandatory => "Context Mandatory",
            Self::ExternalResearch => "External Research",
            Self::DeepAnalysis => "Deep Analysis",
            Self::MaxAttempts => "Max Attempts",
            Self::SessionState => "Session State",
        }
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error class of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationClass {
    /// Optional prerequisite missing. Reported once, never fatal.
    AdvisoryCondition,
    /// Required prerequisite missing. Always fatal, never silenced.
    MandatoryPrerequisiteMissing,
    /// Same failure category keeps coming back.
    RepeatedFailurePattern,
    /// Soft attempt threshold reached.
    AttemptBudgetExceeded,
    /// Hard attempt ceiling reached.
    AttemptBudgetExhausted,
}

impl fmt::Display for ViolationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AdvisoryCondition => "AdvisoryCondition",
            Self::MandatoryPrerequisiteMissing => "MandatoryPrerequisiteMissing",
            Self::RepeatedFailurePattern => "RepeatedFailurePattern",
            Self::AttemptBudgetExceeded => "AttemptBudgetExceeded",
            Self::AttemptBudgetExhausted => "AttemptBudgetExhausted",
        };
        f.write_str(name)
    }
}

/// Facts behind a finding. Rendering turns these into text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FindingDetail {
    ContextMissing,
    StorageUnavailable {
        reason: String,
    },
    RepeatedCategory {
        category: FailureCategory,
        occurrences: u32,
        threshold: u32,
    },
    AttemptThreshold {
        attempts: u32,
        threshold: u32,
    },
    AttemptCeiling {
        attempts: u32,
        max_attempts: u32,
    },
}

/// A WARN or BLOCK produced by one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub gate: GateKind,
    pub class: ViolationClass,
    pub feature: String,
    pub detail: FindingDetail,
    /// Dedup key to mark once this finding is emitted.
    #[serde(skip)]
    pub hint: Option<HintKey>,
}

impl Finding {
    #[must_use]
    pub fn new(
        gate: GateKind,
        class: ViolationClass,
        feature: impl Into<String>,
        detail: FindingDetail,
    ) -> Self {
        Self {
            gate,
            class,
            feature: feature.into(),
            detail,
            hint: None,
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: HintKey) -> Self {
        self.hint = Some(hint);
        self
    }
}

/// Outcome of one evaluation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Proceed silently.
    Allow,
    /// Proceed, with advisories for the caller.
    Warn(Vec<Finding>),
    /// Do not proceed. Advisories gathered before the block are kept.
    Block {
        finding: Finding,
        advisories: Vec<Finding>,
    },
}

impl GateDecision {
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Block { .. })
    }

    /// Advisories attached to the decision.
    #[must_use]
    pub fn advisories(&self) -> &[Finding] {
        match self {
            Self::Allow => &[],
            Self::Warn(advisories) => advisories,
            Self::Block { advisories, .. } => advisories,
        }
    }

    /// The blocking finding, if any.
    #[must_use]
    pub fn blocking(&self) -> Option<&Finding> {
        match self {
            Self::Block { finding, .. } => Some(finding),
            _ => None,
        }
    }

    /// Short label for logs and JSON output.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Warn(_) => "warn",
            Self::Block { .. } => "block",
        }
    }
}
