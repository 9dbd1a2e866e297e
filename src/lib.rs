//! fixguard - Attempt Governance for Automated Test-Fix Loops
//!
//! A policy layer that sits in front of automated test-fix iterations and
//! decides, per invocation, whether the next action may proceed (ALLOW),
//! may proceed with an advisory (WARN), or must stop (BLOCK).
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`session`] - Per-feature attempt state and the file-backed session store
//! - [`context`] - Context availability checks
//! - [`advisory`] - Once-per-session advisory deduplication
//! - [`gate`] - The ordered gate pipeline and its evaluator
//! - [`emit`] - Rendering decisions into messages and exit codes
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Custom error types and handling
//! - [`testing`] - Mock stores and context sources
//!
//! # Example
//!
//! ```rust,ignore
//! use fixguard::config::GuardConfig;
//! use fixguard::context::DirectoryContextSource;
//! use fixguard::gate::{ActionKind, ActionRequest, GateEvaluator};
//! use fixguard::session::FileSessionStore;
//!
//! let config = GuardConfig::load(project)?;
//! let evaluator = GateEvaluator::standard(
//!     FileSessionStore::new(config.state_dir(project), config.max_attempts),
//!     DirectoryContextSource::new(config.context_dir(project)),
//!     &config,
//! );
//!
//! // After the classifier labels a failed run
//! evaluator.record_failure("session-1", "login", "selector-timeout")?;
//!
//! // Before the next run
//! let request = ActionRequest::new(ActionKind::RunTest, "session-1", "login")?;
//! let decision = evaluator.evaluate(&request);
//! std::process::exit(fixguard::emit::exit_code(&decision));
//! ```

pub mod advisory;
pub mod config;
pub mod context;
pub mod emit;
pub mod error;
pub mod gate;
pub mod session;
pub mod testing;

// Re-export commonly used types
pub use error::{GuardError, IntoGuardError, Result};

pub use config::GuardConfig;

pub use context::{ContextSource, DirectoryContextSource};

pub use emit::{DecisionEmitter, OutputFormat, BLOCK_EXIT_CODE};

pub use gate::{
    ActionKind, ActionRequest, Finding, FindingDetail, GateDecision, GateEvaluator, GateKind,
    ViolationClass,
};

pub use session::{
    Acknowledgement, FailureCategory, FileSessionStore, Session, SessionKey, SessionStore,
};

pub use testing::{MockContextSource, MockSessionStore};
