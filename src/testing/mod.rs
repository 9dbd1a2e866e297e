//! Testing infrastructure for fixguard.
//!
//! - **Mocks**: in-memory [`SessionStore`](crate::session::SessionStore) and
//!   [`ContextSource`](crate::context::ContextSource) doubles with
//!   controllable behavior, usable by embedders as well as tests
//! - **Fixtures**: temporary project directories wired to the file-backed
//!   store (test-only)
//!
//! # Example
//!
//! ```rust,ignore
//! use fixguard::testing::{MockContextSource, MockSessionStore};
//! use fixguard::gate::GateEvaluator;
//!
//! let context = MockContextSource::with_features(&["login"]);
//! let store = MockSessionStore::new(25);
//! let evaluator = GateEvaluator::standard(store, &context, &Default::default());
//! ```

#[cfg(test)]
pub mod fixtures;
pub mod mocks;

#[cfg(test)]
pub use fixtures::*;
pub use mocks::*;
