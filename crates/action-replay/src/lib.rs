//! Replay of recorded steps
//!
//! [`ReplayEngine`] executes a step list sequentially against one page:
//! - navigate loads the URL and waits for the document
//! - click, type and assert act on the step's best selector under a hard deadline
//! - waitFor pauses, comment does nothing
//!
//! The first failure ends the run with [`ReplayError::StepFailed`].

pub mod engine;
pub mod errors;
pub mod metrics;
pub mod selection;
pub mod types;

pub use engine::{NoopObserver, ReplayEngine, ReplayObserver};
pub use errors::ReplayError;
pub use selection::{best_selector, BODY_FALLBACK};
pub use types::{ReplayOptions, ReplayReport, ReplayState, StepOutcome};
