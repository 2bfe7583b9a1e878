//! Element location and selector synthesis
//!
//! This crate turns a point in the viewport into a replayable target:
//! - Hit-test resolution into an [`ElementSnapshot`](webtest_core_types::ElementSnapshot)
//! - Rule-based candidate generation (test ids, roles, text, ids, classes)
//! - Live-document uniqueness counting and stable score ranking

pub mod errors;
pub mod heuristics;
pub mod resolver;
pub mod strategies;
pub mod synthesizer;

pub use errors::*;
pub use resolver::*;
pub use strategies::*;
pub use synthesizer::*;
