//! Best-selector choice at replay time

use webtest_core_types::SelectorCandidate;

/// Matches the whole document body; used when a step carries no candidates.
pub const BODY_FALLBACK: &str = "body";

/// First candidate unique at synthesis time, else the first candidate, else
/// [`BODY_FALLBACK`].
///
/// Persisted scores play no part; only list order and uniqueness count.
pub fn best_selector(candidates: &[SelectorCandidate]) -> &str {
    candidates
        .iter()
        .find(|candidate| candidate.uniqueness == 1)
        .or_else(|| candidates.first())
        .map(|candidate| candidate.selector.as_str())
        .unwrap_or(BODY_FALLBACK)
}
