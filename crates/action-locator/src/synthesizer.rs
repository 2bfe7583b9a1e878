//! Ranked selector synthesis

use std::sync::Arc;

use cdp_adapter::{AutomationSurface, PageId};
use tracing::{debug, warn};
use webtest_core_types::{ElementSnapshot, SelectorCandidate, SelectorInfo, UNIQUENESS_INVALID};

use crate::errors::LocatorError;
use crate::resolver::{DefaultElementResolver, ElementResolver};
use crate::strategies::{default_strategies, CandidateStrategy, Uniqueness};

/// Turns elements into ranked [`SelectorCandidate`] lists.
pub struct SelectorSynthesizer {
    surface: Arc<dyn AutomationSurface>,
    resolver: Arc<dyn ElementResolver>,
    strategies: Vec<Box<dyn CandidateStrategy>>,
}

impl SelectorSynthesizer {
    /// Create a synthesizer with the default resolver and rule set
    pub fn new(surface: Arc<dyn AutomationSurface>) -> Self {
        let resolver = Arc::new(DefaultElementResolver::new(surface.clone()));
        Self::with_resolver(surface, resolver)
    }

    pub fn with_resolver(
        surface: Arc<dyn AutomationSurface>,
        resolver: Arc<dyn ElementResolver>,
    ) -> Self {
        Self {
            surface,
            resolver,
            strategies: default_strategies(),
        }
    }

    /// Every applicable candidate for `element`, best first.
    ///
    /// Uniqueness is counted against the live document. A count that cannot
    /// be obtained marks the candidate with [`UNIQUENESS_INVALID`] instead of
    /// failing the whole synthesis. Candidates with equal score keep their
    /// generation order.
    pub async fn synthesize(&self, page: PageId, element: &ElementSnapshot) -> Vec<SelectorCandidate> {
        let mut candidates = Vec::new();
        for strategy in &self.strategies {
            for proposal in strategy.propose(element) {
                let uniqueness = match proposal.uniqueness {
                    Uniqueness::Assumed(value) => value,
                    Uniqueness::Verify => self.count(page, &proposal.selector).await,
                };
                candidates.push(SelectorCandidate::new(
                    proposal.selector,
                    proposal.kind,
                    proposal.score,
                    uniqueness,
                ));
            }
        }
        // sort_by is stable
        candidates.sort_by(|a, b| b.score.cmp(&a.score));
        debug!(
            tag = %element.tag_name,
            candidates = candidates.len(),
            "synthesized selectors"
        );
        candidates
    }

    /// Resolve the element at `(x, y)` and synthesize its candidates.
    ///
    /// Returns `None` when nothing is there or when no rule applies to the
    /// element that is.
    pub async fn inspect(
        &self,
        page: PageId,
        x: f64,
        y: f64,
    ) -> Result<Option<SelectorInfo>, LocatorError> {
        let Some(element) = self.resolver.resolve(page, x, y).await? else {
            return Ok(None);
        };
        let candidates = self.synthesize(page, &element).await;
        if candidates.is_empty() {
            debug!(tag = %element.tag_name, "element has no usable selector");
            return Ok(None);
        }
        Ok(Some(SelectorInfo {
            element,
            candidates,
        }))
    }

    async fn count(&self, page: PageId, selector: &str) -> u32 {
        match self.surface.count_matches(page, selector).await {
            Ok(count) => u32::try_from(count).unwrap_or(u32::MAX),
            Err(err) => {
                warn!(selector, error = %err, "uniqueness check failed");
                UNIQUENESS_INVALID
            }
        }
    }
}
