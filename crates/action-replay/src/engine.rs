//! Replay engine
//!
//! Walks a step list in order against one page and stops at the first
//! failure. Nothing is retried and nothing already done is rolled back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cdp_adapter::{AdapterError, AdapterErrorKind, AutomationSurface, PageId};
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webtest_core_types::{Step, StepAction};

use crate::errors::ReplayError;
use crate::metrics;
use crate::selection::best_selector;
use crate::types::{ReplayOptions, ReplayReport, ReplayState, StepOutcome};

/// Extra time granted to the surface beyond its own deadline before the
/// engine gives up on it.
const SURFACE_GRACE: Duration = Duration::from_secs(1);

/// Receives replay notifications
pub trait ReplayObserver: Send + Sync {
    fn run_started(&self, _total: usize) {}

    /// Called after every executed step; `step` is the step the outcome is for.
    fn step_executed(&self, outcome: &StepOutcome, step: &Step);

    fn run_finished(&self, _result: &Result<ReplayReport, ReplayError>) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl ReplayObserver for NoopObserver {
    fn step_executed(&self, _outcome: &StepOutcome, _step: &Step) {}
}

/// Sequential step executor
pub struct ReplayEngine {
    surface: Arc<dyn AutomationSurface>,
    options: ReplayOptions,
    running: AtomicBool,
}

impl ReplayEngine {
    /// Create a new engine over the given surface
    pub fn new(surface: Arc<dyn AutomationSurface>, options: ReplayOptions) -> Self {
        Self {
            surface,
            options,
            running: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> &ReplayOptions {
        &self.options
    }

    pub fn state(&self) -> ReplayState {
        if self.running.load(Ordering::Acquire) {
            ReplayState::Running
        } else {
            ReplayState::Idle
        }
    }

    /// Execute `steps` in order.
    ///
    /// Cancellation is checked before each step; a step already started runs
    /// to completion.
    pub async fn run(
        &self,
        page: PageId,
        steps: &[Step],
        observer: &dyn ReplayObserver,
        cancel: &CancellationToken,
    ) -> Result<ReplayReport, ReplayError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ReplayError::AlreadyRunning);
        }
        let _idle = IdleOnDrop(&self.running);

        info!(target: "replay", page = %page, steps = steps.len(), "replay started");
        observer.run_started(steps.len());
        let result = self.run_steps(page, steps, observer, cancel).await;
        match &result {
            Ok(report) => info!(
                target: "replay",
                steps = report.steps.len(),
                duration_ms = report.duration_ms,
                "replay completed"
            ),
            Err(err) => warn!(target: "replay", error = %err, "replay stopped"),
        }
        observer.run_finished(&result);
        result
    }

    async fn run_steps(
        &self,
        page: PageId,
        steps: &[Step],
        observer: &dyn ReplayObserver,
        cancel: &CancellationToken,
    ) -> Result<ReplayReport, ReplayError> {
        let mut report = ReplayReport::new();

        for (index, step) in steps.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ReplayError::Cancelled { completed: index });
            }
            debug!(
                target: "replay",
                step = %step.id,
                kind = %step.kind(),
                "executing step {}/{}",
                index + 1,
                steps.len()
            );

            let started = Instant::now();
            let result = self.execute(page, step).await;
            let elapsed = started.elapsed();
            metrics::record_step(step.kind().as_str(), result.is_ok(), elapsed.as_secs_f64());

            match result {
                Ok(()) => {
                    let outcome = StepOutcome::succeeded(step.id.clone(), step.kind(), elapsed);
                    observer.step_executed(&outcome, step);
                    report.steps.push(outcome);
                }
                Err(err) => {
                    let message = err.to_string();
                    let outcome =
                        StepOutcome::failed(step.id.clone(), step.kind(), elapsed, message.clone());
                    observer.step_executed(&outcome, step);
                    return Err(ReplayError::StepFailed {
                        step_id: step.id.clone(),
                        kind: step.kind(),
                        message,
                        step: Box::new(step.clone()),
                    });
                }
            }
        }

        Ok(report.finish())
    }

    /// Execute one step
    async fn execute(&self, page: PageId, step: &Step) -> Result<(), AdapterError> {
        let action_timeout = self.options.action_timeout;
        match &step.action {
            StepAction::Navigate { url } => {
                let deadline = self.options.navigate_timeout;
                self.bounded(deadline, self.surface.navigate(page, url, deadline))
                    .await
            }
            StepAction::Click { target } => {
                let selector = best_selector(&target.candidates);
                self.bounded(
                    action_timeout,
                    self.surface.click(page, selector, action_timeout),
                )
                .await
            }
            StepAction::Type { target, value } => {
                let selector = best_selector(&target.candidates);
                self.bounded(
                    action_timeout,
                    self.surface.fill(page, selector, value, action_timeout),
                )
                .await
            }
            StepAction::WaitFor { value, .. } => {
                tokio::time::sleep(self.wait_duration(value)).await;
                Ok(())
            }
            StepAction::Assert { target } => {
                let selector = best_selector(&target.candidates);
                self.bounded(
                    action_timeout,
                    self.surface.wait_for_visible(page, selector, action_timeout),
                )
                .await
            }
            StepAction::Comment { .. } => Ok(()),
        }
    }

    fn wait_duration(&self, value: &str) -> Duration {
        value
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .unwrap_or(self.options.default_wait)
    }

    async fn bounded<F>(&self, deadline: Duration, action: F) -> Result<(), AdapterError>
    where
        F: std::future::Future<Output = Result<(), AdapterError>>,
    {
        match timeout(deadline + SURFACE_GRACE, action).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::new(AdapterErrorKind::ActionTimeout)
                .with_hint(format!("exceeded {}ms", deadline.as_millis()))),
        }
    }
}

struct IdleOnDrop<'a>(&'a AtomicBool);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::fake::{FakeSurface, SurfaceCall};
    use parking_lot::Mutex;
    use webtest_core_types::{CandidateKind, ElementSnapshot, SelectorCandidate, SelectorInfo};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<StepOutcome>>);

    impl ReplayObserver for Recorder {
        fn step_executed(&self, outcome: &StepOutcome, _step: &Step) {
            self.0.lock().push(outcome.clone());
        }
    }

    fn target(selector: &str) -> SelectorInfo {
        SelectorInfo {
            element: ElementSnapshot::default(),
            candidates: vec![SelectorCandidate::new(selector, CandidateKind::Css, 10, 1)],
        }
    }

    async fn engine() -> (Arc<FakeSurface>, ReplayEngine, PageId) {
        let surface = Arc::new(FakeSurface::new());
        let page = surface
            .create_page("about:blank", Duration::from_secs(1))
            .await
            .unwrap();
        let engine = ReplayEngine::new(surface.clone(), ReplayOptions::default());
        (surface, engine, page)
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_uses_value_or_default() {
        let (_surface, engine, page) = engine().await;
        let steps = vec![
            Step::wait_for(250),
            Step::new(StepAction::WaitFor {
                target: None,
                value: "soon".into(),
            }),
        ];
        let started = Instant::now();
        engine
            .run(page, &steps, &NoopObserver, &CancellationToken::new())
            .await
            .unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1250));
        assert!(elapsed < Duration::from_millis(1300));
    }

    #[tokio::test]
    async fn every_kind_maps_to_its_surface_call() {
        let (surface, engine, page) = engine().await;
        let steps = vec![
            Step::navigate("https://example.com"),
            Step::click(target("#go")),
            Step::type_text(target("#name"), "Ada"),
            Step::assert_visible(target("#done")),
            Step::comment("done"),
        ];
        let observer = Recorder::default();
        let report = engine
            .run(page, &steps, &observer, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.steps.len(), 5);
        assert!(observer.0.lock().iter().all(|outcome| outcome.success));

        let five = Duration::from_secs(5);
        assert_eq!(
            surface.calls()[1..].to_vec(),
            vec![
                SurfaceCall::Navigate {
                    url: "https://example.com".into(),
                    deadline: Duration::from_secs(30),
                },
                SurfaceCall::Click {
                    selector: "#go".into(),
                    deadline: five,
                },
                SurfaceCall::Fill {
                    selector: "#name".into(),
                    value: "Ada".into(),
                    deadline: five,
                },
                SurfaceCall::WaitForVisible {
                    selector: "#done".into(),
                    deadline: five,
                },
            ]
        );
        assert_eq!(engine.state(), ReplayState::Idle);
    }

    #[tokio::test]
    async fn steps_without_candidates_target_the_body() {
        let (surface, engine, page) = engine().await;
        let steps = vec![Step::click(SelectorInfo::default())];
        engine
            .run(page, &steps, &NoopObserver, &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(
            surface.calls().last(),
            Some(SurfaceCall::Click { selector, .. }) if selector == "body"
        ));
    }

    #[tokio::test]
    async fn cancelled_runs_stop_before_the_next_step() {
        let (surface, engine, page) = engine().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = engine
            .run(page, &[Step::click(target("#go"))], &NoopObserver, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ReplayError::Cancelled { completed: 0 }));
        assert_eq!(surface.calls().len(), 1);
    }

    #[tokio::test]
    async fn closed_page_fails_the_first_step() {
        let (surface, engine, page) = engine().await;
        surface.close_page(page).await.unwrap();
        let err = engine
            .run(page, &[Step::click(target("#go"))], &NoopObserver, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ReplayError::StepFailed { message, .. } => assert!(message.contains("page closed")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
