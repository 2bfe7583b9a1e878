use std::sync::Arc;
use std::time::Duration;

use action_replay::{ReplayEngine, ReplayError, ReplayObserver, ReplayOptions, StepOutcome};
use cdp_adapter::fake::{FakeSurface, SurfaceCall};
use cdp_adapter::{AutomationSurface, PageId};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use webtest_core_types::{
    CandidateKind, ElementSnapshot, SelectorCandidate, SelectorInfo, Step, StepKind, StepStore,
};

#[derive(Default)]
struct Outcomes(Mutex<Vec<(StepOutcome, Step)>>);

impl ReplayObserver for Outcomes {
    fn step_executed(&self, outcome: &StepOutcome, step: &Step) {
        self.0.lock().push((outcome.clone(), step.clone()));
    }
}

fn target(candidates: Vec<SelectorCandidate>) -> SelectorInfo {
    SelectorInfo {
        element: ElementSnapshot::default(),
        candidates,
    }
}

async fn open() -> (Arc<FakeSurface>, PageId) {
    let surface = Arc::new(FakeSurface::new());
    let page = surface
        .create_page("about:blank", Duration::from_secs(1))
        .await
        .expect("page");
    (surface, page)
}

#[tokio::test]
async fn unique_candidate_is_preferred_over_score() {
    let (surface, page) = open().await;
    let engine = ReplayEngine::new(surface.clone(), ReplayOptions::default());
    let step = Step::click(target(vec![
        SelectorCandidate::new("[data-testid=\"row\"]", CandidateKind::Testid, 40, 2),
        SelectorCandidate::new("#row-7", CandidateKind::Css, 10, 1),
    ]));

    engine
        .run(page, &[step], &Outcomes::default(), &CancellationToken::new())
        .await
        .expect("replay");
    assert_eq!(
        surface.calls().last(),
        Some(&SurfaceCall::Click {
            selector: "#row-7".into(),
            deadline: Duration::from_secs(5),
        })
    );
}

#[tokio::test(start_paused = true)]
async fn run_stops_at_the_step_whose_target_is_gone() {
    let (surface, page) = open().await;
    surface.make_unreachable("#name");
    let engine = ReplayEngine::new(surface.clone(), ReplayOptions::default());

    let mut store = StepStore::new();
    store.append(Step::navigate("https://example.com")).unwrap();
    store
        .append(Step::click(target(vec![SelectorCandidate::new(
            "[data-testid=\"open\"]",
            CandidateKind::Testid,
            40,
            1,
        )])))
        .unwrap();
    let typed = store
        .append(Step::type_text(
            target(vec![SelectorCandidate::new(
                "#name",
                CandidateKind::Css,
                10,
                1,
            )]),
            "hi",
        ))
        .unwrap()
        .id
        .clone();
    store.append(Step::comment("never reached")).unwrap();

    let observer = Outcomes::default();
    let err = engine
        .run(page, &store.snapshot(), &observer, &CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        ReplayError::StepFailed {
            step_id,
            kind,
            message,
            step,
        } => {
            assert_eq!(step_id, &typed);
            assert_eq!(*kind, StepKind::Type);
            assert!(message.contains("timed out"), "{message}");
            assert_eq!(step.value(), Some("hi"));
        }
        other => panic!("unexpected {other:?}"),
    }

    let outcomes = observer.0.lock();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].0.success && outcomes[1].0.success);
    assert!(!outcomes[2].0.success);
    assert_eq!(outcomes[2].1.id, typed);

    // earlier effects stay; nothing after the failure ran
    let calls = surface.calls();
    assert!(calls.contains(&SurfaceCall::Navigate {
        url: "https://example.com".into(),
        deadline: Duration::from_secs(30),
    }));
    assert!(matches!(
        calls.last(),
        Some(SurfaceCall::Fill { selector, .. }) if selector == "#name"
    ));
    assert_eq!(surface.current_url(page).await.unwrap(), "https://example.com");
}
