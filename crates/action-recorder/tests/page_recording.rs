use std::sync::Arc;
use std::time::Duration;

use action_locator::SelectorSynthesizer;
use action_recorder::{
    CaptureOptions, CaptureSource, HostPoller, PageCapture, PollContext, StepSink,
    DEFAULT_POLL_INTERVAL,
};
use cdp_adapter::fake::FakeSurface;
use cdp_adapter::{AutomationSurface, PageId, RawElement, ELEMENT_NODE};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;
use webtest_core_types::{BoundingBox, CoreError, Step, StepAction, StepStore};

#[derive(Default)]
struct Recorded(Mutex<StepStore>);

impl StepSink for Recorded {
    fn append(&self, step: Step) -> Result<Step, CoreError> {
        self.0.lock().append(step).cloned()
    }
}

fn placed(tag: &str, attrs: &[(&str, &str)], rect: BoundingBox) -> RawElement {
    RawElement {
        node_type: ELEMENT_NODE,
        tag_name: tag.to_uppercase(),
        attributes: attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        rect: Some(rect),
        ..RawElement::default()
    }
}

async fn recording_page() -> (Arc<FakeSurface>, PageId) {
    let surface = Arc::new(FakeSurface::new());
    surface
        .place(placed(
            "button",
            &[("data-testid", "login-btn")],
            BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 120.0,
                height: 40.0,
            },
        ))
        .place(placed(
            "input",
            &[("id", "email")],
            BoundingBox {
                x: 0.0,
                y: 100.0,
                width: 200.0,
                height: 30.0,
            },
        ))
        .set_count("[data-testid=\"login-btn\"]", 1)
        .set_count("#email", 1)
        .set_evaluation("drain()", json!({"events": [], "overflow": 0}));
    let page = surface
        .create_page("https://example.com", Duration::from_secs(1))
        .await
        .expect("page");
    (surface, page)
}

#[tokio::test(start_paused = true)]
async fn buffered_events_are_drained_exactly_once() {
    let (surface, page) = recording_page().await;
    let capture = Arc::new(PageCapture::new(
        surface.clone(),
        page,
        &CaptureOptions::default(),
    ));
    let sink = Arc::new(Recorded::default());
    let poller = HostPoller::start(
        PollContext {
            surface: surface.clone(),
            page,
            sources: vec![capture.clone() as Arc<dyn CaptureSource>],
            synthesizer: Arc::new(SelectorSynthesizer::new(surface.clone())),
            sink: sink.clone(),
            page_lock: Arc::new(AsyncMutex::new(())),
        },
        DEFAULT_POLL_INTERVAL,
    )
    .await
    .expect("start");

    // let the immediate first tick pass with an empty buffer
    tokio::time::sleep(Duration::from_millis(10)).await;
    surface.queue_evaluation(
        "drain()",
        json!({
            "events": [
                {"kind": "click", "timestamp": 100, "x": 20, "y": 20, "target": {"tagName": "button"}},
                {"kind": "input", "timestamp": 200, "x": 100, "y": 115, "value": "a@b.c",
                 "target": {"tagName": "input", "id": "email"}}
            ],
            "overflow": 0
        }),
    );

    tokio::time::sleep(Duration::from_millis(1000)).await;
    let steps = sink.0.lock().snapshot();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].candidates()[0].selector, "[data-testid=\"login-btn\"]");
    match &steps[1].action {
        StepAction::Type { target, value } => {
            assert_eq!(value, "a@b.c");
            assert_eq!(target.candidates[0].selector, "#email");
        }
        other => panic!("expected a type step, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(sink.0.lock().len(), 2);

    poller.stop().await;
    assert_eq!(surface.init_scripts(page).len(), 1);
    let last = surface.evaluations().pop().unwrap_or_default();
    assert!(last.contains("setActive(false)"));
}
