mod common;

use std::time::Duration;

use cdp_adapter::fake::SurfaceCall;
use common::{login_surface, registry, target, LOGIN_BUTTON};
use webtest_cli::{SessionError, SessionEvent};
use webtest_core_types::{Step, StepAction, StepKind};
use webtest_event_bus::EventBus;

#[tokio::test(start_paused = true)]
async fn recorded_click_replays_against_the_same_selector() {
    let surface = login_surface();
    let sessions = registry(&surface);
    let session = sessions.create(Some("https://example.com")).await.unwrap();
    let mut events = session.events().subscribe();

    session.start_recording().await.unwrap();
    assert!(session.remote_click(20.0, 20.0).await.unwrap());
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    session.stop_recording().await.unwrap();

    let steps = session.steps();
    assert_eq!(steps.len(), 1, "{steps:?}");
    assert_eq!(steps[0].kind(), StepKind::Click);
    assert_eq!(steps[0].candidates()[0].selector, LOGIN_BUTTON);
    match events.try_recv() {
        Ok(SessionEvent::StepRecorded(step)) => assert_eq!(step.id, steps[0].id),
        other => panic!("expected a recorded step, got {other:?}"),
    }

    let report = session.run(None).await.unwrap();
    assert_eq!(report.steps.len(), 1);
    assert!(report.steps[0].success);

    let clicks: Vec<_> = surface
        .calls()
        .into_iter()
        .filter(|call| matches!(call, SurfaceCall::Click { .. }))
        .collect();
    let expected = SurfaceCall::Click {
        selector: LOGIN_BUTTON.to_string(),
        deadline: Duration::from_secs(5),
    };
    assert_eq!(clicks, vec![expected.clone(), expected]);
}

#[tokio::test(start_paused = true)]
async fn remote_input_is_recorded_once_after_the_debounce() {
    let surface = login_surface();
    let sessions = registry(&surface);
    let session = sessions.create(Some("https://example.com")).await.unwrap();

    session.start_recording().await.unwrap();
    session.remote_input(50.0, 110.0, "a").await.unwrap();
    session.remote_input(50.0, 110.0, "ada@example.com").await.unwrap();
    tokio::time::sleep(Duration::from_millis(2_100)).await;
    session.stop_recording().await.unwrap();

    let steps = session.steps();
    assert_eq!(steps.len(), 1, "{steps:?}");
    match &steps[0].action {
        StepAction::Type { target, value } => {
            assert_eq!(value, "ada@example.com");
            assert_eq!(target.candidates[0].selector, "#email");
        }
        other => panic!("expected a type step, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn replay_stops_at_the_first_failing_step() {
    let surface = login_surface();
    surface.make_unreachable("#missing");
    let sessions = registry(&surface);
    let session = sessions.create(Some("https://example.com")).await.unwrap();

    let steps = vec![
        Step::navigate("https://example.com/login").with_id("nav"),
        Step::type_text(target("#missing"), "secret").with_id("type"),
        Step::click(target(LOGIN_BUTTON)).with_id("never"),
    ];
    let err = session.run(Some(steps)).await.unwrap_err();
    match &err {
        SessionError::StepFailed { step_id, step, .. } => {
            assert_eq!(step_id.as_str(), "type");
            assert_eq!(step.kind(), StepKind::Type);
        }
        other => panic!("expected a step failure, got {other:?}"),
    }
    assert_eq!(err.http_status(), 422);
    assert!(!surface
        .calls()
        .iter()
        .any(|call| matches!(call, SurfaceCall::Click { .. })));
    assert!(!session.state().is_running());
}

#[tokio::test(start_paused = true)]
async fn run_and_record_exclude_each_other() {
    let surface = login_surface();
    let sessions = registry(&surface);
    let session = sessions.create(Some("https://example.com")).await.unwrap();

    session.start_recording().await.unwrap();
    assert!(matches!(
        session.run(None).await,
        Err(SessionError::Precondition(_))
    ));
    assert!(matches!(
        session.start_recording().await,
        Err(SessionError::Precondition(_))
    ));
    session.stop_recording().await.unwrap();
    assert!(matches!(
        session.stop_recording().await,
        Err(SessionError::Precondition(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn closing_the_registry_closes_pages() {
    let surface = login_surface();
    let sessions = registry(&surface);
    let first = sessions.create(Some("https://example.com")).await.unwrap();
    sessions.create(None).await.unwrap();
    first.start_recording().await.unwrap();
    assert_eq!(surface.open_pages(), 2);

    sessions.close_all().await;
    assert_eq!(surface.open_pages(), 0);
    assert!(sessions.is_empty());
    assert!(matches!(
        sessions.get(first.id()),
        Err(SessionError::NotFound(_))
    ));
    assert!(first.is_closed());
}
