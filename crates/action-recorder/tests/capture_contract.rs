//! The in-page capture module against a real Chromium. Ignored by default; run with
//! `WEBTEST_USE_REAL_CHROME=1 cargo test -p action-recorder -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use action_recorder::capture::{parse_batch, set_active_expression, DRAIN_EXPRESSION};
use action_recorder::{capture_script, CaptureOptions, DrainBatch};
use cdp_adapter::{real_chrome_requested, AutomationSurface, CdpAdapter, CdpConfig, PageId};
use webtest_core_types::CaptureKind;

const NOTES_PAGE: &str = "data:text/html,<html><body style='margin:0'>\
<button id='save' style='position:absolute;left:10px;top:10px;width:100px;height:40px'>Save</button>\
<textarea id='notes' style='position:absolute;left:10px;top:80px;width:200px;height:40px;\
margin:0;padding:0;border:0'></textarea>\
</body></html>";

const TYPE_BURST: &str = r#"(() => {
  const field = document.querySelector('#notes');
  for (const text of ['h', 'he', 'hey']) {
    field.value = text;
    field.dispatchEvent(new Event('input', { bubbles: true }));
  }
  return true;
})()"#;

async fn launch() -> Option<Arc<CdpAdapter>> {
    if !real_chrome_requested() {
        eprintln!("skipping: WEBTEST_USE_REAL_CHROME is not set");
        return None;
    }
    Some(CdpAdapter::launch(CdpConfig::default()).await.expect("launch chromium"))
}

async fn drain(adapter: &CdpAdapter, page: PageId) -> DrainBatch {
    let raw = adapter.evaluate(page, DRAIN_EXPRESSION).await.unwrap();
    parse_batch(raw).unwrap()
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium and WEBTEST_USE_REAL_CHROME=1"]
async fn input_bursts_debounce_and_inactive_capture_is_silent() {
    let Some(adapter) = launch().await else { return };
    let page = adapter
        .create_page(NOTES_PAGE, Duration::from_secs(15))
        .await
        .expect("page");
    let script = capture_script(&CaptureOptions::default());
    adapter.evaluate(page, &script).await.unwrap();
    // a second install is a no-op
    adapter.evaluate(page, &script).await.unwrap();

    adapter.evaluate(page, TYPE_BURST).await.unwrap();
    assert!(drain(&adapter, page).await.is_empty(), "debounce fired early");

    tokio::time::sleep(Duration::from_millis(800)).await;
    let batch = drain(&adapter, page).await;
    assert_eq!(batch.events.len(), 1, "{batch:?}");
    let record = &batch.events[0];
    assert_eq!(record.kind, CaptureKind::Input);
    assert_eq!(record.value.as_deref(), Some("hey"));
    assert_eq!((record.x, record.y), (110.0, 100.0));
    assert_eq!(record.target.tag_name, "textarea");
    assert!(drain(&adapter, page).await.is_empty());

    adapter
        .click(page, "#save", Duration::from_secs(5))
        .await
        .expect("click");
    let batch = drain(&adapter, page).await;
    assert_eq!(batch.events.len(), 1, "{batch:?}");
    assert_eq!(batch.events[0].kind, CaptureKind::Click);
    assert_eq!(batch.events[0].target.id.as_deref(), Some("save"));

    let active = adapter
        .evaluate(page, &set_active_expression(false))
        .await
        .unwrap();
    assert_eq!(active, false);
    adapter
        .click(page, "#save", Duration::from_secs(5))
        .await
        .expect("click");
    adapter.evaluate(page, TYPE_BURST).await.unwrap();
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(drain(&adapter, page).await.is_empty());

    adapter.close_page(page).await.unwrap();
    adapter.shutdown().await;
}
