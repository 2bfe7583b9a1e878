use lazy_static::lazy_static;
use prometheus::{core::Collector, IntCounter, IntCounterVec, Registry};
use tracing::error;

lazy_static! {
    static ref STEPS_RECORDED_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("webtest_recorded_steps_total", "Steps appended by recording"),
        &["kind"]
    )
    .expect("valid metric definition");
    static ref EVENTS_DROPPED_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "webtest_capture_events_dropped_total",
            "Captured events that did not become a step"
        ),
        &["reason"]
    )
    .expect("valid metric definition");
    static ref POLL_TICKS_TOTAL: IntCounter =
        IntCounter::new("webtest_recorder_poll_ticks_total", "Recorder poll ticks run")
            .expect("valid metric definition");
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register recorder metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, STEPS_RECORDED_TOTAL.clone());
    register(registry, EVENTS_DROPPED_TOTAL.clone());
    register(registry, POLL_TICKS_TOTAL.clone());
}

pub fn record_step(kind: &str) {
    STEPS_RECORDED_TOTAL.with_label_values(&[kind]).inc();
}

/// `reason` is one of `no_target`, `no_candidates`, `overflow`, `error`.
pub fn record_dropped(reason: &str, count: u64) {
    if count > 0 {
        EVENTS_DROPPED_TOTAL.with_label_values(&[reason]).inc_by(count);
    }
}

pub fn record_tick() {
    POLL_TICKS_TOTAL.inc();
}

pub fn dropped_total(reason: &str) -> u64 {
    EVENTS_DROPPED_TOTAL.with_label_values(&[reason]).get()
}

pub fn recorded_total(kind: &str) -> u64 {
    STEPS_RECORDED_TOTAL.with_label_values(&[kind]).get()
}
