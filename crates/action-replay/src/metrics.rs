use lazy_static::lazy_static;
use prometheus::{core::Collector, histogram_opts, HistogramVec, IntCounterVec, Registry};
use tracing::error;

lazy_static! {
    static ref STEPS_REPLAYED_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("webtest_replayed_steps_total", "Steps executed by replay"),
        &["kind", "outcome"]
    )
    .expect("valid metric definition");
    static ref STEP_DURATION: HistogramVec = HistogramVec::new(
        histogram_opts!(
            "webtest_replay_step_duration_seconds",
            "Time spent executing one replayed step",
            vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
        ),
        &["kind"]
    )
    .expect("valid metric definition");
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register replay metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, STEPS_REPLAYED_TOTAL.clone());
    register(registry, STEP_DURATION.clone());
}

pub fn record_step(kind: &str, success: bool, seconds: f64) {
    let outcome = if success { "success" } else { "failure" };
    STEPS_REPLAYED_TOTAL
        .with_label_values(&[kind, outcome])
        .inc();
    STEP_DURATION.with_label_values(&[kind]).observe(seconds);
}

pub fn replayed_total(kind: &str, success: bool) -> u64 {
    let outcome = if success { "success" } else { "failure" };
    STEPS_REPLAYED_TOTAL
        .with_label_values(&[kind, outcome])
        .get()
}
