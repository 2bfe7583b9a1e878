use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{
    core::Collector, histogram_opts, HistogramVec, IntCounter, IntCounterVec, Registry,
};
use tracing::error;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdapterMetricsSnapshot {
    pub commands: u64,
    pub command_failures: u64,
    pub events: u64,
    pub pages_opened: u64,
}

static COMMANDS: AtomicU64 = AtomicU64::new(0);
static COMMAND_FAILURES: AtomicU64 = AtomicU64::new(0);
static EVENTS: AtomicU64 = AtomicU64::new(0);
static PAGES_OPENED: AtomicU64 = AtomicU64::new(0);

lazy_static! {
    static ref COMMANDS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("webtest_cdp_commands_total", "CDP commands sent"),
        &["method"]
    )
    .expect("valid metric definition");
    static ref COMMAND_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "webtest_cdp_command_failures_total",
            "CDP commands that returned an error"
        ),
        &["method"]
    )
    .expect("valid metric definition");
    static ref COMMAND_DURATION: HistogramVec = HistogramVec::new(
        histogram_opts!(
            "webtest_cdp_command_duration_seconds",
            "CDP command round-trip latency",
            vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]
        ),
        &["method"]
    )
    .expect("valid metric definition");
    static ref EVENTS_TOTAL: IntCounter =
        IntCounter::new("webtest_cdp_events_total", "CDP events received")
            .expect("valid metric definition");
    static ref PAGES_OPENED_TOTAL: IntCounter =
        IntCounter::new("webtest_cdp_pages_opened_total", "Pages opened by the adapter")
            .expect("valid metric definition");
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register cdp metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, COMMANDS_TOTAL.clone());
    register(registry, COMMAND_FAILURES_TOTAL.clone());
    register(registry, COMMAND_DURATION.clone());
    register(registry, EVENTS_TOTAL.clone());
    register(registry, PAGES_OPENED_TOTAL.clone());
}

pub fn record_command(method: &str, elapsed: Duration, ok: bool) {
    COMMANDS.fetch_add(1, Ordering::Relaxed);
    COMMANDS_TOTAL.with_label_values(&[method]).inc();
    COMMAND_DURATION
        .with_label_values(&[method])
        .observe(elapsed.as_secs_f64());
    if !ok {
        COMMAND_FAILURES.fetch_add(1, Ordering::Relaxed);
        COMMAND_FAILURES_TOTAL.with_label_values(&[method]).inc();
    }
}

pub fn record_event() {
    EVENTS.fetch_add(1, Ordering::Relaxed);
    EVENTS_TOTAL.inc();
}

pub fn record_page_opened() {
    PAGES_OPENED.fetch_add(1, Ordering::Relaxed);
    PAGES_OPENED_TOTAL.inc();
}

pub fn snapshot() -> AdapterMetricsSnapshot {
    AdapterMetricsSnapshot {
        commands: COMMANDS.load(Ordering::Relaxed),
        command_failures: COMMAND_FAILURES.load(Ordering::Relaxed),
        events: EVENTS.load(Ordering::Relaxed),
        pages_opened: PAGES_OPENED.load(Ordering::Relaxed),
    }
}
