//! Host poller
//!
//! One task per recording session. On every tick it checks the page URL,
//! drains the capture sources and turns each drained event into a step. Ticks
//! run on a single task with [`MissedTickBehavior::Delay`], so a slow tick
//! pushes the next one back instead of overlapping it.

use std::sync::Arc;
use std::time::Duration;

use action_locator::SelectorSynthesizer;
use cdp_adapter::{AutomationSurface, PageId};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webtest_core_types::{CaptureKind, CapturedEvent, CoreError, Step};

use crate::capture::CaptureSource;
use crate::errors::RecorderError;
use crate::metrics;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Where recorded steps go.
pub trait StepSink: Send + Sync {
    /// Appends `step` and returns it as stored.
    fn append(&self, step: Step) -> Result<Step, CoreError>;

    /// Called whenever the poller observes a new page URL.
    fn url_observed(&self, _url: &str) {}
}

/// Everything a recording loop needs.
pub struct PollContext {
    pub surface: Arc<dyn AutomationSurface>,
    pub page: PageId,
    pub sources: Vec<Arc<dyn CaptureSource>>,
    pub synthesizer: Arc<SelectorSynthesizer>,
    pub sink: Arc<dyn StepSink>,
    /// Held for the whole tick body; other page operations take it too.
    pub page_lock: Arc<AsyncMutex<()>>,
}

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub drained: usize,
    pub recorded: usize,
    pub dropped: usize,
    pub navigated: bool,
}

struct PollLoop {
    ctx: PollContext,
    last_url: Option<String>,
}

impl PollLoop {
    async fn tick(&mut self) -> Result<TickSummary, RecorderError> {
        let _guard = self.ctx.page_lock.lock().await;
        metrics::record_tick();
        let mut summary = TickSummary::default();

        let url = self.ctx.surface.current_url(self.ctx.page).await?;
        if self.last_url.as_deref() != Some(url.as_str()) {
            if self.last_url.is_some() {
                let step = self.ctx.sink.append(Step::navigate(url.clone()))?;
                metrics::record_step(step.kind().as_str());
                info!(target: "recorder", step = %step.id, %url, "recorded navigation");
                summary.navigated = true;
                summary.recorded += 1;
                self.rearm().await;
            }
            self.ctx.sink.url_observed(&url);
            self.last_url = Some(url);
        }

        let events = self.drain_all().await?;
        summary.drained = events.len();
        for event in events {
            match self.record(&event).await {
                Ok(true) => summary.recorded += 1,
                Ok(false) => summary.dropped += 1,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(target: "recorder", error = %err, "failed to record captured event");
                    metrics::record_dropped("error", 1);
                    summary.dropped += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Drains every source and merges the records by capture time.
    async fn drain_all(&self) -> Result<Vec<CapturedEvent>, RecorderError> {
        let mut events = Vec::new();
        for source in &self.ctx.sources {
            let batch = source.drain().await?;
            if batch.overflow > 0 {
                warn!(
                    target: "recorder",
                    source = source.name(),
                    overflow = batch.overflow,
                    "capture queue overflowed"
                );
                metrics::record_dropped("overflow", batch.overflow);
            }
            events.extend(batch.events);
        }
        // stable, so same-millisecond records keep their source order
        events.sort_by_key(|event| event.timestamp);
        Ok(events)
    }

    /// Returns `Ok(false)` when the event has no usable target.
    async fn record(&self, event: &CapturedEvent) -> Result<bool, RecorderError> {
        let Some(info) = self
            .ctx
            .synthesizer
            .inspect(self.ctx.page, event.x, event.y)
            .await?
        else {
            debug!(
                target: "recorder",
                kind = ?event.kind,
                x = event.x,
                y = event.y,
                "no usable target; dropping event"
            );
            metrics::record_dropped("no_target", 1);
            return Ok(false);
        };

        let step = match event.kind {
            CaptureKind::Click => Step::click(info),
            CaptureKind::Input => Step::type_text(info, event.value.clone().unwrap_or_default()),
        };
        let step = self.ctx.sink.append(step)?;
        metrics::record_step(step.kind().as_str());
        info!(target: "recorder", step = %step.id, kind = %step.kind(), "recorded step");
        Ok(true)
    }

    async fn rearm(&self) {
        for source in &self.ctx.sources {
            if let Err(err) = source.arm().await {
                warn!(target: "recorder", source = source.name(), error = %err, "re-arming capture failed");
            }
        }
    }

    async fn disarm(&self) {
        for source in &self.ctx.sources {
            if let Err(err) = source.disarm().await {
                debug!(target: "recorder", source = source.name(), error = %err, "disarming capture failed");
            }
        }
    }
}

/// Handle to a running recording loop.
pub struct HostPoller {
    cancel: CancellationToken,
    handle: Option<JoinHandle<PollLoop>>,
}

impl HostPoller {
    /// Arms every source, discards anything buffered before now and starts
    /// ticking every `period`.
    pub async fn start(ctx: PollContext, period: Duration) -> Result<Self, RecorderError> {
        let mut poll = PollLoop {
            ctx,
            last_url: None,
        };
        {
            let _guard = poll.ctx.page_lock.lock().await;
            for source in &poll.ctx.sources {
                source.arm().await?;
                let stale = source.drain().await?;
                if !stale.events.is_empty() {
                    debug!(
                        target: "recorder",
                        source = source.name(),
                        discarded = stale.events.len(),
                        "discarding records buffered before recording started"
                    );
                }
            }
            let url = poll.ctx.surface.current_url(poll.ctx.page).await?;
            poll.ctx.sink.url_observed(&url);
            poll.last_url = Some(url);
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let period = period.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if token.is_cancelled() {
                    break;
                }
                match poll.tick().await {
                    Ok(summary) if summary != TickSummary::default() => {
                        debug!(target: "recorder", ?summary, "poll tick");
                    }
                    Ok(_) => {}
                    Err(err) if err.is_fatal() => {
                        warn!(target: "recorder", error = %err, "page went away; recording loop exits");
                        break;
                    }
                    Err(err) => {
                        warn!(target: "recorder", error = %err, "poll tick failed");
                    }
                }
            }
            poll
        });
        info!(target: "recorder", period_ms = period.as_millis() as u64, "recording loop started");

        Ok(Self {
            cancel,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Cancels the loop, lets an in-flight tick finish appending, then
    /// disarms the sources.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        let Some(handle) = self.handle.take() else {
            return;
        };
        match handle.await {
            Ok(poll) => {
                let _guard = poll.ctx.page_lock.lock().await;
                poll.disarm().await;
            }
            Err(err) => warn!(target: "recorder", error = %err, "recording loop panicked"),
        }
        info!(target: "recorder", "recording loop stopped");
    }
}

impl Drop for HostPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
