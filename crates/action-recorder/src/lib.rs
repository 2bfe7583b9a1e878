//! Interaction recording
//!
//! [`capture`] buffers clicks and debounced text input, inside the page and
//! on the host. [`poller`] drains those buffers on a fixed cadence and turns
//! every event with a usable target into a step.

pub mod capture;
pub mod errors;
pub mod metrics;
pub mod poller;

pub use capture::{
    capture_script, CaptureOptions, CaptureSource, DrainBatch, EventCapture, PageCapture,
};
pub use errors::RecorderError;
pub use poller::{HostPoller, PollContext, StepSink, TickSummary, DEFAULT_POLL_INTERVAL};
