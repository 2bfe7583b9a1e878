use action_replay::StepOutcome;
use webtest_core_types::Step;

/// Notifications a session publishes on its bus.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// The recorder appended a step
    StepRecorded(Step),
    ScriptStarted { total: usize },
    StepExecuted { outcome: StepOutcome, step: Step },
    /// Last event on the bus
    Closed,
}
