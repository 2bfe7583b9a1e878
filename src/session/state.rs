use serde::{Deserialize, Serialize};

use crate::errors::SessionError;

/// What a session is doing. Recording and Running exclude each other.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Recording,
    Running,
}

impl SessionState {
    pub fn start_recording(&mut self) -> Result<(), SessionError> {
        match self {
            SessionState::Idle => {
                *self = SessionState::Recording;
                Ok(())
            }
            SessionState::Recording => Err(SessionError::precondition("already recording")),
            SessionState::Running => Err(SessionError::precondition(
                "cannot record while a script is running",
            )),
        }
    }

    pub fn stop_recording(&mut self) -> Result<(), SessionError> {
        match self {
            SessionState::Recording => {
                *self = SessionState::Idle;
                Ok(())
            }
            _ => Err(SessionError::precondition("not recording")),
        }
    }

    pub fn start_run(&mut self) -> Result<(), SessionError> {
        match self {
            SessionState::Idle => {
                *self = SessionState::Running;
                Ok(())
            }
            SessionState::Recording => Err(SessionError::precondition(
                "cannot run a script while recording",
            )),
            SessionState::Running => Err(SessionError::precondition("a script is already running")),
        }
    }

    /// Back to Idle after a run, whatever its outcome.
    pub fn finish_run(&mut self) {
        if *self == SessionState::Running {
            *self = SessionState::Idle;
        }
    }

    pub fn is_recording(&self) -> bool {
        *self == SessionState::Recording
    }

    pub fn is_running(&self) -> bool {
        *self == SessionState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_and_running_exclude_each_other() {
        let mut state = SessionState::default();
        state.start_recording().unwrap();
        assert!(matches!(state.start_run(), Err(SessionError::Precondition(_))));
        assert!(state.is_recording());

        state.stop_recording().unwrap();
        state.start_run().unwrap();
        assert!(matches!(state.start_recording(), Err(SessionError::Precondition(_))));
        assert!(state.start_run().is_err());
        state.finish_run();
        assert_eq!(state, SessionState::Idle);
    }

    #[test]
    fn stopping_an_idle_session_is_rejected() {
        let mut state = SessionState::Idle;
        assert!(state.stop_recording().is_err());
        state.finish_run();
        assert_eq!(state, SessionState::Idle);
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SessionState::Recording).unwrap(),
            "\"recording\""
        );
    }
}
