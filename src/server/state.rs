use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::session::SessionRegistry;

#[derive(Clone)]
pub struct ServeState {
    pub(crate) sessions: Arc<SessionRegistry>,
    pub(crate) frontend_url: String,
    pub(crate) started_at: DateTime<Utc>,
}

impl ServeState {
    pub fn new(sessions: Arc<SessionRegistry>, frontend_url: impl Into<String>) -> Self {
        Self {
            sessions,
            frontend_url: frontend_url.into(),
            started_at: Utc::now(),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }
}
