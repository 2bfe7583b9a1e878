use std::sync::Arc;

use cdp_adapter::AutomationSurface;
use dashmap::DashMap;
use futures::future::join_all;
use tracing::info;
use webtest_core_types::SessionId;

use super::session::{normalize_url, Session, SessionSettings, SessionSummary};
use crate::errors::SessionError;
use crate::metrics;

/// Live sessions by id. Every session gets its own page of one surface.
pub struct SessionRegistry {
    surface: Arc<dyn AutomationSurface>,
    settings: SessionSettings,
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new(surface: Arc<dyn AutomationSurface>, settings: SessionSettings) -> Self {
        Self {
            surface,
            settings,
            sessions: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub async fn create(&self, base_url: Option<&str>) -> Result<Arc<Session>, SessionError> {
        let url = normalize_url(base_url.unwrap_or_default())?;
        info!(target: "session", url = %url, "creating session");
        let session = Arc::new(Session::open(self.surface.clone(), url, self.settings).await?);
        self.sessions
            .insert(session.id().clone(), Arc::clone(&session));
        metrics::set_active_sessions(self.sessions.len());
        info!(target: "session", session = %session.id(), "session created");
        Ok(session)
    }

    pub fn get(&self, id: &SessionId) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SessionError::NotFound(id.clone()))
    }

    /// Newest first.
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut sessions: Vec<SessionSummary> = self
            .sessions
            .iter()
            .map(|entry| entry.value().summary())
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub async fn close(&self, id: &SessionId) -> Result<(), SessionError> {
        let (_, session) = self
            .sessions
            .remove(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        metrics::set_active_sessions(self.sessions.len());
        session.close().await;
        Ok(())
    }

    pub async fn close_all(&self) {
        let ids: Vec<SessionId> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        let closing = ids.iter().map(|id| async move {
            // a concurrent close may have won
            let _ = self.close(id).await;
        });
        join_all(closing).await;
        info!(target: "session", count = ids.len(), "closed all sessions");
    }
}
