//! Pages opened by the adapter and the CDP targets behind them.

use dashmap::DashMap;

use crate::ids::PageId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageTarget {
    pub target_id: String,
    pub cdp_session: String,
    pub recent_url: Option<String>,
}

#[derive(Default)]
pub struct PageRegistry {
    pages: DashMap<PageId, PageTarget>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, page: PageId, target_id: String, cdp_session: String) {
        self.pages.insert(
            page,
            PageTarget {
                target_id,
                cdp_session,
                recent_url: None,
            },
        );
    }

    pub fn remove(&self, page: &PageId) -> Option<PageTarget> {
        self.pages.remove(page).map(|(_, target)| target)
    }

    pub fn get(&self, page: &PageId) -> Option<PageTarget> {
        self.pages.get(page).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn clear(&self) {
        self.pages.clear();
    }

    pub fn page_for_session(&self, cdp_session: &str) -> Option<PageId> {
        self.pages
            .iter()
            .find(|entry| entry.cdp_session == cdp_session)
            .map(|entry| *entry.key())
    }

    pub fn page_for_target(&self, target_id: &str) -> Option<PageId> {
        self.pages
            .iter()
            .find(|entry| entry.target_id == target_id)
            .map(|entry| *entry.key())
    }

    pub fn set_recent_url(&self, page: &PageId, url: impl Into<String>) {
        if let Some(mut entry) = self.pages.get_mut(page) {
            entry.recent_url = Some(url.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_pages_by_session_and_target() {
        let registry = PageRegistry::new();
        let page = PageId::new();
        registry.insert(page, "target-1".into(), "session-1".into());
        registry.set_recent_url(&page, "https://example.com/");

        assert_eq!(registry.page_for_session("session-1"), Some(page));
        assert_eq!(registry.page_for_target("target-1"), Some(page));
        assert_eq!(
            registry.get(&page).and_then(|target| target.recent_url),
            Some("https://example.com/".to_string())
        );

        assert!(registry.remove(&page).is_some());
        assert!(registry.is_empty());
    }
}
