//! Chromium DevTools Protocol automation surface.
//!
//! [`CdpAdapter`] drives a real Chromium over CDP and implements
//! [`AutomationSurface`], the capability set the recorder and replay crates are
//! written against. With the `fake` feature the crate also ships
//! [`fake::FakeSurface`], an in-memory page model used by tests.

use std::{env, path::PathBuf};

use which::which;

pub mod adapter;
pub mod config;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod selector;
pub mod surface;
pub mod transport;
pub mod util;

#[cfg(any(test, feature = "fake"))]
pub mod fake;

pub mod ids {
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    /// Adapter-local handle for a browser page.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
    pub struct PageId(pub Uuid);

    impl PageId {
        pub fn new() -> Self {
            Self(Uuid::new_v4())
        }
    }

    impl Default for PageId {
        fn default() -> Self {
            Self::new()
        }
    }

    impl std::fmt::Display for PageId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }
}

pub use adapter::CdpAdapter;
pub use config::{CdpConfig, Viewport};
pub use error::{AdapterError, AdapterErrorKind};
pub use ids::PageId;
pub use surface::{AutomationSurface, RawElement, ELEMENT_NODE};
pub use transport::{CdpTransport, ChromiumTransport, CommandTarget, TransportEvent};

/// Locates a Chrome/Chromium binary: `WEBTEST_CHROME`, then `PATH`, then the
/// usual install locations (skipped when `WEBTEST_SKIP_OS_PATHS` is set).
pub fn detect_chrome_executable() -> Option<PathBuf> {
    if let Ok(raw) = env::var("WEBTEST_CHROME") {
        let candidate = PathBuf::from(raw.trim());
        if !raw.trim().is_empty() && candidate.exists() {
            return Some(candidate);
        }
    }

    if let Some(found) = chrome_executable_names()
        .iter()
        .find_map(|name| which(name).ok())
    {
        return Some(found);
    }

    let skip_os_paths = env::var("WEBTEST_SKIP_OS_PATHS")
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false);
    if skip_os_paths {
        return None;
    }
    os_specific_chrome_paths()
        .into_iter()
        .find(|candidate| candidate.exists())
}

fn chrome_executable_names() -> &'static [&'static str] {
    #[cfg(target_os = "windows")]
    {
        &["chrome.exe", "chromium.exe", "msedge.exe"]
    }

    #[cfg(not(target_os = "windows"))]
    {
        &[
            "google-chrome-stable",
            "google-chrome",
            "chromium",
            "chromium-browser",
        ]
    }
}

fn os_specific_chrome_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"]
            .iter()
            .filter_map(|key| env::var(key).ok())
            .filter(|root| !root.trim().is_empty())
            .flat_map(|root| {
                let root = PathBuf::from(root.trim());
                [
                    root.join("Google/Chrome/Application/chrome.exe"),
                    root.join("Chromium/Application/chrome.exe"),
                    root.join("Microsoft/Edge/Application/msedge.exe"),
                ]
            })
            .collect()
    }

    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
        ]
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        vec![
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/usr/bin/chromium"),
        ]
    }
}

/// `WEBTEST_USE_REAL_CHROME` opt-in used by the browser-backed test suites.
pub fn real_chrome_requested() -> bool {
    matches!(
        env::var("WEBTEST_USE_REAL_CHROME")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str(),
        "1" | "true" | "yes" | "on"
    )
}
