use crate::detect_chrome_executable;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Configuration for launching and tuning the adapter.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CdpConfig {
    pub executable: PathBuf,
    pub user_data_dir: PathBuf,
    pub headless: bool,
    pub default_deadline_ms: u64,
    pub websocket_url: Option<String>,
    pub heartbeat_interval_ms: u64,
    pub viewport: Viewport,
    pub disable_sandbox: bool,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            executable: detect_chrome_executable().unwrap_or_default(),
            user_data_dir: default_profile_dir(),
            headless: true,
            default_deadline_ms: 30_000,
            websocket_url: None,
            heartbeat_interval_ms: 15_000,
            viewport: Viewport::default(),
            disable_sandbox: false,
        }
    }
}

fn default_profile_dir() -> PathBuf {
    Path::new("./.webtest-profile").into()
}
