//! Configuration management module
//!
//! The YAML file is optional; every field has a default and the `WEBTEST_*`
//! environment variables override whatever the file says.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use action_recorder::CaptureOptions;
use action_replay::ReplayOptions;
use cdp_adapter::{CdpConfig, Viewport};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const PORT_ENV: &str = "WEBTEST_PORT";
pub const FRONTEND_URL_ENV: &str = "WEBTEST_FRONTEND_URL";
pub const HEADLESS_ENV: &str = "WEBTEST_HEADLESS";
pub const CHROME_ENV: &str = "WEBTEST_CHROME";
pub const WS_URL_ENV: &str = "WEBTEST_WS_URL";
pub const SCRIPTS_DIR_ENV: &str = "WEBTEST_SCRIPTS_DIR";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub browser: BrowserConfig,
    pub recording: RecordingConfig,
    pub replay: ReplayConfig,
    pub scripts_dir: ScriptsDir,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origin allowed by CORS
    pub frontend_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            frontend_url: "http://localhost:3002".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub executable: Option<PathBuf>,
    /// Attach to an already running browser instead of launching one
    pub ws_url: Option<String>,
    pub viewport: Viewport,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            ws_url: None,
            viewport: Viewport::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub poll_interval_ms: u64,
    pub debounce_ms: u64,
    pub buffer_capacity: usize,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            debounce_ms: 500,
            buffer_capacity: 1000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub action_timeout_ms: u64,
    pub navigate_timeout_ms: u64,
    pub default_wait_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            action_timeout_ms: 5_000,
            navigate_timeout_ms: 30_000,
            default_wait_ms: 1_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptsDir(pub PathBuf);

impl Default for ScriptsDir {
    fn default() -> Self {
        Self(PathBuf::from("./scripts"))
    }
}

impl Config {
    /// Applies the `WEBTEST_*` environment overrides in place.
    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = env_value(PORT_ENV) {
            match port.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(err) => warn!(?err, value = %port, "ignoring invalid {PORT_ENV}"),
            }
        }
        if let Some(url) = env_value(FRONTEND_URL_ENV) {
            self.server.frontend_url = url;
        }
        if let Some(flag) = env_value(HEADLESS_ENV) {
            match parse_flag(&flag) {
                Some(headless) => self.browser.headless = headless,
                None => warn!(value = %flag, "ignoring invalid {HEADLESS_ENV}"),
            }
        }
        if let Some(chrome) = env_value(CHROME_ENV) {
            self.browser.executable = Some(PathBuf::from(chrome));
        }
        if let Some(ws) = env_value(WS_URL_ENV) {
            self.browser.ws_url = Some(ws);
        }
        if let Some(dir) = env_value(SCRIPTS_DIR_ENV) {
            self.scripts_dir = ScriptsDir(PathBuf::from(dir));
        }
    }

    pub fn scripts_dir(&self) -> &PathBuf {
        &self.scripts_dir.0
    }

    pub fn cdp_config(&self) -> CdpConfig {
        let mut cfg = CdpConfig {
            headless: self.browser.headless,
            websocket_url: self.browser.ws_url.clone(),
            viewport: self.browser.viewport,
            default_deadline_ms: self.replay.navigate_timeout_ms,
            ..CdpConfig::default()
        };
        if let Some(executable) = &self.browser.executable {
            cfg.executable = executable.clone();
        }
        cfg
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            debounce_ms: self.recording.debounce_ms,
            capacity: self.recording.buffer_capacity.max(1),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.recording.poll_interval_ms.max(1))
    }

    pub fn replay_options(&self) -> ReplayOptions {
        ReplayOptions {
            action_timeout: Duration::from_millis(self.replay.action_timeout_ms),
            navigate_timeout: Duration::from_millis(self.replay.navigate_timeout_ms),
            default_wait: Duration::from_millis(self.replay.default_wait_ms),
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
