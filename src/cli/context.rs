use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use cdp_adapter::CdpAdapter;
use tracing::info;

use crate::config::Config;
use crate::export::ScriptDocument;
use crate::storage::{read_document, ScriptStorage};

pub struct CliContext {
    config: Arc<Config>,
    config_path: Option<PathBuf>,
}

impl CliContext {
    pub fn new(config: Config, config_path: Option<PathBuf>) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
        }
    }

    pub fn config(&self) -> &Config {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn storage(&self) -> ScriptStorage {
        ScriptStorage::new(self.config.scripts_dir())
    }

    /// Resolves a script reference: an existing file path, else a saved name.
    pub async fn load_script(&self, reference: &str) -> Result<ScriptDocument> {
        let path = Path::new(reference);
        let document = if path.is_file() {
            read_document(path).await?
        } else {
            self.storage().load(reference).await?
        };
        Ok(document)
    }
}

/// Starts Chromium (or attaches to `browser.ws_url`) for one command.
pub async fn launch_browser(config: &Config) -> Result<Arc<CdpAdapter>> {
    let cdp = config.cdp_config();
    info!(
        headless = cdp.headless,
        attach = cdp.websocket_url.is_some(),
        "starting browser"
    );
    CdpAdapter::launch(cdp)
        .await
        .context("failed to start the browser; set WEBTEST_CHROME or browser.executable")
}
