use anyhow::{anyhow, Result};
use chromiumoxide::async_process::Child;
use futures::io::{AsyncBufReadExt, BufReader};
use futures::stream::StreamExt;
use tokio::time::{timeout, Duration};

const WS_URL_WAIT: Duration = Duration::from_secs(20);

/// Reads Chromium's stderr until it announces its DevTools endpoint.
pub async fn extract_ws_url(child: &mut Child) -> Result<String> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("chromium started without a stderr pipe"))?;
    let mut lines = BufReader::new(stderr).lines();
    let mut preview = Vec::new();

    let scan = async {
        while let Some(line) = lines.next().await {
            let line = line?;
            if let Some(url) = parse_devtools_line(&line) {
                return Ok(url);
            }
            if preview.len() < 8 {
                preview.push(line);
            }
        }
        Err(anyhow!(
            "chromium exited before announcing its devtools endpoint: {}",
            preview.join(" | ")
        ))
    };

    timeout(WS_URL_WAIT, scan)
        .await
        .map_err(|_| anyhow!("timed out waiting for the devtools endpoint"))?
}

/// `DevTools listening on ws://...` → the websocket url.
pub fn parse_devtools_line(line: &str) -> Option<String> {
    let (_, url) = line.rsplit_once("listening on ")?;
    let url = url.trim();
    (url.starts_with("ws") && url.contains("devtools/browser")).then(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_devtools_banner() {
        let line = "DevTools listening on ws://127.0.0.1:9222/devtools/browser/abc";
        assert_eq!(
            parse_devtools_line(line).as_deref(),
            Some("ws://127.0.0.1:9222/devtools/browser/abc")
        );
        assert_eq!(parse_devtools_line("[WARNING] something else"), None);
    }
}
