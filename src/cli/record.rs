use std::path::PathBuf;
use std::time::Duration;

use action_replay::best_selector;
use anyhow::{Context, Result};
use clap::Args;
use tokio::signal;
use tracing::info;
use webtest_core_types::Step;
use webtest_event_bus::to_mpsc;

use crate::cli::context::{launch_browser, CliContext};
use crate::export::{export, ExportFormat, ScriptDocument};
use crate::session::{SessionEvent, SessionRegistry, SessionSettings};

#[derive(Args, Clone, Debug)]
pub struct RecordArgs {
    /// Page to open before recording starts
    pub url: String,

    /// Script name (default: the session id)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    pub duration: Option<u64>,

    /// Write the script to this file instead of the scripts directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,
}

pub async fn cmd_record(args: RecordArgs, ctx: &CliContext) -> Result<()> {
    let mut config = ctx.config().clone();
    if args.headful {
        config.browser.headless = false;
    }
    let adapter = launch_browser(&config).await?;
    let sessions = SessionRegistry::new(adapter.clone(), SessionSettings::from(&config));

    let result = async {
        let session = sessions.create(Some(args.url.as_str())).await?;
        let mut events = to_mpsc(session.events(), 64);
        session.start_recording().await?;
        println!("Recording {} (Ctrl-C to stop)", session.base_url());

        let limit = async {
            match args.duration {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(limit);
        loop {
            tokio::select! {
                _ = signal::ctrl_c() => break,
                _ = &mut limit => break,
                event = events.recv() => match event {
                    Some(SessionEvent::StepRecorded(step)) => {
                        println!("  {:>3}. {}", session.summary().step_count, describe(&step));
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }

        session.stop_recording().await?;
        let document = ScriptDocument::from_session(&session, args.name.clone());
        let path = match &args.output {
            Some(path) => {
                let body = export(&document, ExportFormat::Json)?;
                tokio::fs::write(path, body)
                    .await
                    .with_context(|| format!("failed to write {}", path.display()))?;
                path.clone()
            }
            None => ctx.storage().save(&document).await?,
        };
        info!(steps = document.steps.len(), path = %path.display(), "script saved");
        println!("Saved {} steps to {}", document.steps.len(), path.display());
        anyhow::Ok(())
    }
    .await;

    sessions.close_all().await;
    adapter.shutdown().await;
    result
}

/// One-line rendering of a step for terminal output.
pub(crate) fn describe(step: &Step) -> String {
    let selector = step
        .target()
        .map(|info| best_selector(&info.candidates).to_string());
    match (step.url(), selector, step.value()) {
        (Some(url), _, _) => format!("{} {url}", step.kind()),
        (None, Some(selector), Some(value)) => {
            format!("{} {selector} = {value:?}", step.kind())
        }
        (None, Some(selector), None) => format!("{} {selector}", step.kind()),
        (None, None, Some(value)) => format!("{} {value}", step.kind()),
        (None, None, None) => step.kind().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_steps_for_the_terminal() {
        assert_eq!(
            describe(&Step::navigate("https://example.com")),
            "navigate https://example.com"
        );
        assert_eq!(describe(&Step::wait_for(250)), "waitFor 250");
        assert_eq!(describe(&Step::comment("checkout")), "comment checkout");
    }
}
