use anyhow::{bail, Result};
use clap::Args;
use tracing::{error, info};
use webtest_event_bus::to_mpsc;

use crate::cli::context::{launch_browser, CliContext};
use crate::cli::record::describe;
use crate::errors::SessionError;
use crate::session::{SessionEvent, SessionRegistry, SessionSettings};

#[derive(Args, Clone, Debug)]
pub struct ReplayArgs {
    /// Saved script name, or path to a script file
    pub script: String,

    /// Open this URL instead of the script's base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn cmd_replay(args: ReplayArgs, ctx: &CliContext) -> Result<()> {
    let document = ctx.load_script(&args.script).await?;
    let base_url = args
        .base_url
        .clone()
        .unwrap_or_else(|| document.base_url.clone());

    let mut config = ctx.config().clone();
    if args.headful {
        config.browser.headless = false;
    }
    let adapter = launch_browser(&config).await?;
    let sessions = SessionRegistry::new(adapter.clone(), SessionSettings::from(&config));

    let result = async {
        let session = sessions.create(Some(base_url.as_str())).await?;
        let mut events = to_mpsc(session.events(), 64);
        let printer = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    SessionEvent::StepExecuted { outcome, step } => {
                        let mark = if outcome.success { "ok " } else { "ERR" };
                        println!("  [{mark}] {} ({} ms)", describe(&step), outcome.duration_ms);
                    }
                    SessionEvent::Closed => break,
                    _ => {}
                }
            }
        });

        info!(script = %document.name, steps = document.steps.len(), "replaying");
        println!("Replaying {} ({} steps)", document.name, document.steps.len());
        let outcome = session.run(Some(document.steps.clone())).await;
        session.close().await;
        let _ = printer.await;

        match outcome {
            Ok(report) => {
                if args.json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!(
                        "Passed: {} steps in {} ms",
                        report.steps.len(),
                        report.duration_ms
                    );
                }
                anyhow::Ok(())
            }
            Err(SessionError::StepFailed {
                step_id, message, ..
            }) => {
                error!(step = %step_id, %message, "replay failed");
                bail!("step {step_id} failed: {message}")
            }
            Err(err) => Err(err.into()),
        }
    }
    .await;

    sessions.close_all().await;
    adapter.shutdown().await;
    result
}
