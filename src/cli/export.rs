use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::cli::context::CliContext;
use crate::export::{export, ExportFormat};

#[derive(Args, Clone, Debug)]
pub struct ExportArgs {
    /// Saved script name, or path to a script file
    pub script: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = ExportFormat::Script)]
    pub format: ExportFormat,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub async fn cmd_export(args: ExportArgs, ctx: &CliContext) -> Result<()> {
    let document = ctx.load_script(&args.script).await?;
    let body = export(&document, args.format)?;
    match &args.output {
        Some(path) => {
            tokio::fs::write(path, body)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(format = %args.format, path = %path.display(), "script exported");
        }
        None => print!("{body}"),
    }
    Ok(())
}

pub async fn cmd_scripts(ctx: &CliContext) -> Result<()> {
    let storage = ctx.storage();
    let scripts = storage.list().await?;
    if scripts.is_empty() {
        println!("No scripts in {}", storage.dir().display());
        return Ok(());
    }
    for script in scripts {
        println!(
            "{:<32} {:>4} steps  {}  {}",
            script.name,
            script.steps,
            script.created_at.format("%Y-%m-%d %H:%M"),
            script.path.display()
        );
    }
    Ok(())
}
