use super::env::CliArgs;
use super::export::{cmd_export, cmd_scripts};
use super::record::cmd_record;
use super::replay::cmd_replay;
use super::serve::cmd_serve;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Serve(args) => cmd_serve(args, ctx).await,
        Commands::Record(args) => cmd_record(args, ctx).await,
        Commands::Replay(args) => cmd_replay(args, ctx).await,
        Commands::Export(args) => cmd_export(args, ctx).await,
        Commands::Scripts => cmd_scripts(ctx).await,
    }
}
