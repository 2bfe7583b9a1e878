use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use super::commands::Commands;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable debug mode
    #[arg(short, long)]
    pub debug: bool,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Human)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Human,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportFormat;

    #[test]
    fn parses_global_flags_before_the_subcommand() {
        let cli = CliArgs::parse_from([
            "webtest",
            "--log-format",
            "json",
            "-d",
            "export",
            "login",
            "--format",
            "html",
        ]);
        assert!(cli.debug);
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Export(args) => {
                assert_eq!(args.script, "login");
                assert_eq!(args.format, ExportFormat::Html);
            }
            _ => panic!("expected export"),
        }
    }

    #[test]
    fn serve_defaults_come_from_config() {
        let cli = CliArgs::parse_from(["webtest", "serve"]);
        match cli.command {
            Commands::Serve(args) => {
                assert!(args.port.is_none());
                assert!(!args.headful);
            }
            _ => panic!("expected serve"),
        }
    }
}
