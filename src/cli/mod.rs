mod app;
mod commands;
mod context;
mod dispatch;
mod env;
mod export;
mod record;
mod replay;
mod runtime;
mod serve;

pub use app::run;
pub use commands::Commands;
pub use env::{CliArgs, LogFormat};
pub use runtime::{init_logging, load_config, LoadedConfig};
