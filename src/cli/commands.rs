use clap::Subcommand;

use super::export::ExportArgs;
use super::record::RecordArgs;
use super::replay::ReplayArgs;
use super::serve::ServeArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the HTTP and WebSocket server for the recorder frontend
    Serve(ServeArgs),

    /// Record interactions on a page into a script
    Record(RecordArgs),

    /// Replay a saved script
    Replay(ReplayArgs),

    /// Export a saved script as JSON, HTML or a Playwright test
    Export(ExportArgs),

    /// List saved scripts
    Scripts,
}
