//! webtest library
//!
//! Records browser interactions into editable step scripts and replays them
//! over the Chrome DevTools Protocol. Exposes modules for integration testing.

pub mod cli;
pub mod config;
pub mod errors;
pub mod export;
pub mod metrics;
pub mod server;
pub mod session;
pub mod storage;

// Re-export commonly used types for external use
pub use config::Config;
pub use errors::SessionError;
pub use export::{ExportFormat, ScriptDocument};
pub use server::{build_router, ServeState};
pub use session::{Session, SessionEvent, SessionRegistry, SessionSettings, SessionState};
pub use storage::ScriptStorage;
