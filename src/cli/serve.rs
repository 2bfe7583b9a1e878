use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::cli::context::{launch_browser, CliContext};
use crate::server::{build_router, ServeState};
use crate::session::{SessionRegistry, SessionSettings};

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Port to listen on (default: server.port, 3001)
    #[arg(long)]
    pub port: Option<u16>,

    /// Interface to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Attach to an existing Chrome DevTools websocket instead of launching one
    #[arg(long)]
    pub ws_url: Option<String>,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// Origin allowed to call the API
    #[arg(long)]
    pub frontend_url: Option<String>,
}

pub async fn cmd_serve(args: ServeArgs, ctx: &CliContext) -> Result<()> {
    let mut config = ctx.config().clone();
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(ws_url) = args.ws_url {
        config.browser.ws_url = Some(ws_url);
    }
    if let Some(origin) = args.frontend_url {
        config.server.frontend_url = origin;
    }
    if args.headful {
        config.browser.headless = false;
    }

    let adapter = launch_browser(&config).await?;
    let sessions = Arc::new(SessionRegistry::new(
        adapter.clone(),
        SessionSettings::from(&config),
    ));
    let state = ServeState::new(sessions.clone(), config.server.frontend_url.clone());
    let router = build_router(state);

    let bind = (config.server.host.as_str(), config.server.port);
    let listener = TcpListener::bind(bind).await.with_context(|| {
        format!(
            "failed to bind server on {}:{}",
            config.server.host, config.server.port
        )
    })?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        frontend = %config.server.frontend_url,
        "Server listening; WebSocket at /ws"
    );

    let served = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error");

    info!(sessions = sessions.len(), "closing sessions");
    sessions.close_all().await;
    adapter.shutdown().await;
    served
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to listen for ctrl-c");
        return;
    }
    info!("shutdown requested");
}
