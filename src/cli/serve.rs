use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Args;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::cli::context::CliContext;
use crate::server::{build_router, ServeState};

#[derive(Args, Clone)]
pub struct ServeArgs {
    /// Listen address, overriding `server.bind`
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,

    /// Resync every configured account before accepting requests
    #[arg(long)]
    pub warm: bool,
}

pub async fn cmd_serve(args: ServeArgs, ctx: &CliContext) -> Result<()> {
    let service = ctx.service().await?;

    if args.warm {
        let targets = service.configured_targets();
        let op = quota_lock::OpContext::new();
        match service.manager().sync(&op, &targets).await {
            Ok(()) => info!(targets = targets.len(), "accounting cache warmed"),
            Err(err) => warn!(error = ?err.as_obj().to_audit(), "cache warm-up incomplete"),
        }
    }

    let addr = match args.bind {
        Some(addr) => addr,
        None => ctx
            .config()
            .server
            .bind
            .parse()
            .with_context(|| format!("invalid server.bind '{}'", ctx.config().server.bind))?,
    };
    let router = build_router(ServeState::new(service));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind quota server on {}", addr))?;
    info!("Forced-sync endpoint available at http://{}/v1/quota/sync", addr);

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("quota server exited unexpectedly")?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to listen for ctrl-c; serving until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
