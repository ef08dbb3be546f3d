use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app_context::AppContext;
use crate::server::{build_router, ServeState};

use super::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Address to listen on (overrides `server.bind`)
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,
}

pub async fn cmd_serve(args: ServeArgs, ctx: &CliContext) -> Result<()> {
    let mut config = ctx.config().as_ref().clone();
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    let addr = config.bind_addr().context("Invalid bind address")?;
    let grace = config.shutdown_grace().context("Invalid shutdown grace")?;

    let app = Arc::new(AppContext::new(config)?);
    let state = ServeState::new(app.clone());
    let router = build_router(state.clone());

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "docgate listening");
    state.mark_live();
    state.mark_ready();

    let shutdown = CancellationToken::new();
    if app.config().acl.reload_on_sighup && app.acl_path().is_some() {
        spawn_acl_reload(state.clone(), shutdown.clone())?;
    }

    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.clone().cancelled_owned());
    let mut server = tokio::spawn(async move { server.await });

    tokio::select! {
        joined = &mut server => {
            return joined
                .context("server task panicked")?
                .context("server exited unexpectedly");
        }
        _ = shutdown_signal() => {
            info!(grace = %humantime::format_duration(grace), "shutdown requested, draining connections");
            state.mark_unready("shutting down");
            shutdown.cancel();
        }
    }

    drain(server, grace).await
}

async fn drain(
    server: tokio::task::JoinHandle<std::io::Result<()>>,
    grace: Duration,
) -> Result<()> {
    match tokio::time::timeout(grace, server).await {
        Ok(joined) => {
            joined
                .context("server task panicked")?
                .context("server exited with an error")?;
            info!("server stopped");
        }
        Err(_) => warn!("grace period elapsed; dropping open connections"),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(?err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(?err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// SIGHUP recompiles the ACL file. A failed reload keeps serving the
/// previous rules.
#[cfg(unix)]
fn spawn_acl_reload(state: ServeState, shutdown: CancellationToken) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    match state.app.reload_acl() {
                        Ok(rules) => {
                            info!(rules, "acl reloaded");
                            state.health.record_reload(rules);
                        }
                        Err(err) => {
                            warn!(error = %format!("{err:#}"), "acl reload failed; keeping previous rules");
                            state.health.record_error(format!("{err:#}"));
                        }
                    }
                }
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_acl_reload(_state: ServeState, _shutdown: CancellationToken) -> Result<()> {
    warn!("acl reload on SIGHUP is only available on unix");
    Ok(())
}
