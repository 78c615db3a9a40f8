//! tally-server: durable counter over HTTP.
//!
//! - `GET|POST /api/counter`
//! - `/healthz`, `/readyz`, `/metrics`
//! - Configuration from the environment (see `config`)

use std::net::SocketAddr;

use tally_core::error::{Result, TallyError};

use tally_server::config::{self, ServiceConfig};
use tally_server::obs::trace;
use tally_server::{app_state::AppState, router};

#[tokio::main]
async fn main() {
    let cfg = config::load();
    let telemetry = trace::install(cfg.as_ref().ok().map(|c| &c.tracing));

    let res = match cfg {
        Ok(cfg) => run(cfg).await,
        Err(e) => Err(e),
    };
    telemetry.shutdown().await;

    if let Err(e) = res {
        tracing::error!(error = %e, "tally-server exited with error");
        std::process::exit(1);
    }
}

async fn run(cfg: ServiceConfig) -> Result<()> {
    let listen: SocketAddr = cfg
        .listen
        .parse()
        .map_err(|e| TallyError::BadConfig(format!("listen: {e}")))?;

    let state = AppState::bootstrap(cfg).await;
    let app = router::build_router(state.clone());

    tracing::info!(%listen, "tally-server starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| TallyError::Internal(format!("bind {listen}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .map_err(|e| TallyError::Internal(format!("server failed: {e}")))?;

    state.shutdown().await;
    tracing::info!("tally-server stopped");
    Ok(())
}

async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
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

    state.set_draining();
    tracing::info!("shutdown signal received, draining");
}
