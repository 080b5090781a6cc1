//! aclgate gateway daemon.
//!
//! - Boot: discover installed apps, load ACLs, publish policy, start apps
//! - Serve: admin requests on a Unix socket
//! - Shutdown (SIGINT/SIGTERM): stop apps, withdraw policy

use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aclgate_core::error::Result;
use aclgate_gateway::{
    app_state::{AppState, Collaborators},
    config,
    dispatch::AdminDispatcher,
    events, manifest,
    process::OsProcessControl,
    store::FsStore,
    transport::{admin, LocalTransport},
};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg_path = std::env::args().nth(1).unwrap_or_else(|| "aclgate.yaml".to_string());
    if let Err(e) = run(&cfg_path).await {
        tracing::error!(error = %e, "aclgate-gateway failed");
        std::process::exit(1);
    }
}

async fn run(cfg_path: &str) -> Result<()> {
    let cfg = config::load_from_file(cfg_path)?;
    let apps_dir = cfg.gateway.apps_dir.clone();
    let socket = cfg.gateway.admin_socket.clone();

    let (tx, rx) = events::channel();
    let collab = Collaborators {
        store: Arc::new(FsStore::new(&cfg.gateway.apps_dir, &cfg.gateway.policy_dir)),
        transport: Arc::new(LocalTransport::new(cfg.policy.reload_command.clone())),
        process: Arc::new(OsProcessControl::new(tx.clone())),
    };
    let state = AppState::new(cfg, collab, tx)?;
    let worker = events::spawn_worker(rx, state.clone());

    let installed = manifest::discover(Path::new(&apps_dir))?;
    let boot_state = state.clone();
    tokio::task::spawn_blocking(move || boot_state.boot(installed))
        .await
        .map_err(|e| aclgate_core::GatewayError::Internal(format!("boot task failed: {e}")))??;

    let listener = admin::bind(Path::new(&socket))?;
    tracing::info!(socket = %socket, "aclgate-gateway serving");
    admin::serve(listener, AdminDispatcher::new(state.clone()), shutdown_signal()).await;

    state.shutdown().await;
    state.events().wait_idle().await;
    worker.abort();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "failed to install signal handler");
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
    tracing::info!("signal received, starting graceful shutdown");
}
