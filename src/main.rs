use hook_relay::AppState;
use hook_relay::api::build_router;
use hook_relay::config::{DEFAULT_CONFIG_PATH, RelayConfig, load_config};
use hook_relay::dispatch::{DispatchContext, spawn_workers};
use hook_relay::error::Result;
use hook_relay::logging::setup_logging;
use hook_relay::notifier::Notifier;
use hook_relay::targets::TargetStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{self, error, info, warn};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let config_path =
        std::env::var("RELAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let mut config: RelayConfig = match load_config(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Ok(bind_address) = std::env::var("BIND_ADDRESS") {
        config.server.bind_address = bind_address;
    }

    // Guards flush the file writers on drop
    let _log_guards = match setup_logging(&config.logging) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("Logging setup error: {}", e);
            std::process::exit(1);
        }
    };
    info!("Using config at {:?}", config_path);

    if let Err(e) = run(config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: RelayConfig) -> Result<()> {
    let targets = TargetStore::from(config.targets);
    for keys in targets.ambiguous_keys() {
        warn!(
            "Build targets {:?} share environment, project and branch; only one of them will be used",
            keys
        );
    }
    for key in targets.unreachable_keys() {
        warn!("Build target '{}' has an environment no event maps to", key);
    }
    info!("Loaded {} build targets", targets.len());

    let notifier = Notifier::new(config.jenkins)?;
    let context = DispatchContext::new(targets, notifier);
    let (queue, pool) = spawn_workers(context.clone(), config.dispatch);

    let state = Arc::new(AppState::new(queue, Arc::clone(&context.targets)));
    let app = build_router(state, &config.server.notify_path);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!(
        "Listening on {}{}",
        config.server.bind_address, config.server.notify_path
    );
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped, draining dispatch queue");
    pool.drain().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
