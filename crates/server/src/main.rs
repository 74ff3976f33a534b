use anyhow::Result;
use axum::serve;
use clap::Parser;
use rustls::crypto::{ring::default_provider, CryptoProvider};
use server::{create_app, AppState, CoreServices};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::{signal, sync::broadcast};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use walletgate_core::{backend::BackendRegistry, config::AppConfig, metrics::MetricsCollector};

#[derive(Parser, Debug)]
#[command(name = "walletgate", about = "JSON-RPC proxy for wallet SDK daemons")]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "WALLETGATE_CONFIG", default_value = "config/config.toml")]
    config: PathBuf,
}

/// Initializes the logging system based on the configuration.
///
/// `RUST_LOG` wins over `logging.level` when set.
fn init_logging(config: &AppConfig) {
    let level = config.logging.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,walletgate_core={level},server={level},audit=info,errors=info"
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    CryptoProvider::install_default(default_provider())
        .map_err(|e| anyhow::anyhow!("Failed to install crypto provider: {e:?}"))?;

    let args = Args::parse();
    let config = AppConfig::from_file(&args.config)
        .map_err(|e| anyhow::anyhow!("Configuration could not be loaded: {e}"))?;
    config.validate().map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;

    init_logging(&config);
    info!("Starting walletgate");
    debug!(
        backends_count = config.backends.servers.len(),
        hooks = ?config.hooks.enabled,
        cache_enabled = config.cache.enabled,
        bind_port = config.server.bind_port,
        "Configuration loaded"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let services = CoreServices::build(&config)?;
    let background = services.start_background_tasks(&config, &shutdown_tx);
    let reload_handle = tokio::spawn(reload_backends_on_sighup(
        args.config.clone(),
        Arc::clone(&services.registry),
        services.metrics.clone(),
        shutdown_tx.subscribe(),
    ));

    let state = AppState::new(
        Arc::clone(&services.service),
        &config.auth.token_header,
        config.server.max_body_bytes,
    );
    let app = create_app(state, &config.server);

    let addr = config.socket_addr().map_err(|e| anyhow::anyhow!(e))?;
    info!(address = %addr, "RPC server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    if let Err(e) = serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error occurred");
    }

    let _ = shutdown_tx.send(());
    for handle in background {
        let _ = handle.await;
    }
    reload_handle.abort();
    info!("Server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, draining in-flight requests");
}

/// Re-reads the backend list on SIGHUP and swaps it in. Other settings need a restart.
#[cfg(unix)]
async fn reload_backends_on_sighup(
    config_path: PathBuf,
    registry: Arc<BackendRegistry>,
    metrics: Option<MetricsCollector>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "SIGHUP handler unavailable, backend reload disabled");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = hangup.recv() => {
                let reloaded = AppConfig::from_file(&config_path)
                    .map_err(|e| e.to_string())
                    .and_then(|config| config.validate().map(|()| config));
                match reloaded {
                    Ok(config) => {
                        registry.replace_backends(config.backends.servers);
                        if let Some(metrics) = &metrics {
                            metrics.record_backend_count(registry.len());
                        }
                        info!(backends = registry.len(), "backend list reloaded");
                    }
                    Err(e) => warn!(error = %e, "backend reload rejected, keeping current list"),
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn reload_backends_on_sighup(
    _config_path: PathBuf,
    _registry: Arc<BackendRegistry>,
    _metrics: Option<MetricsCollector>,
    _shutdown_rx: broadcast::Receiver<()>,
) {
}
