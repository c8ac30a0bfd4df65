//! Binary entry point: load configuration, wire the application state,
//! bind the listener, and serve until a shutdown signal arrives.

use promptgate_app::config::Config;
use promptgate_app::events::TracingEventSink;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let toml_path = std::env::var("PROMPTGATE_CONFIG").ok();
    let config = match Config::load(toml_path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.listen_host, config.listen_port)
        .parse()
        .unwrap_or_else(|err| {
            tracing::error!(%err, "invalid listen_host/listen_port");
            std::process::exit(1);
        });

    let state = promptgate_app::build_state(config, Arc::new(TracingEventSink));
    let router = promptgate_app::build_router(state).into_make_service_with_connect_info::<SocketAddr>();

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%err, %addr, "failed to bind listener");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "promptgate listening");

    if let Err(err) = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await {
        tracing::error!(%err, "server exited with an error");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
