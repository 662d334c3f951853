// Webhook print gateway: accepts image uploads and queues them on CUPS via lp.

use actix_web::{middleware, App, HttpServer};
use tracing::{error, info, warn};

use print_gateway::{routes, AppState, Config};

// ============================================================================
// Shutdown Handling
// ============================================================================

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received");
}

fn io_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, e))
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // ========================================
    // Phase 1: Configuration
    // ========================================

    // Loaded before tracing so the debug flag can pick the default level.
    let config_result = Config::from_env();
    let default_level = config_result
        .as_ref()
        .map(Config::log_level)
        .unwrap_or("info");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    info!("Starting print gateway");

    let config = config_result.map_err(|e| {
        error!("Configuration error: {}", e);
        io_error("Failed to load configuration", e)
    })?;

    let socket_addr = config.socket_addr().map_err(|e| {
        error!("Configuration error: {}", e);
        io_error("Failed to load configuration", e)
    })?;

    if config.uses_default_api_key() {
        warn!("PRINT_API_KEY is unset; using the built-in placeholder key. Set a secret before exposing this server");
    }

    info!("Configuration loaded: {:?}", config);

    // ========================================
    // Phase 2: State Setup
    // ========================================

    let app_state = AppState::new(config);
    app_state.log_printer().await;

    // ========================================
    // Phase 3: HTTP Server Setup
    // ========================================

    let app_state_for_server = app_state.clone();

    let server = HttpServer::new(move || {
        let state = app_state_for_server.clone();
        App::new()
            // Middleware
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            // Application state
            .configure(|cfg| state.register(cfg))
            .configure(routes::configure)
    })
    .bind(socket_addr)?
    .shutdown_timeout(5)
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    info!("Print gateway listening on {}", socket_addr);
    info!("Debug: {}", app_state.config.server.debug);

    // ========================================
    // Phase 4: Run Until Shutdown
    // ========================================

    shutdown_signal().await;

    // ========================================
    // Phase 5: Graceful Shutdown
    // ========================================

    info!("Initiating graceful shutdown...");

    // Stop accepting new connections and wait for in-flight jobs to finish
    server_handle.stop(true).await;

    server_task
        .await
        .map_err(|e| io_error("Server task error", e))??;

    info!("Graceful shutdown complete");
    Ok(())
}
