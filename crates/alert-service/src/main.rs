use alert_service::{create_router, AppState, ServiceConfig};
use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = telemetry::init_with_service("alert-service");

    info!("Starting alert-service");

    let config = ServiceConfig::from_env()?;
    info!(
        bind = %config.bind_addr,
        detector = %config.detector.plugin_id,
        safe_density = config.crowd.safe_density,
        max_density = config.crowd.max_density,
        default_area = config.crowd.default_area_sqm,
        frame_skip = config.crowd.frame_skip,
        video_root = ?config.video_root,
        "configuration loaded"
    );

    let registry = config.detector.build_registry().await?;
    info!(
        "Detector registry initialized with {} plugin(s)",
        registry.count().await
    );

    let mut state = AppState::new(
        config.crowd.clone(),
        registry.clone(),
        &config.detector.plugin_id,
    );
    if let Some(root) = &config.video_root {
        state = state.with_video_root(root.clone());
    }
    let app = create_router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .context("Failed to bind to address")?;

    info!("Alert service listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down detector plugins");
    registry.shutdown_all().await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
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
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
}
