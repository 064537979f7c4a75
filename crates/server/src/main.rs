//! Voice Agent Server entry point

use std::net::SocketAddr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_agent_config::{load_settings, Settings};
use voice_agent_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Priority: env vars > config/{env}.yaml > config/default.yaml > defaults
    let env = std::env::var("VOICE_AGENT_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Warning: failed to load config: {e}. Using defaults.");
            Settings::default()
        }
    };

    if let Err(err) = settings.validate() {
        eprintln!("Warning: configuration failed validation: {err}. Continuing with it anyway.");
    }

    init_tracing(&settings);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?settings.environment,
        "starting voice agent server"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server.port));
    let app = create_router(AppState::new(settings));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("voice_agent={},tower_http=debug", settings.observability.log_level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
