//! Cortex server binary.

use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cortex::config::Config;
use cortex::notes::SqliteNoteStore;
use cortex::server::{cors_layer, create_router, AppState};
use cortex::{ProviderAdapter, Workflow};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cortex=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_list(false),
            )
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(config.log_json);

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let notes = SqliteNoteStore::open(&config.db_path)?;

    let settings = config.provider_settings();
    tracing::info!(
        policy = ?settings.policy,
        timeout_secs = ?config.provider_timeout_secs,
        openai_model = %settings.openai.model,
        google_model = %settings.google.model,
        "Provider adapter configured"
    );
    let adapter = ProviderAdapter::new(settings)?;
    let workflow = Workflow::agent(Arc::new(adapter))?;

    let state = AppState::new(Arc::new(workflow), Arc::new(notes));
    let app = create_router(state).layer(cors_layer(&config.cors_origins));

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Cortex server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Cortex server stopped");
    Ok(())
}
