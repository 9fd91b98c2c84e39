use std::sync::Arc;

use anyhow::Context;
use contact_service::repository::postgres::{self, Options};
use contact_service::{router, telemetry, AppState, Config, ContactUseCase, GroupUseCase, PgRepository};
use dotenv::dotenv;
use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tracing::info;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    telemetry::init();

    let config = Config::from_env()?;
    let pool = postgres::connect(&config.database)
        .await
        .context("connecting to database")?;

    let repository = Arc::new(PgRepository::new(
        pool.clone(),
        Options {
            timeout: config.database.timeout,
        },
    ));
    if config.database.migrate {
        repository.migrate().await?;
    }

    let state = AppState::new(
        ContactUseCase::new(repository.clone()),
        GroupUseCase::new(repository),
    );
    let app = router(state);

    let listener = TcpListener::bind((config.http.host.as_str(), config.http.port))
        .await
        .with_context(|| format!("binding {}:{}", config.http.host, config.http.port))?;
    info!(
        service = %config.service_name,
        addr = %listener.local_addr()?,
        "service started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    info!("service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
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
    info!("shutdown signal received");
}
