use std::sync::Arc;

use anyhow::Context;
use talentbridge_infra::{NotificationService, NotifyConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    talentbridge_observability::init();

    let config = NotifyConfig::from_env();
    let bind_addr = config.bind_addr.clone();

    let service = Arc::new(NotificationService::from_config(config).await?);
    let workers = service.spawn_workers();
    let observer = service.spawn_observer().context("failed to start lifecycle observer")?;

    let app = talentbridge_api::app::build_app(service);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("shutting down workers");
    workers.shutdown().await;
    observer.shutdown();
    Ok(())
}
