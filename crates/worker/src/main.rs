use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sgdea_engine::alerts::AlertEngine;
use sgdea_engine::boundary::{LogDispatch, UnresolvedSubjects};
use sgdea_engine::process::RetentionService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sgdea_worker=debug,sgdea_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

    let pool = sgdea_db::create_pool(&database_url).await?;
    sgdea_db::run_migrations(&pool).await?;
    tracing::info!("Worker connected, migrations applied");

    let service = RetentionService::new(pool.clone());
    // Deployments with the document-store and channel integrations swap in
    // their own SubjectLookup / NotificationDispatch implementations here.
    let alerts = AlertEngine::new(pool.clone(), Arc::new(UnresolvedSubjects));
    let dispatch: Arc<dyn sgdea_engine::boundary::NotificationDispatch> = Arc::new(LogDispatch);

    let cancel = CancellationToken::new();

    let sweep = tokio::spawn(sgdea_worker::sweep_loop::run(
        service,
        alerts.clone(),
        cancel.clone(),
    ));
    let delivery = tokio::spawn(sgdea_worker::delivery_loop::run(
        alerts,
        dispatch,
        cancel.clone(),
    ));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    cancel.cancel();

    let _ = tokio::join!(sweep, delivery);
    Ok(())
}
