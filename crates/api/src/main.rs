use std::sync::Arc;

use anyhow::Context;

use stockledger_api::app::{self, services::{AppServices, EventLog}};
use stockledger_infra::config::{AppConfig, StorageBackend};
use stockledger_infra::event_store::InMemoryEventStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; real deployments use the environment.
    let _ = dotenvy::dotenv();

    let cfg = AppConfig::load()?;
    stockledger_observability::init(cfg.log.format);

    let store = open_store(&cfg).await?;
    let services = Arc::new(AppServices::new(store).context("failed to start projection worker")?);
    services.rebuild_read_models().context("failed to replay the event log")?;

    let app = app::router(services, cfg.auth.jwt_secret.as_bytes());

    let listener = tokio::net::TcpListener::bind(&cfg.http.bind)
        .await
        .with_context(|| format!("failed to bind {}", cfg.http.bind))?;
    tracing::info!(addr = %listener.local_addr()?, backend = ?cfg.storage.backend, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn open_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn EventLog>> {
    match cfg.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryEventStore::new())),
        #[cfg(feature = "postgres")]
        StorageBackend::Postgres => {
            let url = cfg
                .storage
                .database_url
                .as_deref()
                .context("storage.database_url is required for the postgres backend")?;
            let store = stockledger_infra::event_store::PostgresEventStore::connect(url).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        StorageBackend::Postgres => {
            anyhow::bail!("this binary was built without the `postgres` feature")
        }
    }
}
