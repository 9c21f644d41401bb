use std::sync::Arc;

use backend::config::ServerConfig;
use backend::store::{MemoryStore, RedisStore, TaskStore};
use backend::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let store: Arc<dyn TaskStore> = match &config.redis_url {
        Some(url) => {
            tracing::info!(%url, "using redis store");
            Arc::new(RedisStore::open(url)?)
        }
        None => {
            tracing::info!("REDIS_URL not set, keeping tasks in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let address = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("Server running on http://{}", address);
    axum::serve(listener, app(AppState::new(store))).await?;
    Ok(())
}
