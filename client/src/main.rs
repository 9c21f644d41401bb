use client::{
    stats, ClientConfig, Engine, RefreshCoordinator, RefreshOutcome, RefreshReason,
};
use tracing::info;

/// Follows the configured user's task list and logs every change until interrupted.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "client=info,taskguru_watch=info".into()),
        )
        .init();

    let config = ClientConfig::from_env()?;
    info!(base_url = %config.base_url, email = %config.email, "starting");

    let engine = Engine::from_config(&config)?;
    let mut snapshots = engine.subscribe();
    let coordinator = RefreshCoordinator::new(engine.clone(), config.poll_interval());

    if let RefreshOutcome::Failed(err) = coordinator.refresh_now(RefreshReason::Manual).await {
        anyhow::bail!("initial load failed: {err}");
    }
    let handle = coordinator.spawn();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                let summary = stats(&snapshot);
                info!(
                    version = snapshot.version,
                    total = summary.total,
                    open = summary.open,
                    completed = summary.completed,
                    "tasks changed"
                );
                for task in &snapshot.tasks {
                    info!(id = %task.id, done = task.done, pending = task.pending, "{}", task.title);
                }
            }
        }
    }

    handle.shutdown().await;
    info!("stopped");
    Ok(())
}
