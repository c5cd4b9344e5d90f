use forge_server::{router, AppState, ServerSettings};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = ServerSettings::load()?;
    if let Err(errors) = settings.validate() {
        anyhow::bail!("invalid configuration: {}", errors.join("; "));
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let state = AppState::new(settings.engine.clone());
    spawn_dispatcher_loop(state.clone());

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!(addr = %settings.bind_addr, "forge-server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Periodic scheduler tick: drives the dispatcher on a fixed
/// interval for the lifetime of the process.
fn spawn_dispatcher_loop(state: AppState) {
    let interval = state.tick_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let processed = state.dispatcher.run_once().await;
            if processed > 0 {
                tracing::debug!(processed, "dispatcher cycle complete");
            }
        }
    });
}

