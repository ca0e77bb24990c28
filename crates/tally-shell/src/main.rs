mod config;
mod error;
mod routes;

use tally_core::cache::{CacheStorage, HttpFetcher, ResourceCache};
use tracing_subscriber::EnvFilter;

use config::ShellConfig;
use routes::{app_router, ShellState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; deployments inject the environment.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tally_shell=info,tally_core=info")),
        )
        .init();

    let config = ShellConfig::from_env()?;
    tracing::info!("Starting tally-shell with config: {:?}", config);

    let storage = CacheStorage::open_persistent(&config.cache_path).await?;
    let cache = ResourceCache::with_storage(
        config.manifest(),
        config.origin_url.clone(),
        HttpFetcher::new()?,
        storage,
    );
    let report = cache.install().await;
    if !report.critical_complete {
        tracing::warn!(
            missing = ?report.critical_failures,
            "Serving without a complete offline shell"
        );
    }
    cache.activate().await;

    let router = app_router(ShellState::new(cache));
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("tally-shell listening on {}", config.bind_addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
