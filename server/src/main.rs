use fieldtrack_server::config::Config;
use fieldtrack_server::db::{self, CatalogSeed};
use fieldtrack_server::remote::HttpRemote;
use fieldtrack_server::sync::{spawn_driver, SyncCoordinator};
use fieldtrack_server::{build_router, AppState};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fieldtrack_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting FieldTrack Server on {}:{}", config.host, config.port);

    let pool = db::create_pool(&config.database_url).await?;

    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    if let Some(path) = &config.seed_file {
        let seed = CatalogSeed::load(path)?;
        let inserted = db::seed_catalogs(&pool, &seed).await?;
        tracing::info!(inserted, path = %path.display(), "catalog seed applied");
    }

    let repaired = db::backfill_sync_uids(&pool).await?;
    if repaired > 0 {
        tracing::info!(repaired, "assigned missing sync uids");
    }

    let remote = HttpRemote::new(
        &config.remote_url,
        &config.remote_root,
        config.remote_auth_token.clone(),
        config.remote_timeout,
    )?;
    tracing::info!(endpoint = remote.endpoint(), "remote store configured");

    let coordinator = Arc::new(SyncCoordinator::new(pool.clone(), Arc::new(remote)));
    let (sync_handle, driver) = spawn_driver(coordinator.clone(), config.sync_interval);

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState {
        pool,
        config: Arc::new(config),
        sync: coordinator,
        sync_handle: sync_handle.clone(),
    };

    // Requests never wait on a sync cycle, so a short deadline is enough.
    let app = build_router(state).layer(
        ServiceBuilder::new().layer(TimeoutLayer::new(std::time::Duration::from_secs(30))),
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    sync_handle.stop().await;
    let _ = driver.await;
    tracing::info!("Server stopped");

    Ok(())
}
