use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use offline_cache_layer::cache::{CacheStore, DiskCacheStore, MemoryCacheStore};
use offline_cache_layer::config::{Cli, Config, StorageKind};
use offline_cache_layer::net::{Fetcher, HttpFetcher};
use offline_cache_layer::notify::{LogNotifier, Notifier};
use offline_cache_layer::server::host::{build_router, AppState};
use offline_cache_layer::sync::{JsonFilePendingStore, MemoryPendingStore, PendingStore};
use offline_cache_layer::{ServiceLayer, Services, Trigger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "offline_cache_layer=debug,tower_http=debug"
    } else {
        "offline_cache_layer=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("offline-cache-layer v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    let config = Arc::new(config);

    let names = config.partition_names();
    info!(
        origin = %config.origin.url,
        static_partition = names.static_name(),
        dynamic_partition = names.dynamic_name(),
        manifest = config.cache.manifest.len(),
        "Configuration loaded"
    );

    // Process-wide services, injected into every component.
    let store: Arc<dyn CacheStore> = match config.cache.storage {
        StorageKind::Memory => Arc::new(MemoryCacheStore::new()),
        StorageKind::Disk => Arc::new(
            DiskCacheStore::new(config.cache.storage_path.clone(), config.compression.clone())
                .await?,
        ),
    };
    let pending: Arc<dyn PendingStore> = match &config.sync.pending_path {
        Some(path) => Arc::new(JsonFilePendingStore::new(path.clone())),
        None => Arc::new(MemoryPendingStore::new()),
    };
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&config.origin)?);
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

    let layer = ServiceLayer::new(
        &config,
        Services {
            store,
            fetcher,
            pending: pending.clone(),
            notifier,
        },
    )?;
    let state = Arc::new(AppState::new(layer, pending, config.clone()));

    // Whatever a previous run stored survives a restart.
    state.restore().await;

    // Install and activate once. A failed install keeps serving the stored
    // generation if there is one; otherwise requests pass through until an
    // install trigger succeeds.
    if config.server.auto_lifecycle {
        match state.dispatch(Trigger::Install).await {
            Ok(_) => {
                if let Err(e) = state.dispatch(Trigger::Activate).await {
                    error!(error = %e, "Activation failed");
                }
            }
            Err(e) if state.is_active() => {
                warn!(error = %e, "Installation failed; serving the stored generation")
            }
            Err(e) => error!(error = %e, "Installation failed; requests pass through"),
        }
    }

    // Build the HTTP router.
    let app = build_router(state);

    // Start the server.
    let listen_addr = config.server.listen.clone();
    info!(addr = listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
