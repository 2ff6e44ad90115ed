//! Entry point of the memvault binary.
//!
//! Parses the command line, loads the configuration (file, then flag/env
//! overrides) and dispatches to the selected subcommand.
//!
//! ```sh
//! memvault init
//! memvault prefetch
//! memvault serve --port 8090
//! memvault stats --scope "platform team/knowledge"
//! ```

use std::{error::Error, sync::Arc};

use clap::Parser;
use memvault::{
    collection::{CollectionStats, VectorCollection},
    commands::{Cli, Commands},
    config::{self, MemvaultConfig},
    embedding::{self, SharedEmbedder},
    registry::CollectionRegistry,
    scope,
    server::{self, AppState},
};
use once_cell::sync::OnceCell;
use tracing::{debug, info};

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt::init();
    });
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => memvault::config_dir()?.join("config.yaml"),
    };
    let mut memvault_config = config::load_or_default(&config_path)?;
    debug!("Config loaded: {:?}", memvault_config);

    match cli.command {
        Commands::Serve {
            host,
            port,
            data_dir,
            model,
        } => {
            if let Some(host) = host {
                memvault_config.host = host;
            }
            if let Some(port) = port {
                memvault_config.port = port;
            }
            if let Some(dir) = data_dir {
                memvault_config.data_dir = dir;
            }
            model.apply(&mut memvault_config);
            serve(memvault_config).await?;
        }
        Commands::Prefetch { model } => {
            model.apply(&mut memvault_config);
            memvault_config.ensure_dirs()?;
            let spec = memvault_config.model_spec();
            info!("Prefetching {} into {}", spec.model_id, spec.cache_dir.display());
            let dimension = tokio::task::spawn_blocking(move || {
                embedding::prefetch(&spec).map_err(|e| e.to_string())
            })
            .await??;
            println!("model ready, dim={dimension}");
        }
        Commands::Stats { scope, data_dir } => {
            if let Some(dir) = data_dir {
                memvault_config.data_dir = dir;
            }
            // Read-only: a scope that was never written reports empty stats.
            let resolved = scope::resolve(&scope)?;
            let embedder = Arc::new(SharedEmbedder::from_spec(memvault_config.model_spec()));
            let stats = match VectorCollection::open_existing(&memvault_config.data_dir, resolved.identity(), embedder)? {
                Some(collection) => collection.stats()?,
                None => CollectionStats::default(),
            };
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Init => {
            debug!("Initializing configuration");
            init(&config_path)?;
        }
    }

    Ok(())
}

/// Build the shared context, load the model up front and serve HTTP.
async fn serve(memvault_config: MemvaultConfig) -> Result<(), Box<dyn Error>> {
    memvault_config.ensure_dirs()?;

    let embedder = Arc::new(SharedEmbedder::from_spec(memvault_config.model_spec()));
    let registry = Arc::new(CollectionRegistry::open(&memvault_config.data_dir, embedder)?);

    // No degraded mode: without the model the service cannot answer anything.
    let warm = registry.clone();
    tokio::task::spawn_blocking(move || warm.embedder().get().map(|_| ())).await??;
    info!("Embedding model {} ready", memvault_config.model);

    let state = AppState {
        registry,
        default_top_k: memvault_config.default_top_k,
    };
    server::serve(state, &memvault_config.bind_addr()).await
}

/// Write a default configuration file to `path` unless one already exists.
fn init(path: &std::path::Path) -> Result<(), Box<dyn Error>> {
    if path.exists() {
        info!("Config already present at {}", path.display());
        return Ok(());
    }
    let memvault_config = MemvaultConfig::default();
    info!("Creating config file: {}", path.display());
    config::write_config(&memvault_config, path)?;
    memvault_config.ensure_dirs()?;
    Ok(())
}
