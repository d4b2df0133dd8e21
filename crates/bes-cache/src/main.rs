//! BES Cache - Caching JSON gateway for BES management servers

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

use bes_api::AppState;
use bes_core::{Cache, CacheOptions, ServerConfig};
use config::Config;

/// BES Cache - Caching JSON gateway for BES management servers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Bind address
    #[arg(long, env = "BES_CACHE_BIND")]
    bind: Option<String>,

    /// Port
    #[arg(short, long, env = "BES_CACHE_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config)?;

    // Initialize logging
    init_logging(&config.logging.level);

    info!("Starting BES Cache v{}", env!("CARGO_PKG_VERSION"));

    // Build the cache and register the configured upstreams
    let cache = Arc::new(Cache::new(CacheOptions {
        default_max_age: config.cache.default_max_age,
        max_lifetime: config.cache.max_lifetime,
    }));

    for upstream in &config.upstreams {
        cache.add_server(ServerConfig {
            url: upstream.url.clone(),
            username: upstream.username.clone(),
            password: upstream.password.clone(),
            pool_size: upstream.pool_size,
            max_age: upstream.max_age,
            skip_tls_verify: upstream.skip_tls_verify,
        })?;
    }

    // Start the background sweeper
    cache.start_sweeper(config.cache.sweep_interval);

    // Optionally pre-warm the core types of every upstream in the
    // background; a slow or unreachable upstream must not hold up startup.
    if config.cache.populate_on_start {
        for upstream in &config.upstreams {
            let cache = cache.clone();
            let url = upstream.url.clone();
            tokio::spawn(async move {
                if let Err(e) = cache.populate_core_types(&url).await {
                    warn!("Populate failed for {}: {}", url, e);
                }
            });
        }
    }

    // Create router
    let state = AppState::new(cache);
    let app = bes_api::create_router(state).layer(TraceLayer::new_for_http());

    // Determine bind address
    let bind_addr = args.bind.unwrap_or(config.server.bind_address);
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", bind_addr, port).parse()?;

    info!("Listening on {}", addr);
    for upstream in &config.upstreams {
        info!("Upstream: {}", upstream.url);
    }

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Initialize logging
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Shutdown signal received");
}
