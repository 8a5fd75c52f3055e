//! logkv Server Binary
//!
//! Opens the store and serves it over TCP.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use logkv::network::Server;
use logkv::{Config, Datastore};
use tracing_subscriber::{fmt, EnvFilter};

/// logkv Server
#[derive(Parser, Debug)]
#[command(name = "logkv-server")]
#[command(about = "Log-structured key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./logkv_data")]
    data_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:8083")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "64")]
    max_connections: usize,

    /// Segment size in MB before rotation
    #[arg(short = 's', long, default_value = "10")]
    segment_mb: u64,

    /// Seconds between background merges (0 disables merging)
    #[arg(long, default_value = "30")]
    merge_interval_secs: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,logkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("logkv Server v{}", logkv::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);

    let merge_interval = match args.merge_interval_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    // Build config from args
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .max_segment_size(args.segment_mb * 1024 * 1024)
        .merge_interval(merge_interval)
        .build();

    // Recovery runs inside open, before the listener exists
    let store = match Datastore::open(config.clone()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("Failed to open datastore: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        keys = store.key_count(),
        segments = store.segment_count(),
        "Datastore ready"
    );

    let server = match Server::bind(config, Arc::clone(&store)) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to bind: {}", e);
            std::process::exit(1);
        }
    };

    // Nothing here stops the server, so run only returns on a listener
    // error. Appends reach the OS as they happen; a kill loses only what the
    // sync strategy had not yet flushed to disk.
    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
