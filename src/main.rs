//! linepool: a line echo server.
//!
//! Each client connection becomes one session task on a fixed-size worker
//! pool, so at most `workers` clients are served at once. Further clients
//! are queued in arrival order until a session ends.

use linepool::config::Config;
use linepool::server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        workers = config.workers,
        backlog = config.backlog,
        "Starting linepool server"
    );

    let server = Server::bind(&config)?;
    server.run()?;
    Ok(())
}
