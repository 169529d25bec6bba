//! Interactive client for the linepool echo server.
//!
//! Type a line to have it echoed back; a single `.` ends the session.

use clap::Parser;
use linepool::client::EchoClient;
use std::io;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the echo client
#[derive(Parser, Debug)]
#[command(name = "echo-client")]
#[command(version = "0.1.0")]
#[command(about = "Interactive client for the linepool echo server", long_about = None)]
struct ClientArgs {
    /// Server address to connect to
    #[arg(short, long, default_value = "127.0.0.1:1509")]
    server: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ClientArgs::parse();

    // Logs go to stderr so they don't mix with the prompt.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    println!("Echo Client Starting");

    let mut client = EchoClient::connect(args.server.as_str())?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    client.interact(stdin.lock(), &mut stdout)?;

    // Server may have closed first.
    let _ = client.close();

    println!("Echo Client Terminating");
    Ok(())
}
