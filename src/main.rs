use clap::Parser;
use tracing_subscriber::EnvFilter;

use unitree_zenoh_runtime::config::Args;

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    if let Err(e) = unitree_zenoh_runtime::runtime::run(args).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
