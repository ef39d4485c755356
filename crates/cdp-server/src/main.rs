//! Connected-devices session-core server binary.
//!
//! # Usage
//!
//! ```bash
//! cdp-server --bind 0.0.0.0:28976
//! ```

use std::sync::Arc;

use cdp_core::SessionRegistry;
use cdp_server::{NullAppRegistry, SystemEnv, handle_connection};
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Connected-devices session-core server
#[derive(Parser, Debug)]
#[command(name = "cdp-server")]
#[command(about = "Connected-devices protocol session-core server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:28976")]
    bind: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!(bind = %args.bind, "cdp-server starting");

    let listener = TcpListener::bind(&args.bind).await?;
    tracing::info!(local_addr = %listener.local_addr()?, "listening");

    let registry = Arc::new(SessionRegistry::new(SystemEnv::new(), Vec::new()));
    let apps = Arc::new(NullAppRegistry) as Arc<dyn cdp_core::AppRegistry>;

    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::info!(%peer, "accepted connection");
        let registry = Arc::clone(&registry);
        let apps = Arc::clone(&apps);
        tokio::spawn(async move {
            handle_connection(stream, peer, registry, apps).await;
            tracing::info!(%peer, "connection closed");
        });
    }
}
