mod connection;
mod directory;
mod handler;
mod relay;
mod room;
mod server;

use std::net::SocketAddr;

use clap::Parser;

/// Scrawl Server - shared whiteboard and guessing-game session engine
#[derive(Parser, Debug)]
#[command(name = "scrawl-server", version, about)]
struct Args {
    /// Address to bind the server to
    #[arg(short, long, default_value = "0.0.0.0:4000")]
    bind: String,

    /// Maximum simultaneous connections allowed
    #[arg(short, long, default_value_t = 200)]
    max_connections: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scrawl_server=debug,scrawl_common=debug".into()),
        )
        .init();

    let args = Args::parse();

    let addr: SocketAddr = args.bind.parse()?;

    tracing::info!("Starting scrawl server on {} (max {} connections)", addr, args.max_connections);
    server::run(addr, args.max_connections).await
}
