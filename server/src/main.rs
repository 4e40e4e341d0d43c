use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use server::state::ServerState;
use std::path::PathBuf;
use std::sync::Arc;

/// Authoritative server for the cooperative mining game
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,
    /// Server port to listen on
    #[arg(short, long)]
    port: Option<u16>,
    /// TOML file with server settings
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Maximum number of logged in players
    #[arg(short, long)]
    max_players: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(max_players) = args.max_players {
        config.max_players = max_players;
    }
    config.check()?;

    let server = Server::bind(Arc::new(ServerState::new(config))).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}
