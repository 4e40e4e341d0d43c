use clap::Parser;
use client::bot::{Bot, BotConfig};
use log::info;
use shared::MapSize;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Name to log in with
    #[arg(short = 'u', long)]
    username: String,

    /// Lobby to join or create
    #[arg(short = 'l', long, default_value = "main")]
    lobby: String,

    /// Create the lobby instead of joining an existing one
    #[arg(short = 'c', long)]
    create: bool,

    /// Map size of a created lobby: s, m or l
    #[arg(long, default_value = "s", value_parser = parse_size)]
    size: MapSize,

    /// Seconds to dig before leaving
    #[arg(short = 'd', long, default_value = "10")]
    dig_seconds: f32,
}

fn parse_size(value: &str) -> Result<MapSize, String> {
    MapSize::parse(value).ok_or_else(|| format!("unknown map size '{}', use s, m or l", value))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let report = Bot::run(BotConfig {
        server: args.server,
        username: args.username,
        lobby: args.lobby,
        create: args.create,
        size: args.size,
        dig_seconds: args.dig_seconds.max(0.0),
    })
    .await?;

    info!("Player {} destroyed {} blocks", report.player_id, report.blocks_destroyed);
    println!("gold: {}", report.gold);
    if let Some(winner) = report.winner {
        match winner {
            Some(id) => println!("winner: player {}", id),
            None => println!("round ended without a winner"),
        }
    }
    if let Some(history) = report.history {
        println!("history: {}", history);
    }

    Ok(())
}
