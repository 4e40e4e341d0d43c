//! Process-wide server state shared by every connection task.

use crate::config::ServerConfig;
use crate::history::RoundHistory;
use crate::lobby::{LobbyManager, LobbySettings};
use crate::players::PlayerAuthority;
use crate::registry::ConnectionRegistry;
use crate::world::BlockAuthority;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::Arc;

pub struct ServerState {
    pub config: ServerConfig,
    pub registry: ConnectionRegistry,
    pub players: Arc<PlayerAuthority>,
    pub lobbies: Arc<LobbyManager>,
    pub blocks: BlockAuthority,
    pub history: RoundHistory,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        let mut root = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        // Separate streams so loot rolls don't shift map seeds.
        let seeds = StdRng::seed_from_u64(root.next_u64());
        let loot = StdRng::seed_from_u64(root.next_u64());

        let players = Arc::new(PlayerAuthority::new());
        let lobbies = Arc::new(LobbyManager::new(
            players.clone(),
            LobbySettings::from(&config),
            seeds,
        ));
        let blocks = BlockAuthority::new(players.clone(), lobbies.clone(), loot);

        Self {
            registry: ConnectionRegistry::new(config.max_players),
            history: RoundHistory::new(config.history_len),
            players,
            lobbies,
            blocks,
            config,
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}
