//! Client-side view of the session, rebuilt from server packets.

use shared::{
    BlockKind, ItemKind, LobbyListing, LobbyMember, LobbyState, MapLayout, MapSize, Packet,
    PlayerId, Status,
};
use std::collections::{HashMap, HashSet};

/// What a received packet meant for the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LoggedIn(PlayerId),
    LobbyEntered,
    LobbyRejected(String),
    LobbyUpdated,
    LobbiesListed,
    RoundStarted { size: MapSize, seed: u64 },
    BlockDestroyed { x: i32, y: i32, by: PlayerId },
    GoldChanged { player: PlayerId, gold: u32 },
    ItemSpawned { item: ItemKind, x: f32, y: f32 },
    LivesChanged { player: PlayerId, lives: u8 },
    PlayerMoved { player: PlayerId },
    RoundOver { winner: Option<PlayerId> },
    History(String),
    HistoryUnavailable(String),
    Rejected { tag: String, message: String },
    Ignored,
}

#[derive(Debug, Default)]
pub struct Session {
    pub player_id: Option<PlayerId>,
    pub lobby: Option<String>,
    pub lobby_state: Option<LobbyState>,
    pub members: Vec<LobbyMember>,
    pub lobbies: Vec<LobbyListing>,
    /// Layout of the running round, rebuilt from its seed.
    pub map: Option<MapLayout>,
    pub destroyed: HashSet<(i32, i32)>,
    pub gold: HashMap<PlayerId, u32>,
    pub lives: HashMap<PlayerId, u8>,
    pub positions: HashMap<PlayerId, (f32, f32)>,
    requested_lobby: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers which lobby a CREATE_LOBBY or JOIN_LOBBY asked for.
    pub fn request_lobby(&mut self, name: &str) {
        self.requested_lobby = Some(name.to_string());
    }

    pub fn left_lobby(&mut self) {
        self.lobby = None;
        self.lobby_state = None;
        self.members.clear();
        self.map = None;
    }

    pub fn my_gold(&self) -> u32 {
        self.player_id
            .and_then(|id| self.gold.get(&id).copied())
            .unwrap_or(0)
    }

    pub fn apply(&mut self, packet: &Packet) -> SessionEvent {
        match packet {
            Packet::LoginSuccessful { player_id } => {
                self.player_id = Some(*player_id);
                SessionEvent::LoggedIn(*player_id)
            }
            Packet::CreateLobbyStatus { status } | Packet::JoinLobbyStatus { status } => {
                let requested = self.requested_lobby.take();
                match status {
                    Status::Ok(_) => {
                        self.lobby = requested;
                        SessionEvent::LobbyEntered
                    }
                    Status::Err(message) => SessionEvent::LobbyRejected(message.clone()),
                }
            }
            Packet::LobbyInfo {
                name,
                state,
                members,
            } => {
                self.lobby = Some(name.clone());
                self.lobby_state = Some(*state);
                self.members = members.clone();
                SessionEvent::LobbyUpdated
            }
            Packet::LobbyOverview { lobbies } => {
                self.lobbies = lobbies.clone();
                SessionEvent::LobbiesListed
            }
            Packet::StartRound { size, seed } => {
                self.map = Some(MapLayout::generate(*size, *seed));
                self.destroyed.clear();
                self.gold.clear();
                self.lobby_state = Some(LobbyState::InRound);
                SessionEvent::RoundStarted {
                    size: *size,
                    seed: *seed,
                }
            }
            Packet::BlockDestroyed {
                grid_x,
                grid_y,
                player_id,
            } => {
                self.destroyed.insert((*grid_x, *grid_y));
                SessionEvent::BlockDestroyed {
                    x: *grid_x,
                    y: *grid_y,
                    by: *player_id,
                }
            }
            Packet::GoldUpdate { player_id, gold } => {
                self.gold.insert(*player_id, *gold);
                SessionEvent::GoldChanged {
                    player: *player_id,
                    gold: *gold,
                }
            }
            Packet::SpawnItem { item, x, y, .. } => SessionEvent::ItemSpawned {
                item: *item,
                x: *x,
                y: *y,
            },
            Packet::LifeStatus { player_id, lives } => {
                self.lives.insert(*player_id, *lives);
                SessionEvent::LivesChanged {
                    player: *player_id,
                    lives: *lives,
                }
            }
            Packet::PositionUpdate { player_id, x, y, .. } => {
                self.positions.insert(*player_id, (*x, *y));
                SessionEvent::PlayerMoved {
                    player: *player_id,
                }
            }
            Packet::GameOver { winner } => {
                self.lobby_state = Some(LobbyState::Ended);
                SessionEvent::RoundOver { winner: *winner }
            }
            Packet::History { status } => match status {
                Status::Ok(text) => SessionEvent::History(text.clone()),
                Status::Err(message) => SessionEvent::HistoryUnavailable(message.clone()),
            },
            Packet::Error { tag, message } => SessionEvent::Rejected {
                tag: tag.clone(),
                message: message.clone(),
            },
            _ => SessionEvent::Ignored,
        }
    }

    /// Whether (x, y) still holds a block that digging can break.
    pub fn is_diggable(&self, x: usize, y: usize) -> bool {
        let Some(map) = &self.map else {
            return false;
        };
        match map.kind_at(x, y) {
            Some(BlockKind::Air) | Some(BlockKind::Obsidian) | None => false,
            Some(_) => !self.destroyed.contains(&(x as i32, y as i32)),
        }
    }

    /// Topmost diggable block, searching columns from `column` onwards.
    pub fn next_target(&self, column: usize) -> Option<(i32, i32)> {
        let map = self.map.as_ref()?;
        (0..map.width)
            .map(|offset| (column + offset) % map.width)
            .find_map(|x| {
                (0..map.height)
                    .find(|&y| self.is_diggable(x, y))
                    .map(|y| (x as i32, y as i32))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_round(seed: u64) -> Session {
        let mut session = Session::new();
        session.apply(&Packet::LoginSuccessful { player_id: 1 });
        session.apply(&Packet::StartRound {
            size: MapSize::Small,
            seed,
        });
        session
    }

    #[test]
    fn test_login() {
        let mut session = Session::new();
        let event = session.apply(&Packet::LoginSuccessful { player_id: 7 });
        assert_eq!(event, SessionEvent::LoggedIn(7));
        assert_eq!(session.player_id, Some(7));
    }

    #[test]
    fn test_lobby_status_prefix() {
        let mut session = Session::new();
        session.request_lobby("Deep");
        let event = session.apply(&Packet::CreateLobbyStatus {
            status: Status::ok(),
        });
        assert_eq!(event, SessionEvent::LobbyEntered);
        assert_eq!(session.lobby.as_deref(), Some("Deep"));

        let mut session = Session::new();
        session.request_lobby("Deep");
        let event = session.apply(&Packet::JoinLobbyStatus {
            status: Status::from_field("Lobby is full"),
        });
        assert_eq!(event, SessionEvent::LobbyRejected("Lobby is full".into()));
        assert_eq!(session.lobby, None);
    }

    #[test]
    fn test_round_start_rebuilds_map() {
        let session = in_round(1234);
        let map = session.map.as_ref().unwrap();
        assert_eq!(map, &MapLayout::generate(MapSize::Small, 1234));
        assert_eq!(session.lobby_state, Some(LobbyState::InRound));
    }

    #[test]
    fn test_destroyed_blocks_not_targeted() {
        let mut session = in_round(5);
        let first = session.next_target(0).unwrap();
        assert!(session.is_diggable(first.0 as usize, first.1 as usize));

        session.apply(&Packet::BlockDestroyed {
            grid_x: first.0,
            grid_y: first.1,
            player_id: 2,
        });
        assert!(!session.is_diggable(first.0 as usize, first.1 as usize));
        assert_ne!(session.next_target(0), Some(first));
    }

    #[test]
    fn test_no_target_without_round() {
        let session = Session::new();
        assert_eq!(session.next_target(0), None);
    }

    #[test]
    fn test_gold_and_game_over() {
        let mut session = in_round(5);
        session.apply(&Packet::GoldUpdate {
            player_id: 1,
            gold: 250,
        });
        assert_eq!(session.my_gold(), 250);

        let event = session.apply(&Packet::GameOver { winner: Some(1) });
        assert_eq!(event, SessionEvent::RoundOver { winner: Some(1) });
        assert_eq!(session.lobby_state, Some(LobbyState::Ended));
    }

    #[test]
    fn test_history() {
        let mut session = Session::new();
        let event = session.apply(&Packet::History {
            status: Status::Ok("Deep round 1: no winner after 3s (1 players)".into()),
        });
        assert!(matches!(event, SessionEvent::History(text) if text.starts_with("Deep")));
    }
}
