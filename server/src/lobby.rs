//! Lobby manager: membership, readiness and the round lifecycle.
//!
//! A lobby moves WAITING -> READY_CHECK -> IN_ROUND -> ENDED and can go back
//! to WAITING or READY_CHECK for another round. It exists from the moment its
//! creator makes it until its last member leaves.
//!
//! Locking: the table lock is only held to look up, insert or remove an entry,
//! never while a lobby's own mutex is taken. A lobby's mutex may be held
//! while calling into the [`PlayerAuthority`], never the other way round.

use crate::config::ServerConfig;
use crate::error::{AuthorizationError, DispatchResult, StateConflictError};
use crate::history::RoundSummary;
use crate::players::PlayerAuthority;
use crate::world::World;
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::Rng;
use shared::{LobbyListing, LobbyMember, LobbyState, MapSize, Packet, PlayerId, WorldBounds};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

pub type LobbyId = u32;

/// Limits and round rules shared by every lobby on the server
#[derive(Debug, Clone, PartialEq)]
pub struct LobbySettings {
    /// Maximum number of lobbies open at the same time
    pub max_lobbies: usize,
    /// Maximum number of members per lobby
    pub max_members: usize,
    /// Gold a member needs to win the round
    pub gold_goal: u32,
    /// Lives every member starts a round with
    pub starting_lives: u8,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for LobbySettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_lobbies: config.max_lobbies,
            max_members: config.max_lobby_members,
            gold_goal: config.gold_goal,
            starting_lives: config.starting_lives,
        }
    }
}

/// One lobby and the world its current or last round is played in
pub struct Lobby {
    pub id: LobbyId,
    pub name: String,
    pub size: MapSize,
    /// In join order.
    pub members: Vec<PlayerId>,
    pub state: LobbyState,
    pub seed: u64,
    pub world: Arc<World>,
    pub rounds_played: u32,
    round_started: Option<Instant>,
    /// Set when the last member left. The entry is about to be removed.
    closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundStart {
    pub lobby: LobbyId,
    pub size: MapSize,
    pub seed: u64,
}

impl RoundStart {
    pub fn packet(&self) -> Packet {
        Packet::StartRound {
            size: self.size,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundEnd {
    pub lobby: LobbyId,
    pub winner: Option<PlayerId>,
    pub summary: RoundSummary,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadyOutcome {
    pub lobby: LobbyId,
    pub started: Option<RoundStart>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeaveOutcome {
    pub lobby: LobbyId,
    /// The leaver was the last member and the lobby is gone.
    pub closed: bool,
    /// Everyone left behind was ready, so the round started.
    pub started: Option<RoundStart>,
}

struct LobbyEntry {
    name: String,
    lobby: Arc<Mutex<Lobby>>,
}

#[derive(Default)]
struct Table {
    entries: HashMap<LobbyId, LobbyEntry>,
    last_id: LobbyId,
}

/// Owns every lobby on the server and drives their round lifecycle
///
/// Lobbies are looked up by id through the table and then locked one at a
/// time. All membership and readiness changes of a lobby happen under its own
/// mutex, so two players readying at once cannot both start the round.
pub struct LobbyManager {
    table: RwLock<Table>,
    players: Arc<PlayerAuthority>,
    settings: LobbySettings,
    seeds: Mutex<StdRng>,
}

impl LobbyManager {
    pub fn new(players: Arc<PlayerAuthority>, settings: LobbySettings, seeds: StdRng) -> Self {
        Self {
            table: RwLock::new(Table::default()),
            players,
            settings,
            seeds: Mutex::new(seeds),
        }
    }

    pub fn settings(&self) -> &LobbySettings {
        &self.settings
    }

    fn next_seed(&self) -> u64 {
        self.seeds.lock().gen()
    }

    fn entry(&self, id: LobbyId) -> Option<Arc<Mutex<Lobby>>> {
        self.table.read().entries.get(&id).map(|e| e.lobby.clone())
    }

    /// Creates a lobby and makes `player` its first member.
    pub fn create(&self, player: PlayerId, name: &str, size: MapSize) -> DispatchResult<LobbyId> {
        let seed = self.next_seed();
        let world = Arc::new(World::generate(size, seed));

        let mut table = self.table.write();
        if table.entries.values().any(|e| e.name == name) {
            return Err(StateConflictError::LobbyNameTaken(name.to_string()).into());
        }
        if table.entries.len() >= self.settings.max_lobbies {
            return Err(StateConflictError::TooManyLobbies.into());
        }

        let id = table.last_id + 1;
        self.players.claim_lobby(player, id)?;
        table.last_id = id;

        let lobby = Lobby {
            id,
            name: name.to_string(),
            size,
            members: vec![player],
            state: LobbyState::Waiting,
            seed,
            world,
            rounds_played: 0,
            round_started: None,
            closed: false,
        };
        table.entries.insert(
            id,
            LobbyEntry {
                name: name.to_string(),
                lobby: Arc::new(Mutex::new(lobby)),
            },
        );

        info!("Player {} created lobby '{}' ({})", player, name, id);
        Ok(id)
    }

    /// Adds `player` to the lobby called `name`
    ///
    /// Fails when the player already sits in a lobby, the lobby does not
    /// exist or is closing, a round is being played or the lobby is full.
    /// Joining a lobby whose round ended sends it back to WAITING.
    pub fn join(&self, player: PlayerId, name: &str) -> DispatchResult<LobbyId> {
        if self.players.lobby_of(player).is_ok() {
            return Err(StateConflictError::AlreadyInLobby.into());
        }

        let not_found = || StateConflictError::LobbyNotFound(name.to_string());
        let (id, handle) = self
            .table
            .read()
            .entries
            .iter()
            .find(|(_, e)| e.name == name)
            .map(|(id, e)| (*id, e.lobby.clone()))
            .ok_or_else(not_found)?;

        let mut lobby = handle.lock();
        if lobby.closed {
            return Err(not_found().into());
        }
        if lobby.state == LobbyState::InRound {
            return Err(StateConflictError::RoundInProgress.into());
        }
        if lobby.members.len() >= self.settings.max_members {
            return Err(StateConflictError::LobbyFull.into());
        }

        self.players.claim_lobby(player, id)?;
        lobby.members.push(player);
        if lobby.state == LobbyState::Ended {
            lobby.state = LobbyState::Waiting;
        }

        info!("Player {} joined lobby '{}'", player, lobby.name);
        Ok(id)
    }

    /// Removes `player` from their lobby
    ///
    /// The last member leaving closes the lobby. During a ready check the
    /// remaining members are re-evaluated: the round starts if all of them
    /// are ready and the lobby falls back to WAITING if none are. A running
    /// round carries on for whoever is left.
    pub fn leave(&self, player: PlayerId) -> DispatchResult<LeaveOutcome> {
        let id = self.players.lobby_of(player)?;
        let Some(handle) = self.entry(id) else {
            self.players.release_lobby(player);
            return Err(AuthorizationError::NotInLobby.into());
        };

        let (closed, started) = {
            let mut lobby = handle.lock();
            lobby.members.retain(|m| *m != player);
            self.players.release_lobby(player);
            info!("Player {} left lobby '{}'", player, lobby.name);

            if lobby.members.is_empty() {
                lobby.closed = true;
                (true, None)
            } else if lobby.state == LobbyState::ReadyCheck {
                self.recheck_readiness(&mut lobby)
            } else {
                (false, None)
            }
        };

        if closed {
            self.table.write().entries.remove(&id);
            info!("Lobby {} closed", id);
        }

        Ok(LeaveOutcome {
            lobby: id,
            closed,
            started,
        })
    }

    fn recheck_readiness(&self, lobby: &mut Lobby) -> (bool, Option<RoundStart>) {
        if self.all_ready(lobby) {
            return (false, Some(self.start_round(lobby)));
        }
        if !lobby.members.iter().any(|m| self.players.is_ready(*m)) {
            lobby.state = LobbyState::Waiting;
        }
        (false, None)
    }

    /// Marks `player` ready and starts the round once every member is
    ///
    /// Readying moves a WAITING or ENDED lobby into READY_CHECK. Readying twice
    /// or while a round is running is refused.
    pub fn ready(&self, player: PlayerId) -> DispatchResult<ReadyOutcome> {
        let id = self.players.lobby_of(player)?;
        let handle = self.entry(id).ok_or(AuthorizationError::NotInLobby)?;

        let mut lobby = handle.lock();
        if lobby.closed || !lobby.members.contains(&player) {
            return Err(AuthorizationError::NotInLobby.into());
        }
        if lobby.state == LobbyState::InRound {
            return Err(StateConflictError::RoundInProgress.into());
        }
        if self.players.is_ready(player) {
            return Err(StateConflictError::AlreadyReady.into());
        }

        self.players.set_ready(player, true);
        if matches!(lobby.state, LobbyState::Waiting | LobbyState::Ended) {
            lobby.state = LobbyState::ReadyCheck;
        }
        debug!("Player {} is ready in lobby '{}'", player, lobby.name);

        let started = self
            .all_ready(&lobby)
            .then(|| self.start_round(&mut lobby));
        Ok(ReadyOutcome { lobby: id, started })
    }

    fn all_ready(&self, lobby: &Lobby) -> bool {
        !lobby.members.is_empty() && lobby.members.iter().all(|m| self.players.is_ready(*m))
    }

    fn start_round(&self, lobby: &mut Lobby) -> RoundStart {
        if lobby.rounds_played > 0 {
            lobby.seed = self.next_seed();
            lobby.world = Arc::new(World::generate(lobby.size, lobby.seed));
        }
        self.players
            .reset_for_round(&lobby.members, self.settings.starting_lives);
        lobby.state = LobbyState::InRound;
        lobby.rounds_played += 1;
        lobby.round_started = Some(Instant::now());

        info!(
            "Round {} started in lobby '{}' with {} players (seed {})",
            lobby.rounds_played,
            lobby.name,
            lobby.members.len(),
            lobby.seed
        );
        RoundStart {
            lobby: lobby.id,
            size: lobby.size,
            seed: lobby.seed,
        }
    }

    /// Ends the running round if a member reached the gold goal or every
    /// member is defeated.
    pub fn finish_round_if_over(&self, id: LobbyId) -> Option<RoundEnd> {
        let handle = self.entry(id)?;
        let mut lobby = handle.lock();
        if lobby.closed || lobby.state != LobbyState::InRound {
            return None;
        }

        let members = self.players.snapshot(&lobby.members);
        let reached_goal = members
            .iter()
            .filter(|p| p.gold >= self.settings.gold_goal)
            .max_by_key(|p| p.gold);
        let winner = match reached_goal {
            Some(player) => Some(player),
            None if members.iter().all(|p| p.defeated) => members
                .iter()
                .filter(|p| p.gold > 0)
                .max_by_key(|p| p.gold),
            None => return None,
        };

        lobby.state = LobbyState::Ended;
        for member in &lobby.members {
            self.players.set_ready(*member, false);
        }

        let summary = RoundSummary {
            lobby: lobby.name.clone(),
            round: lobby.rounds_played,
            winner: winner.map(|p| p.username.clone()),
            winner_gold: winner.map_or(0, |p| p.gold),
            duration_secs: lobby.round_started.map_or(0, |t| t.elapsed().as_secs()),
            players: members.len(),
        };
        info!("Lobby '{}' finished: {}", lobby.name, summary);

        Some(RoundEnd {
            lobby: id,
            winner: winner.map(|p| p.id),
            summary,
        })
    }

    /// Live lobbies for GET_LOBBIES, oldest first.
    pub fn overview(&self) -> Vec<LobbyListing> {
        let handles: Vec<_> = self
            .table
            .read()
            .entries
            .values()
            .map(|e| e.lobby.clone())
            .collect();

        let mut listings: Vec<(LobbyId, LobbyListing)> = handles
            .iter()
            .filter_map(|handle| {
                let lobby = handle.lock();
                (!lobby.closed).then(|| {
                    (
                        lobby.id,
                        LobbyListing {
                            name: lobby.name.clone(),
                            members: lobby.members.len() as u32,
                            capacity: self.settings.max_members as u32,
                            state: lobby.state,
                        },
                    )
                })
            })
            .collect();
        listings.sort_by_key(|(id, _)| *id);
        listings.into_iter().map(|(_, listing)| listing).collect()
    }

    /// LOBBY_INFO packet describing `id`, if it still exists.
    pub fn info(&self, id: LobbyId) -> Option<Packet> {
        let handle = self.entry(id)?;
        let lobby = handle.lock();
        if lobby.closed {
            return None;
        }

        let members = self
            .players
            .snapshot(&lobby.members)
            .into_iter()
            .map(|p| LobbyMember {
                id: p.id,
                username: p.username,
                ready: p.ready,
            })
            .collect();
        Some(Packet::LobbyInfo {
            name: lobby.name.clone(),
            state: lobby.state,
            members,
        })
    }

    /// Member ids in join order, empty for unknown lobbies
    pub fn members(&self, id: LobbyId) -> Vec<PlayerId> {
        self.entry(id)
            .map(|handle| handle.lock().members.clone())
            .unwrap_or_default()
    }

    /// Lifecycle state of `id`, `None` once the lobby is gone
    pub fn state(&self, id: LobbyId) -> Option<LobbyState> {
        self.entry(id).map(|handle| handle.lock().state)
    }

    /// Extent that reported positions are clamped to
    pub fn bounds(&self, id: LobbyId) -> Option<WorldBounds> {
        self.entry(id).map(|handle| handle.lock().size.bounds())
    }

    /// The world of the round running in `id`.
    pub fn world_for_round(&self, id: LobbyId) -> DispatchResult<Arc<World>> {
        let handle = self.entry(id).ok_or(AuthorizationError::NotInLobby)?;
        let lobby = handle.lock();
        if lobby.state != LobbyState::InRound {
            return Err(StateConflictError::NoRoundActive.into());
        }
        Ok(lobby.world.clone())
    }

    pub fn len(&self) -> usize {
        self.table.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().entries.is_empty()
    }
}
