//! Player authority: the single writer of per-player state.
//!
//! Clients simulate their own movement and report it. The server keeps the
//! last reported position and velocity after coarse clamping, and owns the
//! values clients must not be able to forge (gold, lives, readiness, lobby
//! membership back-reference).

use crate::error::{AuthorizationError, DispatchError, StateConflictError};
use crate::lobby::LobbyId;
use log::{debug, info};
use parking_lot::RwLock;
use shared::{PlayerId, WorldBounds, DIG_BURST, DIG_DAMAGE_PER_SECOND, MAX_LIVES, MAX_VELOCITY};
use std::collections::HashMap;
use std::time::Instant;

/// Server side state of one logged in player
///
/// Position and velocity are whatever the client last reported, after
/// clamping. Gold, lives and readiness are only ever changed by the server.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub username: String,
    /// Back-reference to the lobby holding this player. Written by the lobby manager only.
    pub lobby: Option<LobbyId>,
    pub x: f32,
    pub y: f32,
    pub rotation_y: f32,
    pub current_velocity: (f32, f32),
    pub goal_velocity: (f32, f32),
    pub gold: u32,
    pub lives: u8,
    pub defeated: bool,
    pub ready: bool,
    pub last_active: Instant,
    /// Damage this player may still claim before the budget refills.
    pub dig_budget: f32,
    /// When `dig_budget` was last refilled.
    pub last_dig: Instant,
}

impl Player {
    pub fn new(id: PlayerId, username: &str) -> Self {
        Self {
            id,
            username: username.to_string(),
            lobby: None,
            x: 0.0,
            y: 0.0,
            rotation_y: 0.0,
            current_velocity: (0.0, 0.0),
            goal_velocity: (0.0, 0.0),
            gold: 0,
            lives: 0,
            defeated: false,
            ready: false,
            last_active: Instant::now(),
            dig_budget: DIG_BURST,
            last_dig: Instant::now(),
        }
    }
}

/// All players currently logged in, indexed by id
///
/// Every write to player state goes through this type. Reporters can only
/// change their own entry.
#[derive(Default)]
pub struct PlayerAuthority {
    players: RwLock<HashMap<PlayerId, Player>>,
}

fn own_player(reporter: PlayerId, target: PlayerId) -> Result<(), AuthorizationError> {
    if reporter != target {
        return Err(AuthorizationError::ForeignPlayer {
            actor: reporter,
            target,
        });
    }
    Ok(())
}

fn clamp_velocity(value: f32) -> f32 {
    value.clamp(-MAX_VELOCITY, MAX_VELOCITY)
}

impl PlayerAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a freshly logged in player with default state
    pub fn insert(&self, id: PlayerId, username: &str) {
        self.players.write().insert(id, Player::new(id, username));
    }

    /// Forgets a player on disconnect and returns their final state
    pub fn remove(&self, id: PlayerId) -> Option<Player> {
        let removed = self.players.write().remove(&id);
        if removed.is_some() {
            info!("Removed player {}", id);
        }
        removed
    }

    /// Snapshot of one player.
    pub fn get(&self, id: PlayerId) -> Option<Player> {
        self.players.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.players.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.read().is_empty()
    }

    /// The lobby `id` is in
    ///
    /// Unknown players get `NotLoggedIn`, players outside any lobby get
    /// `NotInLobby`. Lobby scoped requests use this as their entry check.
    pub fn lobby_of(&self, id: PlayerId) -> Result<LobbyId, AuthorizationError> {
        let players = self.players.read();
        let player = players.get(&id).ok_or(AuthorizationError::NotLoggedIn)?;
        player.lobby.ok_or(AuthorizationError::NotInLobby)
    }

    /// Records activity from `id` without changing anything else
    pub fn touch(&self, id: PlayerId) {
        if let Some(player) = self.players.write().get_mut(&id) {
            player.last_active = Instant::now();
        }
    }

    /// Stores a reported velocity pair and returns it after clamping.
    pub fn apply_velocity_update(
        &self,
        reporter: PlayerId,
        target: PlayerId,
        current: (f32, f32),
        goal: (f32, f32),
    ) -> Result<((f32, f32), (f32, f32)), AuthorizationError> {
        own_player(reporter, target)?;
        let mut players = self.players.write();
        let player = players
            .get_mut(&target)
            .ok_or(AuthorizationError::NotLoggedIn)?;

        player.current_velocity = (clamp_velocity(current.0), clamp_velocity(current.1));
        player.goal_velocity = (clamp_velocity(goal.0), clamp_velocity(goal.1));
        player.last_active = Instant::now();
        Ok((player.current_velocity, player.goal_velocity))
    }

    /// Stores a reported position clamped to `bounds`
    ///
    /// Returns the stored `(x, y, rotation_y)`, with the rotation brought into
    /// `[0, 360)`. This is what gets relayed to the other lobby members.
    pub fn apply_position_sync(
        &self,
        reporter: PlayerId,
        target: PlayerId,
        position: (f32, f32),
        rotation_y: f32,
        bounds: &WorldBounds,
    ) -> Result<(f32, f32, f32), AuthorizationError> {
        own_player(reporter, target)?;
        let mut players = self.players.write();
        let player = players
            .get_mut(&target)
            .ok_or(AuthorizationError::NotLoggedIn)?;

        let (x, y) = bounds.clamp(position.0, position.1);
        if (x, y) != position {
            debug!(
                "Clamped position of player {} from {:?} to {:?}",
                target,
                position,
                (x, y)
            );
        }
        player.x = x;
        player.y = y;
        player.rotation_y = rotation_y.rem_euclid(360.0);
        player.last_active = Instant::now();
        Ok((x, y, player.rotation_y))
    }

    /// Grants as much of a claimed dig `amount` as the player's budget allows
    ///
    /// The budget refills at `DIG_DAMAGE_PER_SECOND` up to `DIG_BURST`, so
    /// sending damage reports faster than the dig interval does not dig
    /// faster. Returns the damage to apply, possibly zero.
    pub fn claim_dig(
        &self,
        id: PlayerId,
        amount: f32,
        now: Instant,
    ) -> Result<f32, AuthorizationError> {
        let mut players = self.players.write();
        let player = players.get_mut(&id).ok_or(AuthorizationError::NotLoggedIn)?;

        let elapsed = now.saturating_duration_since(player.last_dig).as_secs_f32();
        player.dig_budget = (player.dig_budget + elapsed * DIG_DAMAGE_PER_SECOND).min(DIG_BURST);
        player.last_dig = now;

        let granted = amount.clamp(0.0, player.dig_budget);
        player.dig_budget -= granted;
        if granted < amount {
            debug!("Player {} digs too fast, granted {} of {}", id, granted, amount);
        }
        Ok(granted)
    }

    /// Adds gold and returns the new total. Only block destruction calls this.
    pub(crate) fn credit_gold(&self, id: PlayerId, amount: u32) -> Option<u32> {
        let mut players = self.players.write();
        let player = players.get_mut(&id)?;
        player.gold = player.gold.saturating_add(amount);
        Some(player.gold)
    }

    pub fn set_defeated(&self, id: PlayerId, defeated: bool) -> Result<(), AuthorizationError> {
        let mut players = self.players.write();
        let player = players.get_mut(&id).ok_or(AuthorizationError::NotLoggedIn)?;
        player.defeated = defeated;
        if defeated {
            player.lives = 0;
        }
        Ok(())
    }

    /// Applies a reported life gain or loss and returns (lives, defeated).
    ///
    /// A defeated player stays defeated until the next round.
    pub fn apply_life_change(
        &self,
        reporter: PlayerId,
        delta: i8,
    ) -> Result<(u8, bool), AuthorizationError> {
        let mut players = self.players.write();
        let player = players
            .get_mut(&reporter)
            .ok_or(AuthorizationError::NotLoggedIn)?;

        if !player.defeated {
            let lives = (player.lives as i16 + delta as i16).clamp(0, MAX_LIVES as i16);
            player.lives = lives as u8;
            if player.lives == 0 {
                player.defeated = true;
                info!("Player {} was defeated", reporter);
            }
        }
        Ok((player.lives, player.defeated))
    }

    /// Sets the lobby back-reference if the player is in no lobby yet.
    pub(crate) fn claim_lobby(&self, id: PlayerId, lobby: LobbyId) -> Result<(), DispatchError> {
        let mut players = self.players.write();
        let player = players.get_mut(&id).ok_or(AuthorizationError::NotLoggedIn)?;
        if player.lobby.is_some() {
            return Err(StateConflictError::AlreadyInLobby.into());
        }
        player.lobby = Some(lobby);
        player.ready = false;
        Ok(())
    }

    pub(crate) fn release_lobby(&self, id: PlayerId) {
        if let Some(player) = self.players.write().get_mut(&id) {
            player.lobby = None;
            player.ready = false;
        }
    }

    pub(crate) fn set_ready(&self, id: PlayerId, ready: bool) {
        if let Some(player) = self.players.write().get_mut(&id) {
            player.ready = ready;
        }
    }

    pub(crate) fn is_ready(&self, id: PlayerId) -> bool {
        self.players.read().get(&id).map_or(false, |p| p.ready)
    }

    /// Clears round results for a new round.
    pub(crate) fn reset_for_round(&self, ids: &[PlayerId], lives: u8) {
        let mut players = self.players.write();
        for id in ids {
            if let Some(player) = players.get_mut(id) {
                player.gold = 0;
                player.lives = lives;
                player.defeated = false;
                player.dig_budget = DIG_BURST;
            }
        }
    }

    /// Snapshots of the given players, skipping unknown ids, in the given order.
    pub fn snapshot(&self, ids: &[PlayerId]) -> Vec<Player> {
        let players = self.players.read();
        ids.iter().filter_map(|id| players.get(id).cloned()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::MapSize;
    use std::time::Duration;

    fn authority_with(ids: &[(PlayerId, &str)]) -> PlayerAuthority {
        let authority = PlayerAuthority::new();
        for (id, name) in ids {
            authority.insert(*id, name);
        }
        authority
    }

    #[test]
    fn test_player_creation() {
        let player = Player::new(1, "Alice");
        assert_eq!(player.id, 1);
        assert_eq!(player.username, "Alice");
        assert_eq!(player.lobby, None);
        assert_eq!(player.gold, 0);
        assert!(!player.ready);
        assert!(!player.defeated);
    }

    #[test]
    fn test_position_sync_clamps_to_world() {
        let authority = authority_with(&[(1, "Alice")]);
        let bounds = MapSize::Small.bounds();

        let (x, y, rotation_y) = authority
            .apply_position_sync(1, 1, (-50.0, 5000.0), 450.0, &bounds)
            .unwrap();
        assert_approx_eq!(x, bounds.min_x);
        assert_approx_eq!(y, bounds.max_y);
        assert_approx_eq!(rotation_y, 90.0);

        let player = authority.get(1).unwrap();
        assert_approx_eq!(player.rotation_y, 90.0);
    }

    #[test]
    fn test_position_sync_inside_world_is_kept() {
        let authority = authority_with(&[(1, "Alice")]);
        let bounds = MapSize::Small.bounds();

        let stored = authority
            .apply_position_sync(1, 1, (30.0, -12.0), 0.0, &bounds)
            .unwrap();
        assert_eq!(stored, (30.0, -12.0, 0.0));
    }

    #[test]
    fn test_cannot_move_another_player() {
        let authority = authority_with(&[(1, "Alice"), (2, "Bob")]);
        let bounds = MapSize::Small.bounds();

        let result = authority.apply_position_sync(1, 2, (10.0, 10.0), 0.0, &bounds);
        assert_eq!(
            result,
            Err(AuthorizationError::ForeignPlayer {
                actor: 1,
                target: 2
            })
        );
        assert_eq!(authority.get(2).unwrap().x, 0.0);

        let result = authority.apply_velocity_update(2, 1, (1.0, 1.0), (1.0, 1.0));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_player_not_logged_in() {
        let authority = PlayerAuthority::new();
        let result = authority.apply_velocity_update(9, 9, (0.0, 0.0), (0.0, 0.0));
        assert_eq!(result, Err(AuthorizationError::NotLoggedIn));
        assert_eq!(authority.lobby_of(9), Err(AuthorizationError::NotLoggedIn));
    }

    #[test]
    fn test_velocity_clamped() {
        let authority = authority_with(&[(1, "Alice")]);
        let (current, goal) = authority
            .apply_velocity_update(1, 1, (1000.0, -1000.0), (5.0, -5.0))
            .unwrap();
        assert_approx_eq!(current.0, MAX_VELOCITY);
        assert_approx_eq!(current.1, -MAX_VELOCITY);
        assert_approx_eq!(goal.0, 5.0);
    }

    #[test]
    fn test_credit_gold_accumulates() {
        let authority = authority_with(&[(1, "Alice")]);
        assert_eq!(authority.credit_gold(1, 100), Some(100));
        assert_eq!(authority.credit_gold(1, 50), Some(150));
        assert_eq!(authority.credit_gold(2, 50), None);
    }

    #[test]
    fn test_life_change_defeats_at_zero() {
        let authority = authority_with(&[(1, "Alice")]);
        authority.reset_for_round(&[1], 2);

        assert_eq!(authority.apply_life_change(1, -1), Ok((1, false)));
        assert_eq!(authority.apply_life_change(1, -1), Ok((0, true)));
        // Stays down for the rest of the round.
        assert_eq!(authority.apply_life_change(1, 1), Ok((0, true)));

        authority.reset_for_round(&[1], 2);
        assert!(!authority.get(1).unwrap().defeated);
    }

    #[test]
    fn test_life_change_capped() {
        let authority = authority_with(&[(1, "Alice")]);
        authority.reset_for_round(&[1], MAX_LIVES);
        assert_eq!(authority.apply_life_change(1, 1), Ok((MAX_LIVES, false)));
    }

    #[test]
    fn test_set_defeated() {
        let authority = authority_with(&[(1, "Alice")]);
        authority.reset_for_round(&[1], 2);
        authority.set_defeated(1, true).unwrap();
        let player = authority.get(1).unwrap();
        assert!(player.defeated);
        assert_eq!(player.lives, 0);
    }

    #[test]
    fn test_claim_lobby_once() {
        let authority = authority_with(&[(1, "Alice")]);
        authority.claim_lobby(1, 10).unwrap();
        assert_eq!(authority.lobby_of(1), Ok(10));
        assert_eq!(
            authority.claim_lobby(1, 11),
            Err(StateConflictError::AlreadyInLobby.into())
        );

        authority.release_lobby(1);
        assert_eq!(authority.lobby_of(1), Err(AuthorizationError::NotInLobby));
    }

    #[test]
    fn test_snapshot_preserves_order() {
        let authority = authority_with(&[(1, "Alice"), (2, "Bob"), (3, "Carol")]);
        let names: Vec<String> = authority
            .snapshot(&[3, 1, 42])
            .into_iter()
            .map(|p| p.username)
            .collect();
        assert_eq!(names, vec!["Carol", "Alice"]);
    }

    #[test]
    fn test_dig_budget_limits_burst() {
        let authority = authority_with(&[(1, "Alice")]);
        let now = authority.get(1).unwrap().last_dig;

        assert_approx_eq!(authority.claim_dig(1, 8.0, now).unwrap(), 8.0);
        assert_approx_eq!(authority.claim_dig(1, 8.0, now).unwrap(), 8.0);
        assert_approx_eq!(authority.claim_dig(1, 8.0, now).unwrap(), 0.0);
    }

    #[test]
    fn test_dig_budget_refills_over_time() {
        let authority = authority_with(&[(1, "Alice")]);
        let start = authority.get(1).unwrap().last_dig;
        authority.claim_dig(1, 8.0, start).unwrap();
        authority.claim_dig(1, 8.0, start).unwrap();

        // One dig interval later exactly one full report is allowed again.
        let later = start + Duration::from_millis(200);
        assert_approx_eq!(authority.claim_dig(1, 8.0, later).unwrap(), 8.0);
        assert_approx_eq!(authority.claim_dig(1, 8.0, later).unwrap(), 0.0);

        // A long pause never banks more than the burst.
        let much_later = later + Duration::from_secs(60);
        let total: f32 = (0..4)
            .map(|_| authority.claim_dig(1, 8.0, much_later).unwrap())
            .sum();
        assert_approx_eq!(total, DIG_BURST);
    }

    #[test]
    fn test_dig_budget_refilled_for_new_round() {
        let authority = authority_with(&[(1, "Alice")]);
        let now = authority.get(1).unwrap().last_dig;
        authority.claim_dig(1, DIG_BURST, now).unwrap();

        authority.reset_for_round(&[1], 2);
        assert_approx_eq!(authority.claim_dig(1, 8.0, now).unwrap(), 8.0);
        assert_eq!(
            authority.claim_dig(2, 8.0, now),
            Err(AuthorizationError::NotLoggedIn)
        );
    }
}
