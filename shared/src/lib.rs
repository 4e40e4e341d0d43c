//! Types and protocol shared by the mining game server and its clients.
//!
//! Everything that travels on the wire lives here: the tagged [`Packet`] enum,
//! the line codec in [`codec`], the enumerations referenced by packet fields
//! and the deterministic map layout both sides build from a round seed.

pub mod codec;
pub mod map;
pub mod packet;

pub use codec::{decode, encode, DecodeError, EncodeError, FIELD_SEPARATOR};
pub use map::MapLayout;
pub use packet::{
    Direction, LobbyListing, LobbyMember, Packet, PacketType, Status, ValidationErrors,
};

pub type PlayerId = u32;

/// Edge length of one grid cell in world units.
pub const BLOCK_SIZE: f32 = 6.0;
/// How far above the surface (y = 0) a player may be reported.
pub const SKY_HEIGHT: f32 = 60.0;
/// Per-axis velocity bound accepted from clients.
pub const MAX_VELOCITY: f32 = 100.0;

pub const DIG_DAMAGE_PER_SECOND: f32 = 40.0;
/// Seconds between two damage reports for the same block.
pub const DIG_INTERVAL: f32 = 0.2;
/// Upper bound on the damage a single BLOCK_DAMAGE packet may claim.
pub const MAX_DAMAGE_PER_PACKET: f32 = DIG_DAMAGE_PER_SECOND * DIG_INTERVAL;
/// Dig damage a player may bank while no reports arrive. Two reports' worth,
/// so a late report followed by an early one is still honoured in full.
pub const DIG_BURST: f32 = 2.0 * MAX_DAMAGE_PER_PACKET;
pub const POSITION_SYNC_INTERVAL: f32 = 1.0;

/// Blocks at or above this hardness cannot be damaged.
pub const INDESTRUCTIBLE_HARDNESS: f32 = 100.0;

pub const MAX_LIVES: u8 = 4;

pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 16;
pub const MAX_LOBBY_NAME_LEN: usize = 24;

/// Terrain kind of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Air,
    Grass,
    Dirt,
    Stone,
    Gold,
    /// Mystery block, rolls for an item drop when destroyed.
    Qmark,
    Obsidian,
}

impl BlockKind {
    pub fn base_hardness(&self) -> f32 {
        match self {
            BlockKind::Air => 0.0,
            BlockKind::Grass => 8.0,
            BlockKind::Dirt => 10.0,
            BlockKind::Stone => 25.0,
            BlockKind::Gold => 30.0,
            BlockKind::Qmark => 10.0,
            BlockKind::Obsidian => INDESTRUCTIBLE_HARDNESS,
        }
    }

    pub fn is_solid(&self) -> bool {
        !matches!(self, BlockKind::Air)
    }

    /// Gold paid out for destroying a block of this kind at grid row `depth`.
    pub fn reward_at(&self, depth: usize) -> u32 {
        match self {
            BlockKind::Gold => 50 + depth as u32 * 5,
            _ => 0,
        }
    }
}

/// Items that can drop out of a mystery block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Dynamite,
    Heart,
    Star,
    Ice,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Dynamite => "dynamite",
            ItemKind::Heart => "heart",
            ItemKind::Star => "star",
            ItemKind::Ice => "ice",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "dynamite" => Some(ItemKind::Dynamite),
            "heart" => Some(ItemKind::Heart),
            "star" => Some(ItemKind::Star),
            "ice" => Some(ItemKind::Ice),
            _ => None,
        }
    }
}

/// Requested world size when creating a lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapSize {
    Small,
    Medium,
    Large,
}

impl MapSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapSize::Small => "s",
            MapSize::Medium => "m",
            MapSize::Large => "l",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "s" => Some(MapSize::Small),
            "m" => Some(MapSize::Medium),
            "l" => Some(MapSize::Large),
            _ => None,
        }
    }

    /// Grid dimensions as (width, height) in blocks.
    pub fn dimensions(&self) -> (usize, usize) {
        match self {
            MapSize::Small => (40, 60),
            MapSize::Medium => (60, 90),
            MapSize::Large => (80, 120),
        }
    }

    pub fn bounds(&self) -> WorldBounds {
        let (width, height) = self.dimensions();
        WorldBounds {
            min_x: 0.0,
            max_x: width as f32 * BLOCK_SIZE,
            min_y: -(height as f32) * BLOCK_SIZE,
            max_y: SKY_HEIGHT,
        }
    }
}

/// Lifecycle of a lobby as announced to its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LobbyState {
    Waiting,
    ReadyCheck,
    InRound,
    Ended,
}

impl LobbyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LobbyState::Waiting => "WAITING",
            LobbyState::ReadyCheck => "READY_CHECK",
            LobbyState::InRound => "IN_ROUND",
            LobbyState::Ended => "ENDED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "WAITING" => Some(LobbyState::Waiting),
            "READY_CHECK" => Some(LobbyState::ReadyCheck),
            "IN_ROUND" => Some(LobbyState::InRound),
            "ENDED" => Some(LobbyState::Ended),
            _ => None,
        }
    }
}

/// Axis-aligned extent of a lobby world in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl WorldBounds {
    pub fn clamp(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x.clamp(self.min_x, self.max_x),
            y.clamp(self.min_y, self.max_y),
        )
    }
}

/// World position of the top-left corner of grid cell (x, y). Rows grow downwards.
pub fn grid_to_world(grid_x: usize, grid_y: usize) -> (f32, f32) {
    (grid_x as f32 * BLOCK_SIZE, -(grid_y as f32) * BLOCK_SIZE)
}

/// True when every character fits in a single byte (ISO-8859-1).
pub fn is_extended_ascii(text: &str) -> bool {
    text.chars().all(|c| (c as u32) <= 0xFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_max_damage_per_packet() {
        assert_approx_eq!(MAX_DAMAGE_PER_PACKET, 8.0, 1e-5);
    }

    #[test]
    fn test_block_hardness_ordering() {
        assert_eq!(BlockKind::Air.base_hardness(), 0.0);
        assert!(BlockKind::Stone.base_hardness() > BlockKind::Dirt.base_hardness());
        assert!(BlockKind::Obsidian.base_hardness() >= INDESTRUCTIBLE_HARDNESS);
        assert!(!BlockKind::Air.is_solid());
        assert!(BlockKind::Qmark.is_solid());
    }

    #[test]
    fn test_gold_reward_grows_with_depth() {
        assert_eq!(BlockKind::Dirt.reward_at(30), 0);
        assert!(BlockKind::Gold.reward_at(40) > BlockKind::Gold.reward_at(2));
    }

    #[test]
    fn test_item_kind_names() {
        for item in [ItemKind::Dynamite, ItemKind::Heart, ItemKind::Star, ItemKind::Ice] {
            assert_eq!(ItemKind::parse(item.as_str()), Some(item));
        }
        assert_eq!(ItemKind::parse("torch"), None);
    }

    #[test]
    fn test_lobby_state_names() {
        assert_eq!(LobbyState::parse("IN_ROUND"), Some(LobbyState::InRound));
        assert_eq!(LobbyState::parse("in_round"), None);
    }

    #[test]
    fn test_world_bounds_clamp() {
        let bounds = MapSize::Small.bounds();
        let (x, y) = bounds.clamp(-5.0, 1000.0);
        assert_approx_eq!(x, 0.0);
        assert_approx_eq!(y, SKY_HEIGHT);

        let (x, y) = bounds.clamp(10_000.0, -10_000.0);
        assert_approx_eq!(x, 40.0 * BLOCK_SIZE);
        assert_approx_eq!(y, -60.0 * BLOCK_SIZE);
    }

    #[test]
    fn test_grid_to_world() {
        let (x, y) = grid_to_world(3, 2);
        assert_approx_eq!(x, 3.0 * BLOCK_SIZE);
        assert_approx_eq!(y, -2.0 * BLOCK_SIZE);
    }

    #[test]
    fn test_extended_ascii() {
        assert!(is_extended_ascii("Jörg"));
        assert!(is_extended_ascii(""));
        assert!(!is_extended_ascii("a║b"));
        assert!(!is_extended_ascii("日本"));
    }
}
