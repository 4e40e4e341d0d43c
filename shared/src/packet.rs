//! Packet kinds and their field-level validation rules.

use crate::{
    is_extended_ascii, ItemKind, LobbyState, MapSize, PlayerId, MAX_DAMAGE_PER_PACKET,
    MAX_LOBBY_NAME_LEN, MAX_USERNAME_LEN, MIN_USERNAME_LEN,
};
use thiserror::Error;

/// Which side of the connection is allowed to send a packet kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ServerBound,
    ClientBound,
}

/// Closed set of wire message kinds, each identified by a 5 character tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Login,
    LoginSuccessful,
    Disconnect,
    CreateLobby,
    CreateLobbyStatus,
    JoinLobby,
    JoinLobbyStatus,
    LeaveLobby,
    GetLobbies,
    LobbyOverview,
    LobbyInfo,
    Ready,
    StartRound,
    GameOver,
    PositionSync,
    PositionUpdate,
    Velocity,
    VelocityUpdate,
    BlockDamage,
    BlockDestroyed,
    GoldUpdate,
    SpawnItem,
    LifeChange,
    LifeStatus,
    GetHistory,
    History,
    Error,
}

impl PacketType {
    pub const ALL: [PacketType; 27] = [
        PacketType::Login,
        PacketType::LoginSuccessful,
        PacketType::Disconnect,
        PacketType::CreateLobby,
        PacketType::CreateLobbyStatus,
        PacketType::JoinLobby,
        PacketType::JoinLobbyStatus,
        PacketType::LeaveLobby,
        PacketType::GetLobbies,
        PacketType::LobbyOverview,
        PacketType::LobbyInfo,
        PacketType::Ready,
        PacketType::StartRound,
        PacketType::GameOver,
        PacketType::PositionSync,
        PacketType::PositionUpdate,
        PacketType::Velocity,
        PacketType::VelocityUpdate,
        PacketType::BlockDamage,
        PacketType::BlockDestroyed,
        PacketType::GoldUpdate,
        PacketType::SpawnItem,
        PacketType::LifeChange,
        PacketType::LifeStatus,
        PacketType::GetHistory,
        PacketType::History,
        PacketType::Error,
    ];

    /// Tag used when the offending packet's own tag can't be trusted.
    pub const INVALID_TAG: &'static str = "INVAL";

    pub fn tag(&self) -> &'static str {
        match self {
            PacketType::Login => "PLOGI",
            PacketType::LoginSuccessful => "PLOGS",
            PacketType::Disconnect => "DISCP",
            PacketType::CreateLobby => "LOBCR",
            PacketType::CreateLobbyStatus => "LOBCS",
            PacketType::JoinLobby => "LOBJO",
            PacketType::JoinLobbyStatus => "LOBJS",
            PacketType::LeaveLobby => "LOBLE",
            PacketType::GetLobbies => "LOBGE",
            PacketType::LobbyOverview => "LOBOV",
            PacketType::LobbyInfo => "LOBIN",
            PacketType::Ready => "READY",
            PacketType::StartRound => "STARN",
            PacketType::GameOver => "GAMOV",
            PacketType::PositionSync => "POSIT",
            PacketType::PositionUpdate => "POSUP",
            PacketType::Velocity => "VELOC",
            PacketType::VelocityUpdate => "VELUP",
            PacketType::BlockDamage => "BLDMG",
            PacketType::BlockDestroyed => "BLDES",
            PacketType::GoldUpdate => "GOLDU",
            PacketType::SpawnItem => "ITEMS",
            PacketType::LifeChange => "LIFEC",
            PacketType::LifeStatus => "LIFES",
            PacketType::GetHistory => "HISGE",
            PacketType::History => "HISTO",
            PacketType::Error => "ERROR",
        }
    }

    /// Looks a tag up by value.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.tag() == tag)
    }

    pub fn direction(&self) -> Direction {
        match self {
            PacketType::Login
            | PacketType::Disconnect
            | PacketType::CreateLobby
            | PacketType::JoinLobby
            | PacketType::LeaveLobby
            | PacketType::GetLobbies
            | PacketType::Ready
            | PacketType::PositionSync
            | PacketType::Velocity
            | PacketType::BlockDamage
            | PacketType::LifeChange
            | PacketType::GetHistory => Direction::ServerBound,
            _ => Direction::ClientBound,
        }
    }
}

/// Outcome carried by the status packets.
///
/// On the wire a success is the literal prefix `OK` followed by an optional
/// detail; anything else is a human readable error.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Ok(String),
    Err(String),
}

impl Status {
    pub const OK_PREFIX: &'static str = "OK";

    pub fn ok() -> Self {
        Status::Ok(String::new())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok(_))
    }

    pub fn to_field(&self) -> String {
        match self {
            Status::Ok(detail) => format!("{}{}", Self::OK_PREFIX, detail),
            Status::Err(message) => message.clone(),
        }
    }

    pub fn from_field(field: &str) -> Self {
        match field.strip_prefix(Self::OK_PREFIX) {
            Some(detail) => Status::Ok(detail.to_string()),
            None => Status::Err(field.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LobbyMember {
    pub id: PlayerId,
    pub username: String,
    pub ready: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LobbyListing {
    pub name: String,
    pub members: u32,
    pub capacity: u32,
    pub state: LobbyState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Login {
        username: String,
    },
    LoginSuccessful {
        player_id: PlayerId,
    },
    Disconnect,

    CreateLobby {
        name: String,
        size: MapSize,
    },
    CreateLobbyStatus {
        status: Status,
    },
    JoinLobby {
        name: String,
    },
    JoinLobbyStatus {
        status: Status,
    },
    LeaveLobby,
    GetLobbies,
    LobbyOverview {
        lobbies: Vec<LobbyListing>,
    },
    LobbyInfo {
        name: String,
        state: LobbyState,
        members: Vec<LobbyMember>,
    },

    Ready,
    StartRound {
        size: MapSize,
        seed: u64,
    },
    GameOver {
        winner: Option<PlayerId>,
    },

    PositionSync {
        x: f32,
        y: f32,
        rotation_y: f32,
    },
    PositionUpdate {
        player_id: PlayerId,
        x: f32,
        y: f32,
        rotation_y: f32,
    },
    Velocity {
        current_x: f32,
        current_y: f32,
        goal_x: f32,
        goal_y: f32,
    },
    VelocityUpdate {
        player_id: PlayerId,
        current_x: f32,
        current_y: f32,
        goal_x: f32,
        goal_y: f32,
    },

    BlockDamage {
        grid_x: i32,
        grid_y: i32,
        damage: f32,
    },
    BlockDestroyed {
        grid_x: i32,
        grid_y: i32,
        player_id: PlayerId,
    },
    GoldUpdate {
        player_id: PlayerId,
        gold: u32,
    },
    SpawnItem {
        item: ItemKind,
        x: f32,
        y: f32,
        player_id: PlayerId,
    },
    LifeChange {
        delta: i8,
    },
    LifeStatus {
        player_id: PlayerId,
        lives: u8,
    },

    GetHistory,
    History {
        status: Status,
    },

    /// Rejection of a packet, `tag` names the packet that caused it.
    Error {
        tag: String,
        message: String,
    },
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Login { .. } => PacketType::Login,
            Packet::LoginSuccessful { .. } => PacketType::LoginSuccessful,
            Packet::Disconnect => PacketType::Disconnect,
            Packet::CreateLobby { .. } => PacketType::CreateLobby,
            Packet::CreateLobbyStatus { .. } => PacketType::CreateLobbyStatus,
            Packet::JoinLobby { .. } => PacketType::JoinLobby,
            Packet::JoinLobbyStatus { .. } => PacketType::JoinLobbyStatus,
            Packet::LeaveLobby => PacketType::LeaveLobby,
            Packet::GetLobbies => PacketType::GetLobbies,
            Packet::LobbyOverview { .. } => PacketType::LobbyOverview,
            Packet::LobbyInfo { .. } => PacketType::LobbyInfo,
            Packet::Ready => PacketType::Ready,
            Packet::StartRound { .. } => PacketType::StartRound,
            Packet::GameOver { .. } => PacketType::GameOver,
            Packet::PositionSync { .. } => PacketType::PositionSync,
            Packet::PositionUpdate { .. } => PacketType::PositionUpdate,
            Packet::Velocity { .. } => PacketType::Velocity,
            Packet::VelocityUpdate { .. } => PacketType::VelocityUpdate,
            Packet::BlockDamage { .. } => PacketType::BlockDamage,
            Packet::BlockDestroyed { .. } => PacketType::BlockDestroyed,
            Packet::GoldUpdate { .. } => PacketType::GoldUpdate,
            Packet::SpawnItem { .. } => PacketType::SpawnItem,
            Packet::LifeChange { .. } => PacketType::LifeChange,
            Packet::LifeStatus { .. } => PacketType::LifeStatus,
            Packet::GetHistory => PacketType::GetHistory,
            Packet::History { .. } => PacketType::History,
            Packet::Error { .. } => PacketType::Error,
        }
    }

    pub fn error(kind: PacketType, message: impl Into<String>) -> Self {
        Packet::Error {
            tag: kind.tag().to_string(),
            message: message.into(),
        }
    }

    /// Checks every field rule of this packet kind and reports all violations.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut rules = Rules::default();

        match self {
            Packet::Login { username } => {
                rules.name("username", username, MIN_USERNAME_LEN, MAX_USERNAME_LEN)
            }
            Packet::CreateLobby { name, .. } | Packet::JoinLobby { name } => {
                rules.name("lobby name", name, 1, MAX_LOBBY_NAME_LEN)
            }
            Packet::CreateLobbyStatus { status }
            | Packet::JoinLobbyStatus { status }
            | Packet::History { status } => rules.status("status", status),
            Packet::LobbyOverview { lobbies } => {
                for lobby in lobbies {
                    rules.name("lobby name", &lobby.name, 1, MAX_LOBBY_NAME_LEN);
                    rules.check(lobby.members <= lobby.capacity, || {
                        format!("lobby '{}' has more members than capacity", lobby.name)
                    });
                }
            }
            Packet::LobbyInfo { name, members, .. } => {
                rules.name("lobby name", name, 1, MAX_LOBBY_NAME_LEN);
                for member in members {
                    rules.name("username", &member.username, MIN_USERNAME_LEN, MAX_USERNAME_LEN);
                }
            }
            Packet::PositionSync { x, y, rotation_y }
            | Packet::PositionUpdate {
                x, y, rotation_y, ..
            } => {
                rules.finite("x", *x);
                rules.finite("y", *y);
                rules.finite("rotation", *rotation_y);
            }
            Packet::Velocity {
                current_x,
                current_y,
                goal_x,
                goal_y,
            }
            | Packet::VelocityUpdate {
                current_x,
                current_y,
                goal_x,
                goal_y,
                ..
            } => {
                rules.finite("current velocity x", *current_x);
                rules.finite("current velocity y", *current_y);
                rules.finite("goal velocity x", *goal_x);
                rules.finite("goal velocity y", *goal_y);
            }
            Packet::BlockDamage {
                grid_x,
                grid_y,
                damage,
            } => {
                rules.grid("grid x", *grid_x);
                rules.grid("grid y", *grid_y);
                rules.finite("damage", *damage);
                rules.check(*damage >= 0.0, || "damage must not be negative".to_string());
                rules.check(*damage <= MAX_DAMAGE_PER_PACKET, || {
                    format!("damage must be at most {} per report", MAX_DAMAGE_PER_PACKET)
                });
            }
            Packet::BlockDestroyed { grid_x, grid_y, .. } => {
                rules.grid("grid x", *grid_x);
                rules.grid("grid y", *grid_y);
            }
            Packet::SpawnItem { x, y, .. } => {
                rules.finite("x", *x);
                rules.finite("y", *y);
            }
            Packet::LifeChange { delta } => {
                rules.check(*delta == 1 || *delta == -1, || {
                    format!("life change must be -1 or 1, got {}", delta)
                });
            }
            Packet::Error { tag, message } => {
                rules.check(
                    tag.len() == 5 && tag.chars().all(|c| c.is_ascii_uppercase()),
                    || format!("'{}' is not a packet tag", tag),
                );
                rules.text("message", message);
                rules.check(!message.is_empty(), || "error message is empty".to_string());
            }
            Packet::LoginSuccessful { .. }
            | Packet::Disconnect
            | Packet::LeaveLobby
            | Packet::GetLobbies
            | Packet::Ready
            | Packet::StartRound { .. }
            | Packet::GameOver { .. }
            | Packet::GoldUpdate { .. }
            | Packet::LifeStatus { .. }
            | Packet::GetHistory => {}
        }

        rules.finish()
    }
}

/// Every rule violation found in one packet.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", .0.join("; "))]
pub struct ValidationErrors(pub Vec<String>);

#[derive(Default)]
struct Rules {
    errors: Vec<String>,
}

impl Rules {
    fn check(&mut self, ok: bool, message: impl FnOnce() -> String) {
        if !ok {
            self.errors.push(message());
        }
    }

    fn text(&mut self, field: &str, value: &str) {
        self.check(is_extended_ascii(value), || {
            format!("{} must be extended ASCII", field)
        });
        self.check(!value.contains(['\n', '\r']), || {
            format!("{} must not contain line breaks", field)
        });
    }

    fn name(&mut self, field: &str, value: &str, min: usize, max: usize) {
        self.text(field, value);
        let len = value.chars().count();
        self.check((min..=max).contains(&len), || {
            format!("{} must be {} to {} characters", field, min, max)
        });
        self.check(value.trim() == value, || {
            format!("{} must not start or end with whitespace", field)
        });
    }

    fn finite(&mut self, field: &str, value: f32) {
        self.check(value.is_finite(), || format!("{} must be a finite number", field));
    }

    fn grid(&mut self, field: &str, value: i32) {
        self.check(value >= 0, || format!("{} must not be negative", field));
    }

    fn status(&mut self, field: &str, status: &Status) {
        match status {
            Status::Ok(detail) => self.text(field, detail),
            Status::Err(message) => {
                self.text(field, message);
                self.check(!message.is_empty(), || format!("{} is empty", field));
                self.check(!message.starts_with(Status::OK_PREFIX), || {
                    format!("{} error must not start with OK", field)
                });
            }
        }
    }

    fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(self.errors))
        }
    }
}
