//! Line codec for [`Packet`]s.
//!
//! A frame is one line: the fixed width type tag directly followed by the
//! packet's fields, joined with [`FIELD_SEPARATOR`]. Framing (the trailing
//! newline) is handled by the transport, [`decode`] tolerates it anyway.

use crate::packet::{LobbyListing, LobbyMember, Packet, PacketType, Status};
use crate::{is_extended_ascii, ItemKind, LobbyState, MapSize};
use std::str::FromStr;
use thiserror::Error;

/// Reserved between fields. Never valid inside a field since it is outside
/// the extended ASCII range.
pub const FIELD_SEPARATOR: char = '║';
pub const TAG_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("{tag}: field '{field}' must be extended ASCII without line breaks")]
    InvalidText {
        tag: &'static str,
        field: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("empty packet")]
    Empty,

    #[error("packet is not valid UTF-8")]
    InvalidUtf8,

    #[error("unknown packet type '{0}'")]
    UnknownTag(String),

    #[error("{tag} expects {expected} fields, found {found}")]
    FieldCount {
        tag: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{tag} list fields come in groups of {stride}, found {found}")]
    RaggedList {
        tag: &'static str,
        stride: usize,
        found: usize,
    },

    #[error("{tag}: field '{field}' is not a valid number: '{value}'")]
    InvalidNumber {
        tag: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("{tag}: field '{field}' has unexpected value '{value}'")]
    InvalidValue {
        tag: &'static str,
        field: &'static str,
        value: String,
    },
}

impl DecodeError {
    /// Tag to reference in the rejection sent back to the peer.
    pub fn reply_tag(&self) -> &'static str {
        match self {
            DecodeError::FieldCount { tag, .. }
            | DecodeError::RaggedList { tag, .. }
            | DecodeError::InvalidNumber { tag, .. }
            | DecodeError::InvalidValue { tag, .. } => tag,
            _ => PacketType::INVALID_TAG,
        }
    }
}

/// Serializes a packet into one line, without the trailing newline.
pub fn encode(packet: &Packet) -> Result<Vec<u8>, EncodeError> {
    let mut out = FieldWriter::new(packet.packet_type());

    match packet {
        Packet::Login { username } => out.text("username", username)?,
        Packet::LoginSuccessful { player_id } => out.value(player_id),
        Packet::CreateLobby { name, size } => {
            out.text("name", name)?;
            out.value(size.as_str());
        }
        Packet::CreateLobbyStatus { status }
        | Packet::JoinLobbyStatus { status }
        | Packet::History { status } => out.text("status", &status.to_field())?,
        Packet::JoinLobby { name } => out.text("name", name)?,
        Packet::LobbyOverview { lobbies } => {
            for lobby in lobbies {
                out.text("name", &lobby.name)?;
                out.value(lobby.members);
                out.value(lobby.capacity);
                out.value(lobby.state.as_str());
            }
        }
        Packet::LobbyInfo {
            name,
            state,
            members,
        } => {
            out.text("name", name)?;
            out.value(state.as_str());
            for member in members {
                out.value(member.id);
                out.text("username", &member.username)?;
                out.value(member.ready);
            }
        }
        Packet::StartRound { size, seed } => {
            out.value(size.as_str());
            out.value(seed);
        }
        Packet::GameOver { winner } => {
            if let Some(winner) = winner {
                out.value(winner);
            }
        }
        Packet::PositionSync { x, y, rotation_y } => {
            out.value(x);
            out.value(y);
            out.value(rotation_y);
        }
        Packet::PositionUpdate {
            player_id,
            x,
            y,
            rotation_y,
        } => {
            out.value(player_id);
            out.value(x);
            out.value(y);
            out.value(rotation_y);
        }
        Packet::Velocity {
            current_x,
            current_y,
            goal_x,
            goal_y,
        } => {
            out.value(current_x);
            out.value(current_y);
            out.value(goal_x);
            out.value(goal_y);
        }
        Packet::VelocityUpdate {
            player_id,
            current_x,
            current_y,
            goal_x,
            goal_y,
        } => {
            out.value(player_id);
            out.value(current_x);
            out.value(current_y);
            out.value(goal_x);
            out.value(goal_y);
        }
        Packet::BlockDamage {
            grid_x,
            grid_y,
            damage,
        } => {
            out.value(grid_x);
            out.value(grid_y);
            out.value(damage);
        }
        Packet::BlockDestroyed {
            grid_x,
            grid_y,
            player_id,
        } => {
            out.value(grid_x);
            out.value(grid_y);
            out.value(player_id);
        }
        Packet::GoldUpdate { player_id, gold } => {
            out.value(player_id);
            out.value(gold);
        }
        Packet::SpawnItem {
            item,
            x,
            y,
            player_id,
        } => {
            out.value(item.as_str());
            out.value(x);
            out.value(y);
            out.value(player_id);
        }
        Packet::LifeChange { delta } => out.value(delta),
        Packet::LifeStatus { player_id, lives } => {
            out.value(player_id);
            out.value(lives);
        }
        Packet::Error { tag, message } => {
            out.text("tag", tag)?;
            out.text("message", message)?;
        }
        Packet::Disconnect
        | Packet::LeaveLobby
        | Packet::GetLobbies
        | Packet::Ready
        | Packet::GetHistory => {}
    }

    Ok(out.finish())
}

/// Parses one line into a packet. Structure only, see [`Packet::validate`]
/// for the field rules.
pub fn decode(bytes: &[u8]) -> Result<Packet, DecodeError> {
    let line = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
    let line = line.trim_end_matches(['\n', '\r']);
    if line.is_empty() {
        return Err(DecodeError::Empty);
    }

    let tag = line
        .get(..TAG_LEN)
        .ok_or_else(|| DecodeError::UnknownTag(line.to_string()))?;
    let kind = PacketType::from_tag(tag).ok_or_else(|| DecodeError::UnknownTag(tag.to_string()))?;

    let rest = &line[TAG_LEN..];
    let items: Vec<&str> = if rest.is_empty() {
        Vec::new()
    } else {
        rest.split(FIELD_SEPARATOR).collect()
    };
    let mut fields = FieldReader { kind, items, pos: 0 };

    let packet = match kind {
        PacketType::Login => {
            fields.expect(1)?;
            Packet::Login {
                username: fields.string(),
            }
        }
        PacketType::LoginSuccessful => {
            fields.expect(1)?;
            Packet::LoginSuccessful {
                player_id: fields.number("player id")?,
            }
        }
        PacketType::Disconnect => {
            fields.expect(0)?;
            Packet::Disconnect
        }
        PacketType::CreateLobby => {
            fields.expect(2)?;
            Packet::CreateLobby {
                name: fields.string(),
                size: fields.parse_with("map size", MapSize::parse)?,
            }
        }
        PacketType::CreateLobbyStatus => {
            fields.expect(1)?;
            Packet::CreateLobbyStatus {
                status: Status::from_field(fields.next_str()),
            }
        }
        PacketType::JoinLobby => {
            fields.expect(1)?;
            Packet::JoinLobby {
                name: fields.string(),
            }
        }
        PacketType::JoinLobbyStatus => {
            fields.expect(1)?;
            Packet::JoinLobbyStatus {
                status: Status::from_field(fields.next_str()),
            }
        }
        PacketType::LeaveLobby => {
            fields.expect(0)?;
            Packet::LeaveLobby
        }
        PacketType::GetLobbies => {
            fields.expect(0)?;
            Packet::GetLobbies
        }
        PacketType::LobbyOverview => {
            let count = fields.expect_groups(0, 4)?;
            let mut lobbies = Vec::with_capacity(count);
            for _ in 0..count {
                lobbies.push(LobbyListing {
                    name: fields.string(),
                    members: fields.number("members")?,
                    capacity: fields.number("capacity")?,
                    state: fields.parse_with("state", LobbyState::parse)?,
                });
            }
            Packet::LobbyOverview { lobbies }
        }
        PacketType::LobbyInfo => {
            let count = fields.expect_groups(2, 3)?;
            let name = fields.string();
            let state = fields.parse_with("state", LobbyState::parse)?;
            let mut members = Vec::with_capacity(count);
            for _ in 0..count {
                members.push(LobbyMember {
                    id: fields.number("member id")?,
                    username: fields.string(),
                    ready: fields.number("ready")?,
                });
            }
            Packet::LobbyInfo {
                name,
                state,
                members,
            }
        }
        PacketType::Ready => {
            fields.expect(0)?;
            Packet::Ready
        }
        PacketType::StartRound => {
            fields.expect(2)?;
            Packet::StartRound {
                size: fields.parse_with("map size", MapSize::parse)?,
                seed: fields.number("seed")?,
            }
        }
        PacketType::GameOver => {
            if fields.remaining() == 0 {
                Packet::GameOver { winner: None }
            } else {
                fields.expect(1)?;
                Packet::GameOver {
                    winner: Some(fields.number("winner")?),
                }
            }
        }
        PacketType::PositionSync => {
            fields.expect(3)?;
            Packet::PositionSync {
                x: fields.number("x")?,
                y: fields.number("y")?,
                rotation_y: fields.number("rotation")?,
            }
        }
        PacketType::PositionUpdate => {
            fields.expect(4)?;
            Packet::PositionUpdate {
                player_id: fields.number("player id")?,
                x: fields.number("x")?,
                y: fields.number("y")?,
                rotation_y: fields.number("rotation")?,
            }
        }
        PacketType::Velocity => {
            fields.expect(4)?;
            Packet::Velocity {
                current_x: fields.number("current x")?,
                current_y: fields.number("current y")?,
                goal_x: fields.number("goal x")?,
                goal_y: fields.number("goal y")?,
            }
        }
        PacketType::VelocityUpdate => {
            fields.expect(5)?;
            Packet::VelocityUpdate {
                player_id: fields.number("player id")?,
                current_x: fields.number("current x")?,
                current_y: fields.number("current y")?,
                goal_x: fields.number("goal x")?,
                goal_y: fields.number("goal y")?,
            }
        }
        PacketType::BlockDamage => {
            fields.expect(3)?;
            Packet::BlockDamage {
                grid_x: fields.number("grid x")?,
                grid_y: fields.number("grid y")?,
                damage: fields.number("damage")?,
            }
        }
        PacketType::BlockDestroyed => {
            fields.expect(3)?;
            Packet::BlockDestroyed {
                grid_x: fields.number("grid x")?,
                grid_y: fields.number("grid y")?,
                player_id: fields.number("player id")?,
            }
        }
        PacketType::GoldUpdate => {
            fields.expect(2)?;
            Packet::GoldUpdate {
                player_id: fields.number("player id")?,
                gold: fields.number("gold")?,
            }
        }
        PacketType::SpawnItem => {
            fields.expect(4)?;
            Packet::SpawnItem {
                item: fields.parse_with("item", ItemKind::parse)?,
                x: fields.number("x")?,
                y: fields.number("y")?,
                player_id: fields.number("player id")?,
            }
        }
        PacketType::LifeChange => {
            fields.expect(1)?;
            Packet::LifeChange {
                delta: fields.number("delta")?,
            }
        }
        PacketType::LifeStatus => {
            fields.expect(2)?;
            Packet::LifeStatus {
                player_id: fields.number("player id")?,
                lives: fields.number("lives")?,
            }
        }
        PacketType::GetHistory => {
            fields.expect(0)?;
            Packet::GetHistory
        }
        PacketType::History => {
            fields.expect(1)?;
            Packet::History {
                status: Status::from_field(fields.next_str()),
            }
        }
        PacketType::Error => {
            fields.expect(2)?;
            Packet::Error {
                tag: fields.string(),
                message: fields.string(),
            }
        }
    };

    Ok(packet)
}

struct FieldWriter {
    tag: &'static str,
    line: String,
    fields: usize,
}

impl FieldWriter {
    fn new(kind: PacketType) -> Self {
        Self {
            tag: kind.tag(),
            line: kind.tag().to_string(),
            fields: 0,
        }
    }

    fn push(&mut self, field: &str) {
        if self.fields > 0 {
            self.line.push(FIELD_SEPARATOR);
        }
        self.line.push_str(field);
        self.fields += 1;
    }

    fn text(&mut self, field: &'static str, value: &str) -> Result<(), EncodeError> {
        if !is_extended_ascii(value) || value.contains(['\n', '\r']) {
            return Err(EncodeError::InvalidText {
                tag: self.tag,
                field,
            });
        }
        self.push(value);
        Ok(())
    }

    fn value(&mut self, value: impl ToString) {
        self.push(&value.to_string());
    }

    fn finish(self) -> Vec<u8> {
        self.line.into_bytes()
    }
}

struct FieldReader<'a> {
    kind: PacketType,
    items: Vec<&'a str>,
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn remaining(&self) -> usize {
        self.items.len() - self.pos
    }

    fn expect(&self, expected: usize) -> Result<(), DecodeError> {
        if self.items.len() != expected {
            return Err(DecodeError::FieldCount {
                tag: self.kind.tag(),
                expected,
                found: self.items.len(),
            });
        }
        Ok(())
    }

    /// Checks for `fixed` leading fields followed by whole groups of `stride`
    /// fields and returns the number of groups.
    fn expect_groups(&self, fixed: usize, stride: usize) -> Result<usize, DecodeError> {
        if self.items.len() < fixed {
            return Err(DecodeError::FieldCount {
                tag: self.kind.tag(),
                expected: fixed,
                found: self.items.len(),
            });
        }
        let listed = self.items.len() - fixed;
        if listed % stride != 0 {
            return Err(DecodeError::RaggedList {
                tag: self.kind.tag(),
                stride,
                found: listed,
            });
        }
        Ok(listed / stride)
    }

    fn next_str(&mut self) -> &'a str {
        let item = self.items.get(self.pos).copied().unwrap_or_default();
        self.pos += 1;
        item
    }

    fn string(&mut self) -> String {
        self.next_str().to_string()
    }

    fn number<T: FromStr>(&mut self, field: &'static str) -> Result<T, DecodeError> {
        let raw = self.next_str();
        raw.parse().map_err(|_| DecodeError::InvalidNumber {
            tag: self.kind.tag(),
            field,
            value: raw.to_string(),
        })
    }

    fn parse_with<T>(
        &mut self,
        field: &'static str,
        parse: fn(&str) -> Option<T>,
    ) -> Result<T, DecodeError> {
        let raw = self.next_str();
        parse(raw).ok_or_else(|| DecodeError::InvalidValue {
            tag: self.kind.tag(),
            field,
            value: raw.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PlayerId;

    fn sample_packets() -> Vec<Packet> {
        vec![
            Packet::Login {
                username: "Alice".to_string(),
            },
            Packet::LoginSuccessful { player_id: 7 },
            Packet::Disconnect,
            Packet::CreateLobby {
                name: "Deep Mine".to_string(),
                size: MapSize::Medium,
            },
            Packet::CreateLobbyStatus {
                status: Status::ok(),
            },
            Packet::JoinLobby {
                name: "Deep Mine".to_string(),
            },
            Packet::JoinLobbyStatus {
                status: Status::Err("Lobby is full".to_string()),
            },
            Packet::LeaveLobby,
            Packet::GetLobbies,
            Packet::LobbyOverview {
                lobbies: vec![
                    LobbyListing {
                        name: "a".to_string(),
                        members: 1,
                        capacity: 7,
                        state: LobbyState::Waiting,
                    },
                    LobbyListing {
                        name: "b".to_string(),
                        members: 3,
                        capacity: 7,
                        state: LobbyState::InRound,
                    },
                ],
            },
            Packet::LobbyOverview { lobbies: vec![] },
            Packet::LobbyInfo {
                name: "Deep Mine".to_string(),
                state: LobbyState::ReadyCheck,
                members: vec![
                    LobbyMember {
                        id: 1,
                        username: "Alice".to_string(),
                        ready: true,
                    },
                    LobbyMember {
                        id: 2,
                        username: "Bob".to_string(),
                        ready: false,
                    },
                ],
            },
            Packet::Ready,
            Packet::StartRound {
                size: MapSize::Large,
                seed: u64::MAX,
            },
            Packet::GameOver { winner: Some(3) },
            Packet::GameOver { winner: None },
            Packet::PositionSync {
                x: 12.5,
                y: -30.25,
                rotation_y: 90.0,
            },
            Packet::PositionUpdate {
                player_id: 4,
                x: 0.1,
                y: -0.0,
                rotation_y: 270.0,
            },
            Packet::Velocity {
                current_x: 1.0,
                current_y: -2.5,
                goal_x: 20.0,
                goal_y: 0.0,
            },
            Packet::VelocityUpdate {
                player_id: 2,
                current_x: 1.0,
                current_y: -2.5,
                goal_x: 20.0,
                goal_y: 0.0,
            },
            Packet::BlockDamage {
                grid_x: 4,
                grid_y: 9,
                damage: 0.2,
            },
            Packet::BlockDestroyed {
                grid_x: 4,
                grid_y: 9,
                player_id: 2,
            },
            Packet::GoldUpdate {
                player_id: 2,
                gold: 350,
            },
            Packet::SpawnItem {
                item: ItemKind::Ice,
                x: 24.0,
                y: -54.0,
                player_id: 2,
            },
            Packet::LifeChange { delta: -1 },
            Packet::LifeStatus {
                player_id: 2,
                lives: 1,
            },
            Packet::GetHistory,
            Packet::History {
                status: Status::Ok(" Deep Mine round 1: Alice won with 350 gold".to_string()),
            },
            Packet::Error {
                tag: "READY".to_string(),
                message: "Not logged in".to_string(),
            },
        ]
    }

    #[test]
    fn test_every_type_covered_by_samples() {
        let samples = sample_packets();
        for kind in PacketType::ALL {
            assert!(
                samples.iter().any(|p| p.packet_type() == kind),
                "no sample for {:?}",
                kind
            );
        }
    }

    #[test]
    fn test_bytes_roundtrip() {
        for packet in sample_packets() {
            let bytes = encode(&packet).unwrap();
            let decoded = decode(&bytes).unwrap();
            assert_eq!(encode(&decoded).unwrap(), bytes);
            assert_eq!(decoded, packet);
        }
    }

    #[test]
    fn test_wire_layout() {
        let packet = Packet::BlockDamage {
            grid_x: 3,
            grid_y: 12,
            damage: 1.5,
        };
        assert_eq!(encode(&packet).unwrap(), "BLDMG3║12║1.5".as_bytes());
        assert_eq!(encode(&Packet::Ready).unwrap(), b"READY");
    }

    #[test]
    fn test_decode_tolerates_line_terminator() {
        let packet = decode(b"PLOGIAlice\r\n").unwrap();
        assert_eq!(
            packet,
            Packet::Login {
                username: "Alice".to_string()
            }
        );
    }

    #[test]
    fn test_encode_rejects_separator_in_text() {
        let packet = Packet::Login {
            username: "Al║ce".to_string(),
        };
        assert_eq!(
            encode(&packet),
            Err(EncodeError::InvalidText {
                tag: "PLOGI",
                field: "username"
            })
        );
    }

    #[test]
    fn test_encode_rejects_line_break() {
        let packet = Packet::Error {
            tag: "READY".to_string(),
            message: "two\nlines".to_string(),
        };
        assert!(encode(&packet).is_err());
    }

    #[test]
    fn test_decode_unknown_tag() {
        assert_eq!(
            decode(b"XXXXX1"),
            Err(DecodeError::UnknownTag("XXXXX".to_string()))
        );
        let short = decode(b"RE").unwrap_err();
        assert_eq!(short, DecodeError::UnknownTag("RE".to_string()));
        assert_eq!(short.reply_tag(), PacketType::INVALID_TAG);
    }

    #[test]
    fn test_decode_empty_and_invalid_utf8() {
        assert_eq!(decode(b""), Err(DecodeError::Empty));
        assert_eq!(decode(b"\n"), Err(DecodeError::Empty));
        assert_eq!(decode(&[0xff, 0xfe, 0x00]), Err(DecodeError::InvalidUtf8));
    }

    #[test]
    fn test_decode_wrong_field_count() {
        let err = decode("BLDMG1║2".as_bytes()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::FieldCount {
                tag: "BLDMG",
                expected: 3,
                found: 2
            }
        );
        assert_eq!(err.reply_tag(), "BLDMG");
        assert!(decode(b"READYnow").is_err());
    }

    #[test]
    fn test_decode_non_numeric_field() {
        let err = decode("BLDMG1║two║0.5".as_bytes()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::InvalidNumber {
                tag: "BLDMG",
                field: "grid y",
                value: "two".to_string()
            }
        );
    }

    #[test]
    fn test_decode_ragged_list() {
        let err = decode("LOBINmine║WAITING║1║Alice".as_bytes()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::RaggedList {
                tag: "LOBIN",
                stride: 3,
                found: 2
            }
        );
    }

    #[test]
    fn test_decode_unknown_enum_value() {
        let err = decode("LOBCRmine║xl".as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidValue { field: "map size", .. }));
    }

    #[test]
    fn test_decode_then_validate_is_separate() {
        // Structurally fine, semantically invalid.
        let packet = decode("BLDMG-1║0║500".as_bytes()).unwrap();
        let errors = packet.validate().unwrap_err();
        assert_eq!(errors.0.len(), 2);
    }

    #[test]
    fn test_player_id_field_parses() {
        let id: PlayerId = 42;
        let bytes = encode(&Packet::LoginSuccessful { player_id: id }).unwrap();
        assert_eq!(bytes, b"PLOGS42");
    }
}
