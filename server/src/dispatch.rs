//! Routes decoded client packets to the authorities and decides who hears
//! about the result.
//!
//! Handling never writes to a socket. It returns a list of [`Outbound`]
//! messages which [`Dispatcher::deliver`] pushes into the per-connection
//! outboxes. Lobby broadcasts look up the member list at delivery time, so a
//! player who left in the meantime is skipped.

use crate::error::{AuthorizationError, DispatchError, DispatchResult};
use crate::lobby::{LobbyId, RoundStart};
use crate::registry::{ConnectionId, ConnectionState};
use crate::state::ServerState;
use crate::world::DamageOutcome;
use log::{debug, info, warn};
use shared::{decode, is_extended_ascii, Direction, Packet, PacketType, PlayerId, Status};
use std::sync::Arc;
use std::time::Instant;

/// A packet produced while handling a request, plus who should receive it.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Back to the connection that sent the request.
    Reply(Packet),
    ToPlayer(PlayerId, Packet),
    /// Every current member of the lobby, optionally minus one player.
    ToLobby {
        lobby: LobbyId,
        packet: Packet,
        exclude: Option<PlayerId>,
    },
}

#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<ServerState>,
}

/// Keeps rejection text encodable: single-byte characters, no line breaks.
fn wire_text(message: String) -> String {
    if is_extended_ascii(&message) && !message.contains(['\n', '\r']) {
        return message;
    }
    message
        .chars()
        .map(|c| {
            if (c as u32) > 0xFF || c == '\n' || c == '\r' {
                '?'
            } else {
                c
            }
        })
        .collect()
}

/// Packet kinds that report failure in their own status reply.
fn status_reply(kind: PacketType, status: Status) -> Option<Packet> {
    match kind {
        PacketType::CreateLobby => Some(Packet::CreateLobbyStatus { status }),
        PacketType::JoinLobby => Some(Packet::JoinLobbyStatus { status }),
        PacketType::GetHistory => Some(Packet::History { status }),
        _ => None,
    }
}

fn rejection(kind: PacketType, err: &DispatchError) -> Packet {
    let message = wire_text(err.to_string());
    status_reply(kind, Status::Err(message.clone())).unwrap_or_else(|| Packet::error(kind, message))
}

impl Dispatcher {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Decodes one frame and handles it.
    pub fn handle_frame(&self, conn: ConnectionId, frame: &[u8]) -> Vec<Outbound> {
        match decode(frame) {
            Ok(packet) => self.handle_packet(conn, packet),
            Err(e) => {
                warn!("Connection {} sent an undecodable packet: {}", conn, e);
                vec![Outbound::Reply(Packet::Error {
                    tag: e.reply_tag().to_string(),
                    message: wire_text(e.to_string()),
                })]
            }
        }
    }

    pub fn handle_packet(&self, conn: ConnectionId, packet: Packet) -> Vec<Outbound> {
        let kind = packet.packet_type();

        let result = if kind.direction() != Direction::ServerBound {
            Err(DispatchError::UnexpectedPacket)
        } else {
            packet
                .validate()
                .map_err(DispatchError::from)
                .and_then(|_| self.route(conn, packet))
        };

        result.unwrap_or_else(|e| {
            debug!("Rejected {} from connection {}: {}", kind.tag(), conn, e);
            vec![Outbound::Reply(rejection(kind, &e))]
        })
    }

    fn route(&self, conn: ConnectionId, packet: Packet) -> DispatchResult<Vec<Outbound>> {
        let state = &self.state;

        match &packet {
            Packet::Login { username } => {
                let player_id = state.registry.login(conn, username)?;
                state.players.insert(player_id, username);
                return Ok(vec![Outbound::Reply(Packet::LoginSuccessful { player_id })]);
            }
            Packet::Disconnect => return Ok(self.handle_disconnect(conn)),
            _ => {}
        }

        let player = state.registry.player_for(conn)?;
        state.players.touch(player);

        match packet {
            Packet::CreateLobby { name, size } => {
                let lobby = state.lobbies.create(player, &name, size)?;
                let mut out = vec![Outbound::Reply(Packet::CreateLobbyStatus {
                    status: Status::ok(),
                })];
                out.extend(self.lobby_info(lobby));
                Ok(out)
            }
            Packet::JoinLobby { name } => {
                let lobby = state.lobbies.join(player, &name)?;
                let mut out = vec![Outbound::Reply(Packet::JoinLobbyStatus {
                    status: Status::ok(),
                })];
                out.extend(self.lobby_info(lobby));
                Ok(out)
            }
            Packet::LeaveLobby => {
                let outcome = state.lobbies.leave(player)?;
                let mut out = vec![Outbound::Reply(Packet::LobbyOverview {
                    lobbies: state.lobbies.overview(),
                })];
                if !outcome.closed {
                    out.extend(self.lobby_info(outcome.lobby));
                    out.extend(outcome.started.map(round_started));
                    out.extend(self.finish_round(outcome.lobby));
                }
                Ok(out)
            }
            Packet::GetLobbies => Ok(vec![Outbound::Reply(Packet::LobbyOverview {
                lobbies: state.lobbies.overview(),
            })]),
            Packet::Ready => {
                let outcome = state.lobbies.ready(player)?;
                let mut out: Vec<Outbound> = self.lobby_info(outcome.lobby).into_iter().collect();
                out.extend(outcome.started.map(round_started));
                Ok(out)
            }
            Packet::PositionSync { x, y, rotation_y } => {
                let lobby = state.players.lobby_of(player)?;
                let bounds = state
                    .lobbies
                    .bounds(lobby)
                    .ok_or(AuthorizationError::NotInLobby)?;
                let (x, y, rotation_y) = state.players.apply_position_sync(
                    player,
                    player,
                    (x, y),
                    rotation_y,
                    &bounds,
                )?;
                Ok(vec![Outbound::ToLobby {
                    lobby,
                    packet: Packet::PositionUpdate {
                        player_id: player,
                        x,
                        y,
                        rotation_y,
                    },
                    exclude: Some(player),
                }])
            }
            Packet::Velocity {
                current_x,
                current_y,
                goal_x,
                goal_y,
            } => {
                let lobby = state.players.lobby_of(player)?;
                let (current, goal) = state.players.apply_velocity_update(
                    player,
                    player,
                    (current_x, current_y),
                    (goal_x, goal_y),
                )?;
                Ok(vec![Outbound::ToLobby {
                    lobby,
                    packet: Packet::VelocityUpdate {
                        player_id: player,
                        current_x: current.0,
                        current_y: current.1,
                        goal_x: goal.0,
                        goal_y: goal.1,
                    },
                    exclude: Some(player),
                }])
            }
            Packet::BlockDamage {
                grid_x,
                grid_y,
                damage,
            } => {
                let lobby = state.players.lobby_of(player)?;
                state.lobbies.world_for_round(lobby)?;
                let granted = state.players.claim_dig(player, damage, Instant::now())?;
                if granted <= 0.0 {
                    return Ok(Vec::new());
                }
                let outcome = state.blocks.damage(lobby, grid_x, grid_y, granted, player)?;
                Ok(self.block_outcome(lobby, player, grid_x, grid_y, outcome))
            }
            Packet::LifeChange { delta } => {
                let lobby = state.players.lobby_of(player)?;
                state.lobbies.world_for_round(lobby)?;
                let (lives, _) = state.players.apply_life_change(player, delta)?;
                let mut out = vec![Outbound::ToLobby {
                    lobby,
                    packet: Packet::LifeStatus {
                        player_id: player,
                        lives,
                    },
                    exclude: None,
                }];
                out.extend(self.finish_round(lobby));
                Ok(out)
            }
            Packet::GetHistory => Ok(vec![Outbound::Reply(Packet::History {
                status: Status::Ok(state.history.summary()),
            })]),
            _ => Err(DispatchError::UnexpectedPacket),
        }
    }

    fn block_outcome(
        &self,
        lobby: LobbyId,
        player: PlayerId,
        grid_x: i32,
        grid_y: i32,
        outcome: DamageOutcome,
    ) -> Vec<Outbound> {
        let DamageOutcome::Destroyed {
            reward_credited,
            gold_total,
            loot,
        } = outcome
        else {
            return Vec::new();
        };

        let to_lobby = |packet| Outbound::ToLobby {
            lobby,
            packet,
            exclude: None,
        };
        let mut out = vec![to_lobby(Packet::BlockDestroyed {
            grid_x,
            grid_y,
            player_id: player,
        })];
        if reward_credited > 0 {
            out.push(to_lobby(Packet::GoldUpdate {
                player_id: player,
                gold: gold_total,
            }));
        }
        if let Some(drop) = loot {
            out.push(to_lobby(Packet::SpawnItem {
                item: drop.item,
                x: drop.x,
                y: drop.y,
                player_id: player,
            }));
        }
        out.extend(self.finish_round(lobby));
        out
    }

    fn lobby_info(&self, lobby: LobbyId) -> Option<Outbound> {
        self.state
            .lobbies
            .info(lobby)
            .map(|packet| Outbound::ToLobby {
                lobby,
                packet,
                exclude: None,
            })
    }

    /// GAME_OVER plus the updated lobby info when the round just ended.
    fn finish_round(&self, lobby: LobbyId) -> Vec<Outbound> {
        let Some(end) = self.state.lobbies.finish_round_if_over(lobby) else {
            return Vec::new();
        };
        self.state.history.record(end.summary);

        let mut out = vec![Outbound::ToLobby {
            lobby,
            packet: Packet::GameOver { winner: end.winner },
            exclude: None,
        }];
        out.extend(self.lobby_info(lobby));
        out
    }

    /// Releases everything held by `conn`. Runs for DISCONNECT packets,
    /// closed sockets and idle timeouts alike.
    pub fn handle_disconnect(&self, conn: ConnectionId) -> Vec<Outbound> {
        let state = &self.state;
        let Some(player) = state.registry.disconnect(conn) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        if let Ok(outcome) = state.lobbies.leave(player) {
            if !outcome.closed {
                out.extend(self.lobby_info(outcome.lobby));
                out.extend(outcome.started.map(round_started));
                out.extend(self.finish_round(outcome.lobby));
            }
        }
        state.players.remove(player);
        info!("Player {} left the server", player);
        out
    }

    /// Pushes outbound packets into the outboxes of their recipients.
    /// `conn` is the connection the request came from.
    pub fn deliver(&self, conn: ConnectionId, outbound: Vec<Outbound>) {
        let registry = &self.state.registry;

        for message in outbound {
            match message {
                Outbound::Reply(packet) => {
                    if let Some(outbox) = registry.outbox_for_connection(conn) {
                        let _ = outbox.send(packet);
                    }
                }
                Outbound::ToPlayer(player, packet) => {
                    if let Some(outbox) = registry.outbox_for_player(player) {
                        let _ = outbox.send(packet);
                    }
                }
                Outbound::ToLobby {
                    lobby,
                    packet,
                    exclude,
                } => {
                    for member in self.state.lobbies.members(lobby) {
                        if Some(member) == exclude {
                            continue;
                        }
                        if let Some(outbox) = registry.outbox_for_player(member) {
                            let _ = outbox.send(packet.clone());
                        }
                    }
                }
            }
        }
    }

    pub fn is_closed(&self, conn: ConnectionId) -> bool {
        self.state.registry.state(conn) == ConnectionState::Disconnected
    }
}

fn round_started(start: RoundStart) -> Outbound {
    Outbound::ToLobby {
        lobby: start.lobby,
        packet: start.packet(),
        exclude: None,
    }
}
