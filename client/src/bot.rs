//! Scripted headless player: logs in, enters a lobby, readies up and digs.

use crate::dig::DamageAccumulator;
use crate::network::{ClientError, Connection};
use crate::session::{Session, SessionEvent};
use crate::sync::{Movement, MovementSync};
use log::{info, warn};
use shared::{grid_to_world, MapSize, Packet, PacketType, PlayerId, Status, BLOCK_SIZE};
use std::time::{Duration, Instant};
use tokio::time::interval;

/// Simulation step of the bot in seconds.
const TICK: f32 = 0.05;

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub server: String,
    pub username: String,
    pub lobby: String,
    /// Create the lobby instead of joining it.
    pub create: bool,
    pub size: MapSize,
    /// How long to dig before asking for the history and leaving.
    pub dig_seconds: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BotReport {
    pub player_id: PlayerId,
    pub blocks_destroyed: usize,
    pub gold: u32,
    pub winner: Option<Option<PlayerId>>,
    pub history: Option<String>,
}

pub struct Bot {
    config: BotConfig,
    connection: Connection,
    session: Session,
}

impl Bot {
    pub async fn connect(config: BotConfig) -> Result<Self, ClientError> {
        let connection = Connection::connect(&config.server).await?;
        info!("Connected to {}", config.server);
        Ok(Self {
            config,
            connection,
            session: Session::new(),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn login(&mut self) -> Result<PlayerId, ClientError> {
        let username = self.config.username.clone();
        self.connection.send(&Packet::Login { username }).await?;

        let session = &mut self.session;
        let player_id = self
            .connection
            .wait_for(PacketType::Login.tag(), |packet| match session.apply(packet) {
                SessionEvent::LoggedIn(id) => Some(id),
                _ => None,
            })
            .await?;
        info!("Logged in as {} (player {})", self.config.username, player_id);
        Ok(player_id)
    }

    pub async fn enter_lobby(&mut self) -> Result<(), ClientError> {
        let name = self.config.lobby.clone();
        let (request, kind) = if self.config.create {
            (
                Packet::CreateLobby {
                    name: name.clone(),
                    size: self.config.size,
                },
                PacketType::CreateLobby,
            )
        } else {
            (Packet::JoinLobby { name: name.clone() }, PacketType::JoinLobby)
        };

        self.session.request_lobby(&name);
        self.connection.send(&request).await?;

        let session = &mut self.session;
        let result = self
            .connection
            .wait_for(kind.tag(), |packet| match session.apply(packet) {
                SessionEvent::LobbyEntered => Some(Ok(())),
                SessionEvent::LobbyRejected(message) => Some(Err(message)),
                _ => None,
            })
            .await?;

        result.map_err(|message| ClientError::Rejected {
            tag: kind.tag().to_string(),
            message,
        })?;
        info!("Entered lobby '{}'", name);
        Ok(())
    }

    /// Declares ready and waits for the round to start.
    pub async fn ready(&mut self) -> Result<(MapSize, u64), ClientError> {
        self.connection.send(&Packet::Ready).await?;

        let session = &mut self.session;
        self.connection
            .wait_for(PacketType::Ready.tag(), |packet| match session.apply(packet) {
                SessionEvent::RoundStarted { size, seed } => Some((size, seed)),
                _ => None,
            })
            .await
    }

    /// Digs for the configured time or until the round ends.
    ///
    /// Returns the blocks this bot destroyed and the round result, if the
    /// round ended meanwhile.
    pub async fn dig(&mut self) -> Result<(usize, Option<Option<PlayerId>>), ClientError> {
        let me = self.session.player_id.unwrap_or_default();
        let column = (me as usize * 3) % self.config.size.dimensions().0;
        let deadline = Instant::now() + Duration::from_secs_f32(self.config.dig_seconds);

        let mut accumulator = DamageAccumulator::default();
        let mut movement = MovementSync::new();
        let mut ticker = interval(Duration::from_secs_f32(TICK));
        let mut destroyed = 0;

        while Instant::now() < deadline {
            tokio::select! {
                received = self.connection.reader.recv() => {
                    let packet = received?;
                    match self.session.apply(&packet) {
                        SessionEvent::BlockDestroyed { x, y, by } => {
                            accumulator.block_destroyed(x, y);
                            if by == me {
                                destroyed += 1;
                            }
                        }
                        SessionEvent::RoundOver { winner } => {
                            info!("Round over, winner {:?}", winner);
                            return Ok((destroyed, Some(winner)));
                        }
                        SessionEvent::Rejected { tag, message } => {
                            warn!("Server rejected {}: {}", tag, message);
                        }
                        _ => {}
                    }
                }
                _ = ticker.tick() => {
                    let target = self.session.next_target(column);
                    if let Some(report) = accumulator.update(target, TICK) {
                        self.connection.writer.send(&report).await?;
                    }

                    if let Some((x, y)) = target {
                        let (wx, wy) = grid_to_world(x as usize, y as usize);
                        let standing = Movement {
                            x: wx + BLOCK_SIZE / 2.0,
                            y: wy + BLOCK_SIZE,
                            rotation_y: 0.0,
                            current_velocity: (0.0, 0.0),
                            goal_velocity: (0.0, 0.0),
                        };
                        for packet in movement.update(&standing, TICK) {
                            self.connection.writer.send(&packet).await?;
                        }
                    }
                }
            }
        }

        Ok((destroyed, None))
    }

    pub async fn history(&mut self) -> Result<String, ClientError> {
        self.connection.send(&Packet::GetHistory).await?;
        let status = self
            .connection
            .wait_for(PacketType::GetHistory.tag(), |packet| match packet {
                Packet::History { status } => Some(status.clone()),
                _ => None,
            })
            .await?;

        match status {
            Status::Ok(text) => Ok(text),
            Status::Err(message) => Err(ClientError::Rejected {
                tag: PacketType::GetHistory.tag().to_string(),
                message,
            }),
        }
    }

    pub async fn disconnect(mut self) -> Result<(), ClientError> {
        self.connection.send(&Packet::Disconnect).await?;
        self.connection.writer.close().await
    }

    /// Runs the whole script.
    pub async fn run(config: BotConfig) -> Result<BotReport, ClientError> {
        let mut bot = Bot::connect(config).await?;
        let player_id = bot.login().await?;
        bot.enter_lobby().await?;

        let (size, seed) = bot.ready().await?;
        info!("Round started on a {} map (seed {})", size.as_str(), seed);

        let (blocks_destroyed, winner) = bot.dig().await?;
        let history = bot.history().await.ok();
        let gold = bot.session.my_gold();
        bot.disconnect().await?;

        Ok(BotReport {
            player_id,
            blocks_destroyed,
            gold,
            winner,
            history,
        })
    }
}
