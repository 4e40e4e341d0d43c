//! # Mining Game Server Library
//!
//! Authoritative multiplayer server for the cooperative mining game. Clients
//! simulate their own movement and digging; the server decides who is logged
//! in, who plays in which lobby, which blocks still stand and who earned the
//! gold for breaking them.
//!
//! ## Core Responsibilities
//!
//! ### Sessions and Lobbies
//! Connections log in with a unique username, then create or join a named
//! lobby. A round starts once every member of a lobby has declared ready and
//! ends when someone reaches the gold goal or everybody is out of lives.
//!
//! ### World Arbitration
//! Every lobby owns a destructible block grid. Damage reports from several
//! players may race for the same block; exactly one of them destroys it, and
//! only that player is credited with its gold or its loot drop.
//!
//! ### State Relay
//! Position and velocity reports are clamped and relayed to the other members
//! of the sender's lobby.
//!
//! ## Architecture Design
//!
//! One tokio task reads each connection and another writes it. All tasks share
//! a single [`state::ServerState`]; its parts are guarded by short-lived
//! `parking_lot` locks that are never held across an `.await`. Handlers return
//! the packets to send instead of writing sockets themselves, and
//! [`dispatch::Dispatcher::deliver`] queues them on per-connection channels.
//!
//! ## Module Organization
//!
//! - `registry`: connection ids, login state machine, outboxes
//! - `players`: position, velocity, gold, lives and readiness per player
//! - `world`: block grids and the damage/destruction rules
//! - `lobby`: membership and round lifecycle
//! - `history`: results of finished rounds
//! - `dispatch`: packet routing and broadcast fan-out
//! - `network`: TCP listener and per-connection tasks
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use server::state::ServerState;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let state = Arc::new(ServerState::new(ServerConfig::default()));
//!     let server = Server::bind(state).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod lobby;
pub mod network;
pub mod players;
pub mod registry;
pub mod state;
pub mod world;
