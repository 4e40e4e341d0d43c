//! # Mining Game Client Library
//!
//! Headless client side of the mining game protocol. Rendering and input live
//! elsewhere; this crate covers what a client must get right to stay in sync
//! with the authoritative server.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! TCP connection framing packets with the shared line codec, split into a
//! cancellation safe reader and a writer.
//!
//! ### Session Module (`session`)
//! The client's picture of its login, lobby and round, rebuilt from server
//! packets. Status replies count as success when they start with `OK`. The
//! map layout is regenerated locally from the round seed.
//!
//! ### Dig Module (`dig`)
//! Accumulates digging damage and reports it once per dig interval, never
//! exceeding the per-report limit the server enforces.
//!
//! ### Sync Module (`sync`)
//! Emits velocity reports on change and position reports once per second.
//!
//! ### Bot Module (`bot`)
//! A scripted player that ties the above together; used by the `client`
//! binary and for load testing.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::bot::{Bot, BotConfig};
//! use shared::MapSize;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let report = Bot::run(BotConfig {
//!         server: "127.0.0.1:8080".to_string(),
//!         username: "Alice".to_string(),
//!         lobby: "Deep".to_string(),
//!         create: true,
//!         size: MapSize::Small,
//!         dig_seconds: 10.0,
//!     })
//!     .await?;
//!     println!("destroyed {} blocks", report.blocks_destroyed);
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod dig;
pub mod network;
pub mod session;
pub mod sync;
