//! Connection registry and login state machine.
//!
//! Every accepted transport gets a [`ConnectionId`] and starts out
//! unauthenticated. A successful login binds it to a fresh [`PlayerId`] and
//! reserves the username among the players currently online; disconnecting
//! releases both. Broadcasts look up a player's outbox here.

use crate::error::{AuthorizationError, DispatchError, StateConflictError};
use log::info;
use parking_lot::Mutex;
use shared::{Packet, PlayerId};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;

pub type ConnectionId = u64;

/// Queue of packets waiting to be written to one connection.
pub type Outbox = mpsc::UnboundedSender<Packet>;

/// Login state of one connection
///
/// Connections only ever move forward: UNAUTHENTICATED to AUTHENTICATED on a
/// successful login, and either of those to DISCONNECTED when the transport
/// goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unauthenticated,
    Authenticated(PlayerId),
    /// Terminal. Also reported for ids the registry no longer knows.
    Disconnected,
}

#[derive(Debug)]
struct Connection {
    addr: SocketAddr,
    state: ConnectionState,
    outbox: Outbox,
}

#[derive(Debug, Default)]
struct Inner {
    connections: HashMap<ConnectionId, Connection>,
    usernames: HashMap<String, PlayerId>,
    players: HashMap<PlayerId, ConnectionId>,
    next_connection_id: ConnectionId,
    next_player_id: PlayerId,
}

/// Tracks every open connection, its login state and its outbox
///
/// One mutex guards the whole table so that username reservation, id
/// allocation and the capacity check happen as a single step.
pub struct ConnectionRegistry {
    /// Connections, reserved usernames and the player to connection mapping
    inner: Mutex<Inner>,
    /// Maximum number of authenticated players
    max_players: usize,
}

impl ConnectionRegistry {
    /// Player ids start at 1 and are never reused while the server runs.
    pub fn new(max_players: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_connection_id: 1,
                next_player_id: 1,
                ..Inner::default()
            }),
            max_players,
        }
    }

    /// Tracks a freshly accepted transport in the unauthenticated state.
    pub fn register(&self, addr: SocketAddr, outbox: Outbox) -> ConnectionId {
        let mut inner = self.inner.lock();
        let id = inner.next_connection_id;
        inner.next_connection_id += 1;
        inner.connections.insert(
            id,
            Connection {
                addr,
                state: ConnectionState::Unauthenticated,
                outbox,
            },
        );
        id
    }

    /// UNAUTHENTICATED -> AUTHENTICATED.
    ///
    /// Usernames only have to be unique among players that are online right now.
    pub fn login(&self, conn: ConnectionId, username: &str) -> Result<PlayerId, DispatchError> {
        let mut inner = self.inner.lock();

        match inner.connections.get(&conn).map(|c| c.state) {
            Some(ConnectionState::Unauthenticated) => {}
            Some(ConnectionState::Authenticated(_)) => {
                return Err(StateConflictError::AlreadyLoggedIn.into())
            }
            Some(ConnectionState::Disconnected) | None => {
                return Err(AuthorizationError::NotLoggedIn.into())
            }
        }

        if inner.usernames.contains_key(username) {
            return Err(StateConflictError::UsernameTaken(username.to_string()).into());
        }
        if inner.players.len() >= self.max_players {
            return Err(StateConflictError::ServerFull.into());
        }

        let player_id = inner.next_player_id;
        inner.next_player_id += 1;
        inner.usernames.insert(username.to_string(), player_id);
        inner.players.insert(player_id, conn);

        let addr = match inner.connections.get_mut(&conn) {
            Some(connection) => {
                connection.state = ConnectionState::Authenticated(player_id);
                connection.addr
            }
            None => return Err(AuthorizationError::NotLoggedIn.into()),
        };

        info!("{} logged in as '{}' (player {})", addr, username, player_id);
        Ok(player_id)
    }

    /// Moves the connection to DISCONNECTED and forgets it.
    ///
    /// Returns the player that was bound to it, if any. Safe to call twice.
    pub fn disconnect(&self, conn: ConnectionId) -> Option<PlayerId> {
        let mut inner = self.inner.lock();
        let mut connection = inner.connections.remove(&conn)?;
        let previous = std::mem::replace(&mut connection.state, ConnectionState::Disconnected);

        match previous {
            ConnectionState::Authenticated(player_id) => {
                inner.players.remove(&player_id);
                inner.usernames.retain(|_, id| *id != player_id);
                info!("Player {} disconnected from {}", player_id, connection.addr);
                Some(player_id)
            }
            _ => {
                info!("Connection {} from {} closed", conn, connection.addr);
                None
            }
        }
    }

    /// Current login state of `conn`
    ///
    /// Unknown ids report DISCONNECTED, so a connection that was already
    /// cleaned up looks the same as one that was closed a moment ago.
    pub fn state(&self, conn: ConnectionId) -> ConnectionState {
        self.inner
            .lock()
            .connections
            .get(&conn)
            .map(|c| c.state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// The player bound to `conn`
    ///
    /// Every request other than LOGIN goes through here first; connections
    /// that are not AUTHENTICATED get `NotLoggedIn`.
    pub fn player_for(&self, conn: ConnectionId) -> Result<PlayerId, AuthorizationError> {
        match self.state(conn) {
            ConnectionState::Authenticated(player_id) => Ok(player_id),
            _ => Err(AuthorizationError::NotLoggedIn),
        }
    }

    /// Outbox of a connection in any state, used for direct replies
    ///
    /// Replies to unauthenticated connections (login failures, decode errors)
    /// need this, since they have no player id yet.
    pub fn outbox_for_connection(&self, conn: ConnectionId) -> Option<Outbox> {
        self.inner
            .lock()
            .connections
            .get(&conn)
            .map(|c| c.outbox.clone())
    }

    /// Outbox of the connection an authenticated player is bound to
    ///
    /// Used for lobby broadcasts and player targeted messages. Returns `None`
    /// once the player has disconnected.
    pub fn outbox_for_player(&self, player_id: PlayerId) -> Option<Outbox> {
        let inner = self.inner.lock();
        let conn = inner.players.get(&player_id)?;
        inner.connections.get(conn).map(|c| c.outbox.clone())
    }

    /// Number of logged in players, the figure `max_players` limits
    pub fn authenticated_count(&self) -> usize {
        self.inner.lock().players.len()
    }

    /// Returns the number of open connections, authenticated or not
    pub fn len(&self) -> usize {
        self.inner.lock().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().connections.is_empty()
    }
}
