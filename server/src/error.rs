//! Errors produced while handling a client packet.
//!
//! None of these are fatal to the server: each one ends up as a rejection
//! packet sent to the offending connection, leaving shared state untouched.

use shared::{DecodeError, PlayerId, ValidationErrors};
use thiserror::Error;

/// The sender is not allowed to perform the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Not in a lobby")]
    NotInLobby,

    #[error("Player {actor} may not act on player {target}")]
    ForeignPlayer { actor: PlayerId, target: PlayerId },
}

/// The request is well formed but conflicts with the current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateConflictError {
    #[error("Already logged in")]
    AlreadyLoggedIn,

    #[error("Username '{0}' is already taken")]
    UsernameTaken(String),

    #[error("Server is full")]
    ServerFull,

    #[error("Already in a lobby")]
    AlreadyInLobby,

    #[error("Lobby '{0}' does not exist")]
    LobbyNotFound(String),

    #[error("Lobby is full")]
    LobbyFull,

    #[error("Lobby name '{0}' is already taken")]
    LobbyNameTaken(String),

    #[error("Too many lobbies")]
    TooManyLobbies,

    #[error("A round is in progress")]
    RoundInProgress,

    #[error("No round is running")]
    NoRoundActive,

    #[error("Already ready")]
    AlreadyReady,

    #[error("Block ({x}, {y}) is outside the map")]
    BlockOutOfBounds { x: i32, y: i32 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error(transparent)]
    Conflict(#[from] StateConflictError),

    #[error("Unexpected packet from client")]
    UnexpectedPacket,
}

pub type DispatchResult<T> = Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_human_readable() {
        let err: DispatchError = StateConflictError::UsernameTaken("Alice".to_string()).into();
        assert_eq!(err.to_string(), "Username 'Alice' is already taken");

        let err: DispatchError = AuthorizationError::NotLoggedIn.into();
        assert_eq!(err.to_string(), "Not logged in");
    }

    #[test]
    fn test_validation_errors_pass_through() {
        let err: DispatchError = ValidationErrors(vec!["x".into(), "y".into()]).into();
        assert_eq!(err.to_string(), "x; y");
    }
}
