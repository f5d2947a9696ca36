use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, state::state_machine::InvalidTransition};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No session with this code is tracked.
    #[error("session {0} not found")]
    SessionNotFound(String),
    /// The player is unknown to the player directory.
    #[error("player {0} is not registered")]
    PlayerNotRegistered(i64),
    /// The player is already known to the player directory.
    #[error("player {0} is already registered")]
    PlayerAlreadyRegistered(i64),
    /// The player never joined the session.
    #[error("player {player_id} has not joined session {session_code}")]
    PlayerNotInSession {
        /// Player that was looked up.
        player_id: i64,
        /// Session that was searched.
        session_code: String,
    },
    /// Another player holds the requested card.
    #[error("card {card_code} is already taken{}", .holder.map(|id| format!(" by player {id}")).unwrap_or_default())]
    CardAlreadyTaken {
        /// Requested card code.
        card_code: u32,
        /// Current holder, when known.
        holder: Option<i64>,
    },
    /// Numbers are already being called.
    #[error("game is already in progress; wait for the next round")]
    GameAlreadyInProgress,
    /// The countdown dropped below the join cut-off.
    #[error("game is starting in {countdown} seconds; wait for the next round")]
    JoinWindowClosing {
        /// Countdown value at the time of the request.
        countdown: u32,
    },
    /// The claimed card does not have a full line.
    #[error("false BINGO! you lose the game")]
    InvalidBingoClaim,
    /// A claim cannot be made right now.
    #[error("claim not allowed: {0}")]
    ClaimNotAllowed(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Unexpected missing or corrupt data.
    #[error("internal state error: {0}")]
    InternalState(String),
    /// The session actor stopped processing commands.
    #[error("session {0} is no longer running")]
    SessionClosed(String),
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InternalState(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::SessionNotFound(_)
            | ServiceError::PlayerNotRegistered(_)
            | ServiceError::PlayerNotInSession { .. } => AppError::NotFound(message),
            ServiceError::CardAlreadyTaken { .. }
            | ServiceError::PlayerAlreadyRegistered(_)
            | ServiceError::GameAlreadyInProgress
            | ServiceError::JoinWindowClosing { .. }
            | ServiceError::ClaimNotAllowed(_) => AppError::Conflict(message),
            ServiceError::InvalidBingoClaim | ServiceError::InvalidInput(_) => {
                AppError::BadRequest(message)
            }
            ServiceError::SessionClosed(_) => AppError::ServiceUnavailable(message),
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::InternalState(_) => AppError::Internal(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_conflict_names_holder() {
        let err = ServiceError::CardAlreadyTaken {
            card_code: 7,
            holder: Some(1001),
        };
        assert_eq!(err.to_string(), "card 7 is already taken by player 1001");
        match AppError::from(err) {
            AppError::Conflict(message) => assert!(message.contains("1001")),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn status_codes_follow_taxonomy() {
        let cases = [
            (
                ServiceError::SessionNotFound("GAME_1".into()),
                StatusCode::NOT_FOUND,
            ),
            (ServiceError::GameAlreadyInProgress, StatusCode::CONFLICT),
            (ServiceError::InvalidBingoClaim, StatusCode::BAD_REQUEST),
            (
                ServiceError::SessionClosed("GAME_1".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ServiceError::InternalState("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
