use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::{
    dao::storage::StorageError,
    state::state_machine::{ApplyError, PlanError, SessionPhase},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Caller identity is missing or lacks the required role.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// No session matches the given id or join code.
    #[error("session not found: {0}")]
    SessionNotFound(String),
    /// The requested phase change is not valid from the current phase.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    /// The caller's view of the current phase is out of date.
    #[error("stale transition: expected {expected:?}, session is in {actual:?}")]
    StaleTransition {
        /// Phase the caller believed was current.
        expected: SessionPhase,
        /// Phase the session is actually in.
        actual: SessionPhase,
    },
    /// A game cannot start without at least one active team.
    #[error("not enough teams to start the game")]
    NotEnoughTeams,
    /// Another active team already uses this name.
    #[error("team name `{0}` is already taken")]
    DuplicateTeamName(String),
    /// The team already answered this round.
    #[error("team already answered this round")]
    DuplicateAnswer,
    /// The team already voted in this group.
    #[error("team already voted in this group")]
    DuplicateVote,
    /// A team tried to vote for its own answer.
    #[error("teams cannot vote for their own answer")]
    SelfVote,
    /// The session reached its maximum number of teams.
    #[error("session is full ({0} teams)")]
    SessionFull(u32),
    /// The session no longer accepts joins.
    #[error("session is not accepting new teams")]
    SessionClosed,
    /// The team name is banned in this session.
    #[error("team name `{0}` is banned from this session")]
    Banned(String),
    /// Session settings are out of range.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    /// Invalid input provided by the client.
    #[error("validation failed: {0}")]
    ValidationFailed(String),
}

impl ServiceError {
    /// Stable machine-readable code surfaced to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Unavailable(_) | ServiceError::Degraded => "STORAGE_UNAVAILABLE",
            ServiceError::Unauthorized(_) => "UNAUTHORIZED",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            ServiceError::InvalidTransition(_) => "INVALID_TRANSITION",
            ServiceError::StaleTransition { .. } => "STALE_TRANSITION",
            ServiceError::NotEnoughTeams => "NOT_ENOUGH_TEAMS",
            ServiceError::DuplicateTeamName(_) => "DUPLICATE_TEAM_NAME",
            ServiceError::DuplicateAnswer => "DUPLICATE_ANSWER",
            ServiceError::DuplicateVote => "DUPLICATE_VOTE",
            ServiceError::SelfVote => "SELF_VOTE",
            ServiceError::SessionFull(_) => "SESSION_FULL",
            ServiceError::SessionClosed => "SESSION_CLOSED",
            ServiceError::Banned(_) => "BANNED",
            ServiceError::InvalidSettings(_) => "INVALID_SETTINGS",
            ServiceError::ValidationFailed(_) => "VALIDATION_FAILED",
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<PlanError> for ServiceError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::Stale { expected, actual } => {
                ServiceError::StaleTransition { expected, actual }
            }
            PlanError::InvalidTransition(invalid) => {
                ServiceError::InvalidTransition(invalid.to_string())
            }
        }
    }
}

impl From<ApplyError> for ServiceError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::PhaseMismatch { expected, actual } => {
                ServiceError::StaleTransition { expected, actual }
            }
            ApplyError::VersionMismatch { phase, .. } => ServiceError::StaleTransition {
                expected: phase,
                actual: phase,
            },
        }
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("{message}")]
    BadRequest {
        /// Machine-readable error code.
        code: &'static str,
        /// Human-readable detail.
        message: String,
    },
    /// Missing or unknown caller identity.
    #[error("{message}")]
    Unauthorized {
        /// Machine-readable error code.
        code: &'static str,
        /// Human-readable detail.
        message: String,
    },
    /// Requested resource not found.
    #[error("{message}")]
    NotFound {
        /// Machine-readable error code.
        code: &'static str,
        /// Human-readable detail.
        message: String,
    },
    /// Conflict with current state.
    #[error("{message}")]
    Conflict {
        /// Machine-readable error code.
        code: &'static str,
        /// Human-readable detail.
        message: String,
    },
    /// The caller is known but not allowed to join.
    #[error("{message}")]
    Forbidden {
        /// Machine-readable error code.
        code: &'static str,
        /// Human-readable detail.
        message: String,
    },
    /// Service unavailable or degraded.
    #[error("{message}")]
    ServiceUnavailable {
        /// Machine-readable error code.
        code: &'static str,
        /// Human-readable detail.
        message: String,
    },
}

impl AppError {
    /// Shortcut for requests that lack the identity header.
    pub fn missing_identity() -> Self {
        AppError::Unauthorized {
            code: "UNAUTHORIZED",
            message: "missing caller identity".into(),
        }
    }

    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::BadRequest { code, .. } => (StatusCode::BAD_REQUEST, *code),
            AppError::Unauthorized { code, .. } => (StatusCode::UNAUTHORIZED, *code),
            AppError::NotFound { code, .. } => (StatusCode::NOT_FOUND, *code),
            AppError::Conflict { code, .. } => (StatusCode::CONFLICT, *code),
            AppError::Forbidden { code, .. } => (StatusCode::FORBIDDEN, *code),
            AppError::ServiceUnavailable { code, .. } => (StatusCode::SERVICE_UNAVAILABLE, *code),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let code = err.code();
        let message = err.to_string();
        match err {
            ServiceError::Unavailable(_) | ServiceError::Degraded => {
                AppError::ServiceUnavailable { code, message }
            }
            ServiceError::Unauthorized(_) => AppError::Unauthorized { code, message },
            ServiceError::NotFound(_) | ServiceError::SessionNotFound(_) => {
                AppError::NotFound { code, message }
            }
            ServiceError::Banned(_) => AppError::Forbidden { code, message },
            ServiceError::InvalidSettings(_)
            | ServiceError::ValidationFailed(_)
            | ServiceError::SelfVote => AppError::BadRequest { code, message },
            ServiceError::InvalidTransition(_)
            | ServiceError::StaleTransition { .. }
            | ServiceError::NotEnoughTeams
            | ServiceError::DuplicateTeamName(_)
            | ServiceError::DuplicateAnswer
            | ServiceError::DuplicateVote
            | ServiceError::SessionFull(_)
            | ServiceError::SessionClosed => AppError::Conflict { code, message },
        }
    }
}

/// Structured error payload returned by every failing route.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g. `DUPLICATE_ANSWER`).
    pub code: String,
    /// Human-readable detail.
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = self.parts();

        let payload = Json(ErrorBody {
            code: code.to_string(),
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
