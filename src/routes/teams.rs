use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use uuid::Uuid;

use crate::{
    dto::team::{
        BanRequest, BannedTeamSummary, JoinResponse, JoinSessionRequest, JoinTeamRequest,
        TeamSummary,
    },
    error::{AppError, ErrorBody},
    routes::identity::CallerId,
    services::membership_service,
    state::SharedState,
};

/// Routes for joining, leaving and moderating teams.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions/join", post(join_session))
        .route("/sessions/join-team", post(join_team))
        .route("/sessions/{id}/teams/{team_id}/leave", post(leave_team))
        .route("/sessions/{id}/teams/{team_id}/kick", post(kick_team))
        .route("/sessions/{id}/teams/{team_id}/ban", post(ban_team))
        .route("/sessions/{id}/bans", get(list_bans))
        .route("/sessions/{id}/bans/{ban_id}", delete(unban_team))
}

/// Join a session by code, creating a new team captained by the caller.
///
/// A caller already on a team gets that team back.
#[utoipa::path(
    post,
    path = "/sessions/join",
    tag = "teams",
    request_body = JoinSessionRequest,
    params(("x-user-id" = String, Header, description = "Caller user id")),
    responses(
        (status = 200, description = "Joined", body = JoinResponse),
        (status = 403, description = "Team name is banned", body = ErrorBody),
        (status = 404, description = "Unknown join code", body = ErrorBody),
        (status = 409, description = "Session full, closed or name taken", body = ErrorBody)
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    CallerId(uid): CallerId,
    Json(payload): Json<JoinSessionRequest>,
) -> Result<Json<JoinResponse>, AppError> {
    let response = membership_service::join_session(&state, &uid, payload).await?;
    Ok(Json(response))
}

/// Join an existing team with its team code; every member is a captain.
#[utoipa::path(
    post,
    path = "/sessions/join-team",
    tag = "teams",
    request_body = JoinTeamRequest,
    params(("x-user-id" = String, Header, description = "Caller user id")),
    responses(
        (status = 200, description = "Joined the team", body = JoinResponse),
        (status = 404, description = "Unknown session or team code", body = ErrorBody)
    )
)]
pub async fn join_team(
    State(state): State<SharedState>,
    CallerId(uid): CallerId,
    Json(payload): Json<JoinTeamRequest>,
) -> Result<Json<JoinResponse>, AppError> {
    let response = membership_service::join_team(&state, &uid, payload).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/teams/{team_id}/leave",
    tag = "teams",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("team_id" = Uuid, Path, description = "Team the caller belongs to"),
        ("x-user-id" = String, Header, description = "Caller user id")
    ),
    responses(
        (status = 200, description = "Left the team", body = TeamSummary),
        (status = 404, description = "Caller is not on that team", body = ErrorBody)
    )
)]
/// Leave a team. The last member leaving removes the team from play.
pub async fn leave_team(
    State(state): State<SharedState>,
    CallerId(uid): CallerId,
    Path((id, team_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<TeamSummary>, AppError> {
    let team = membership_service::leave_team(&state, id, team_id, &uid).await?;
    Ok(Json(team))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/teams/{team_id}/kick",
    tag = "teams",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("team_id" = Uuid, Path, description = "Team to remove"),
        ("x-user-id" = String, Header, description = "Host user id")
    ),
    responses(
        (status = 204, description = "Team removed"),
        (status = 401, description = "Caller is not the host", body = ErrorBody)
    )
)]
/// Remove a team from play without banning it.
pub async fn kick_team(
    State(state): State<SharedState>,
    CallerId(uid): CallerId,
    Path((id, team_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    membership_service::kick_team(&state, id, &uid, team_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/teams/{team_id}/ban",
    tag = "teams",
    request_body = BanRequest,
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("team_id" = Uuid, Path, description = "Team to ban"),
        ("x-user-id" = String, Header, description = "Host user id")
    ),
    responses(
        (status = 200, description = "Team banned", body = BannedTeamSummary),
        (status = 401, description = "Caller is not the host", body = ErrorBody)
    )
)]
/// Remove a team and refuse its name for the rest of the session.
pub async fn ban_team(
    State(state): State<SharedState>,
    CallerId(uid): CallerId,
    Path((id, team_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<BanRequest>,
) -> Result<Json<BannedTeamSummary>, AppError> {
    let ban = membership_service::ban_team(&state, id, &uid, team_id, payload).await?;
    Ok(Json(ban))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/bans",
    tag = "teams",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("x-user-id" = String, Header, description = "Host user id")
    ),
    responses((status = 200, description = "Active bans", body = Vec<BannedTeamSummary>))
)]
/// List the bans of a session.
pub async fn list_bans(
    State(state): State<SharedState>,
    CallerId(uid): CallerId,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<BannedTeamSummary>>, AppError> {
    let bans = membership_service::list_bans(&state, id, &uid).await?;
    Ok(Json(bans))
}

#[utoipa::path(
    delete,
    path = "/sessions/{id}/bans/{ban_id}",
    tag = "teams",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("ban_id" = Uuid, Path, description = "Ban to lift"),
        ("x-user-id" = String, Header, description = "Host user id")
    ),
    responses(
        (status = 204, description = "Ban lifted"),
        (status = 404, description = "Unknown ban", body = ErrorBody)
    )
)]
/// Lift a ban so the name can join again.
pub async fn unban_team(
    State(state): State<SharedState>,
    CallerId(uid): CallerId,
    Path((id, ban_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    membership_service::unban_team(&state, id, &uid, ban_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
