use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::session::{
        AdvanceRequest, CreateSessionRequest, LeaderboardEntry, RoundResults, SessionSnapshot,
        SessionSummary,
    },
    error::{AppError, ErrorBody},
    routes::identity::CallerId,
    services::session_service,
    state::SharedState,
};

/// Routes driving the session lifecycle and its read models.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/code/{code}", get(get_session_by_code))
        .route("/sessions/{id}/start", post(start_session))
        .route("/sessions/{id}/advance", post(advance_session))
        .route("/sessions/{id}/end", post(end_session))
        .route("/sessions/{id}/leaderboard", get(get_leaderboard))
        .route("/sessions/{id}/rounds/{round}/results", get(get_round_results))
}

/// Open a new session in the lobby; the caller becomes its host.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    params(("x-user-id" = String, Header, description = "Caller user id")),
    responses(
        (status = 200, description = "Session created", body = SessionSummary),
        (status = 400, description = "Invalid settings", body = ErrorBody),
        (status = 503, description = "Storage unavailable", body = ErrorBody)
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    CallerId(uid): CallerId,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = session_service::create_session(&state, &uid, payload).await?;
    Ok(Json(summary))
}

/// Full snapshot of a session: teams, current round, submissions and standings.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session snapshot", body = SessionSnapshot),
        (status = 404, description = "Unknown session", body = ErrorBody)
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let snapshot = session_service::snapshot(&state, id).await?;
    Ok(Json(snapshot))
}

/// Look a session up by the join code players type in.
#[utoipa::path(
    get,
    path = "/sessions/code/{code}",
    tag = "sessions",
    params(("code" = String, Path, description = "Six character join code")),
    responses(
        (status = 200, description = "Session snapshot", body = SessionSnapshot),
        (status = 404, description = "Unknown code", body = ErrorBody)
    )
)]
pub async fn get_session_by_code(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let snapshot = session_service::snapshot_by_code(&state, &code).await?;
    Ok(Json(snapshot))
}

/// Close the lobby and open the first round.
#[utoipa::path(
    post,
    path = "/sessions/{id}/start",
    tag = "sessions",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("x-user-id" = String, Header, description = "Host user id")
    ),
    responses(
        (status = 200, description = "First round opened", body = SessionSummary),
        (status = 401, description = "Caller is not the host", body = ErrorBody),
        (status = 409, description = "Not in the lobby or no teams yet", body = ErrorBody)
    )
)]
pub async fn start_session(
    State(state): State<SharedState>,
    CallerId(uid): CallerId,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = session_service::start_game(&state, id, &uid).await?;
    Ok(Json(summary))
}

/// Move the session to its next phase, provided it is still in `expected_phase`.
#[utoipa::path(
    post,
    path = "/sessions/{id}/advance",
    tag = "sessions",
    request_body = AdvanceRequest,
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("x-user-id" = String, Header, description = "Host user id")
    ),
    responses(
        (status = 200, description = "Phase advanced", body = SessionSummary),
        (status = 409, description = "Stale or invalid transition", body = ErrorBody)
    )
)]
pub async fn advance_session(
    State(state): State<SharedState>,
    CallerId(uid): CallerId,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdvanceRequest>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = session_service::advance_phase(&state, id, &uid, payload.expected_phase).await?;
    Ok(Json(summary))
}

/// End the session. Ending twice is harmless.
#[utoipa::path(
    post,
    path = "/sessions/{id}/end",
    tag = "sessions",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("x-user-id" = String, Header, description = "Host user id")
    ),
    responses(
        (status = 200, description = "Session ended", body = SessionSummary),
        (status = 401, description = "Caller is not the host", body = ErrorBody)
    )
)]
pub async fn end_session(
    State(state): State<SharedState>,
    CallerId(uid): CallerId,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = session_service::end_session(&state, id, &uid).await?;
    Ok(Json(summary))
}

/// Teams ranked by score.
#[utoipa::path(
    get,
    path = "/sessions/{id}/leaderboard",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Ranked teams", body = Vec<LeaderboardEntry>),
        (status = 404, description = "Unknown session", body = ErrorBody)
    )
)]
pub async fn get_leaderboard(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    let rows = session_service::leaderboard(&state, id).await?;
    Ok(Json(rows))
}

/// Vote counts, winners and awarded points for a settled round.
#[utoipa::path(
    get,
    path = "/sessions/{id}/rounds/{round}/results",
    tag = "sessions",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("round" = u32, Path, description = "Zero-based round index")
    ),
    responses(
        (status = 200, description = "Round results", body = RoundResults),
        (status = 400, description = "Round still being played", body = ErrorBody),
        (status = 404, description = "Unknown session or round", body = ErrorBody)
    )
)]
pub async fn get_round_results(
    State(state): State<SharedState>,
    Path((id, round)): Path<(Uuid, u32)>,
) -> Result<Json<RoundResults>, AppError> {
    let results = session_service::round_results(&state, id, round).await?;
    Ok(Json(results))
}
