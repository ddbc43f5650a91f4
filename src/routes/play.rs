use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use uuid::Uuid;

use crate::{
    dto::play::{AnswerSummary, SubmitAnswerRequest, SubmitVoteRequest, VoteSummary},
    error::{AppError, ErrorBody},
    routes::identity::CallerId,
    services::play_service,
    state::SharedState,
};

/// Routes for captains submitting answers and votes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions/{id}/answers", post(submit_answer))
        .route("/sessions/{id}/votes", post(submit_vote))
}

/// Submit the team's answer for the current round.
#[utoipa::path(
    post,
    path = "/sessions/{id}/answers",
    tag = "play",
    request_body = SubmitAnswerRequest,
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("x-user-id" = String, Header, description = "Captain user id")
    ),
    responses(
        (status = 200, description = "Answer recorded", body = AnswerSummary),
        (status = 400, description = "Answer too long or wrong round", body = ErrorBody),
        (status = 409, description = "Not answering or already answered", body = ErrorBody)
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    CallerId(uid): CallerId,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<AnswerSummary>, AppError> {
    let answer = play_service::submit_answer(&state, id, &uid, payload).await?;
    Ok(Json(answer))
}

/// Vote for another team's answer in any group of the current round, once per group.
#[utoipa::path(
    post,
    path = "/sessions/{id}/votes",
    tag = "play",
    request_body = SubmitVoteRequest,
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("x-user-id" = String, Header, description = "Captain user id")
    ),
    responses(
        (status = 200, description = "Vote recorded", body = VoteSummary),
        (status = 400, description = "Self vote or group mismatch", body = ErrorBody),
        (status = 409, description = "Not voting or already voted", body = ErrorBody)
    )
)]
pub async fn submit_vote(
    State(state): State<SharedState>,
    CallerId(uid): CallerId,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitVoteRequest>,
) -> Result<Json<VoteSummary>, AppError> {
    let vote = play_service::submit_vote(&state, id, &uid, payload).await?;
    Ok(Json(vote))
}
