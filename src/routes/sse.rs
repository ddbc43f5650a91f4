use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, Query, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{error::AppError, services::sse_service, state::SharedState};

/// Optional round filter for the change feed.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventsQuery {
    /// Drop events tagged with any other round.
    pub round: Option<u32>,
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/events",
    tag = "sse",
    params(("id" = Uuid, Path, description = "Session identifier"), EventsQuery),
    responses((status = 200, description = "Session change feed", content_type = "text/event-stream", body = String))
)]
/// Stream the change feed of one session, starting with a handshake and a full snapshot.
pub async fn session_events(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let subscription = sse_service::subscribe(&state, id, query.round).await?;
    info!(session_id = %id, round = ?query.round, "new session SSE connection");
    Ok(sse_service::to_sse_stream(subscription))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sessions/{id}/events", get(session_events))
}
