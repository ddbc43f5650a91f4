use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Trivia Party Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sessions::create_session,
        crate::routes::sessions::get_session,
        crate::routes::sessions::get_session_by_code,
        crate::routes::sessions::start_session,
        crate::routes::sessions::advance_session,
        crate::routes::sessions::end_session,
        crate::routes::sessions::get_leaderboard,
        crate::routes::sessions::get_round_results,
        crate::routes::teams::join_session,
        crate::routes::teams::join_team,
        crate::routes::teams::leave_team,
        crate::routes::teams::kick_team,
        crate::routes::teams::ban_team,
        crate::routes::teams::list_bans,
        crate::routes::teams::unban_team,
        crate::routes::play::submit_answer,
        crate::routes::play::submit_vote,
        crate::routes::sse::session_events,
    ),
    components(
        schemas(
            crate::error::ErrorBody,
            crate::dto::health::HealthResponse,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::SettingsInput,
            crate::dto::session::AdvanceRequest,
            crate::dto::session::SessionSummary,
            crate::dto::session::SettingsSummary,
            crate::dto::session::RoundSummary,
            crate::dto::session::GroupSummary,
            crate::dto::session::SessionSnapshot,
            crate::dto::session::LeaderboardEntry,
            crate::dto::session::RoundResults,
            crate::dto::session::GroupResult,
            crate::dto::session::AnswerResult,
            crate::dto::team::JoinSessionRequest,
            crate::dto::team::JoinTeamRequest,
            crate::dto::team::BanRequest,
            crate::dto::team::JoinResponse,
            crate::dto::team::TeamSummary,
            crate::dto::team::BannedTeamSummary,
            crate::dto::team::TeamMemberSummary,
            crate::dto::play::SubmitAnswerRequest,
            crate::dto::play::SubmitVoteRequest,
            crate::dto::play::AnswerSummary,
            crate::dto::play::AnswerReceipt,
            crate::dto::play::VoteSummary,
            crate::dto::sse::Handshake,
            crate::dto::sse::DeletedEvent,
            crate::state::state_machine::SessionPhase,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Session lifecycle and standings"),
        (name = "teams", description = "Joining, leaving and moderating teams"),
        (name = "play", description = "Answer and vote submission"),
        (name = "sse", description = "Server-sent events change feed"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        for path in [
            "/healthcheck",
            "/sessions",
            "/sessions/{id}/advance",
            "/sessions/join",
            "/sessions/{id}/bans/{ban_id}",
            "/sessions/{id}/votes",
            "/sessions/{id}/events",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }
    }
}
