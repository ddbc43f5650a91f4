use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use rand::Rng;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AppConfig,
    dao::{
        models::{AnswerEntity, SessionEntity, SettingsEntity},
        session_store::SessionStore,
    },
    dto::{
        session::{
            CreateSessionRequest, GroupResult, LeaderboardEntry, RoundResults, SessionSnapshot,
            SessionSummary,
        },
        validation::{JOIN_CODE_ALPHABET, JOIN_CODE_LENGTH},
    },
    error::ServiceError,
    services::{
        partitioner::build_round,
        scoring::{build_leaderboard, score_round},
        sse_events::reveal_answers,
    },
    state::{
        ChangeSet, LiveSession, SessionHandle, SharedState,
        state_machine::{Plan, SessionEvent, SessionPhase},
        transitions::commit_with_broadcast,
    },
};

const CODE_ATTEMPTS: usize = 16;

/// Reject callers other than the session host.
pub(crate) fn ensure_host(live: &LiveSession, uid: &str) -> Result<(), ServiceError> {
    if live.session.creator_uid == uid {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized(
            "only the session host can do this".into(),
        ))
    }
}

/// Deadline of `phase` when entered at `now`; `None` when the phase waits for the host.
pub fn phase_deadline(
    settings: &SettingsEntity,
    phase: SessionPhase,
    now: SystemTime,
) -> Option<SystemTime> {
    let secs = match phase {
        SessionPhase::Answer => settings.answer_secs,
        SessionPhase::Vote => settings.vote_secs,
        SessionPhase::Results if settings.results_secs > 0 => settings.results_secs,
        _ => return None,
    };
    Some(now + Duration::from_secs(u64::from(secs)))
}

fn random_code(alphabet: &[u8], length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(alphabet[rng.random_range(0..alphabet.len())]))
        .collect()
}

/// Random code made of unambiguous characters, used for sessions and teams alike.
pub(crate) fn generate_code(length: usize) -> String {
    random_code(JOIN_CODE_ALPHABET, length)
}

async fn allocate_join_code(
    state: &SharedState,
    store: &dyn SessionStore,
) -> Result<String, ServiceError> {
    for _ in 0..CODE_ATTEMPTS {
        let code = generate_code(JOIN_CODE_LENGTH);
        if state.code_in_use(&code) {
            continue;
        }
        if store.find_session_by_code(code.clone()).await?.is_none() {
            return Ok(code);
        }
    }
    Err(ServiceError::ValidationFailed(
        "could not allocate a unique join code".into(),
    ))
}

/// Open a new session in the lobby.
pub async fn create_session(
    state: &SharedState,
    creator_uid: &str,
    request: CreateSessionRequest,
) -> Result<SessionSummary, ServiceError> {
    request
        .validate()
        .map_err(|err| ServiceError::ValidationFailed(err.to_string()))?;
    let creator_name = request.creator_name.trim();
    if creator_name.is_empty() {
        return Err(ServiceError::ValidationFailed(
            "creator name must not be blank".into(),
        ));
    }

    let settings = request.settings.unwrap_or_default();
    settings
        .validate()
        .map_err(|err| ServiceError::InvalidSettings(err.to_string()))?;

    let store = state.require_store().await?;
    let code = allocate_join_code(state, store.as_ref()).await?;
    let now = SystemTime::now();

    let session = SessionEntity {
        id: Uuid::new_v4(),
        code,
        status: SessionPhase::Lobby,
        round_index: 0,
        rounds: Vec::new(),
        ends_at: None,
        settings: settings.into(),
        creator_uid: creator_uid.to_string(),
        creator_name: creator_name.to_string(),
        venue_name: request
            .venue_name
            .map(|venue| venue.trim().to_string())
            .filter(|venue| !venue.is_empty()),
        used_prompts: Vec::new(),
        version: 0,
        created_at: now,
        started_at: None,
    };
    let session_id = session.id;

    let handle = state.register(LiveSession::new(session));
    let created = commit_with_broadcast(state, &handle, |live, changes| {
        live.touch_session(changes);
        Ok(SessionSummary::from(&live.session))
    })
    .await;

    match created {
        Ok(summary) => {
            info!(%session_id, code = %summary.code, "session created");
            Ok(summary)
        }
        Err(err) => {
            state.evict(session_id).await;
            Err(err)
        }
    }
}

/// Partition the active roster into the groups of round `index`.
fn open_round(live: &mut LiveSession, config: &AppConfig, index: u32) {
    let team_ids: Vec<Uuid> = live.active_teams().map(|team| team.id).collect();

    let session = &mut live.session;
    let library = if session.settings.prompts.is_empty() {
        config.prompts()
    } else {
        session.settings.prompts.as_slice()
    };
    let round = build_round(
        index,
        &team_ids,
        session.settings.group_size as usize,
        library,
        &mut session.used_prompts,
        &mut rand::rng(),
    );

    session.rounds.truncate(index as usize);
    session.rounds.push(round);
    session.round_index = index;
}

/// Add every answer's points of the current round to its team.
fn award_points(live: &mut LiveSession, changes: &mut ChangeSet) {
    let outcome = score_round(live, live.session.round_index);
    for answer in outcome.iter().flat_map(|group| group.answers.iter()) {
        if answer.points == 0 {
            continue;
        }
        if let Some(team) = live.teams.get(&answer.team_id) {
            let mut team = team.clone();
            team.score += answer.points;
            live.put_team(team, changes);
        }
    }
}

/// Apply a plan to the draft and run the side effects of entering the new phase.
fn enter_phase(
    live: &mut LiveSession,
    plan: &Plan,
    config: &AppConfig,
    now: SystemTime,
    changes: &mut ChangeSet,
) -> Result<(), ServiceError> {
    let mut machine = live.machine();
    machine.apply(plan)?;

    match plan.event {
        SessionEvent::StartGame => {
            if live.active_team_count() == 0 {
                return Err(ServiceError::NotEnoughTeams);
            }
            open_round(live, config, 0);
            live.session.started_at = Some(now);
        }
        SessionEvent::CloseVoting => award_points(live, changes),
        SessionEvent::EndSession if plan.from == SessionPhase::Vote => award_points(live, changes),
        SessionEvent::NextRound => {
            let next = live.session.round_index + 1;
            open_round(live, config, next);
        }
        SessionEvent::CloseAnswers | SessionEvent::Finish | SessionEvent::EndSession => {}
    }

    live.session.status = machine.phase();
    live.session.version = machine.version();
    live.session.ends_at = phase_deadline(&live.session.settings, machine.phase(), now);
    live.touch_session(changes);
    Ok(())
}

/// Plan the next forward step of a running session.
fn plan_advance(live: &LiveSession, guard: Option<SessionPhase>) -> Result<Plan, ServiceError> {
    let machine = live.machine();
    if let Some(expected) = guard
        && expected != machine.phase()
    {
        return Err(ServiceError::StaleTransition {
            expected,
            actual: machine.phase(),
        });
    }

    let has_next_round = live.session.round_index + 1 < live.session.settings.rounds;
    let event = SessionEvent::advance_from(machine.phase(), has_next_round).ok_or_else(|| {
        ServiceError::InvalidTransition(format!(
            "a session cannot advance from {:?}",
            machine.phase()
        ))
    })?;
    Ok(machine.plan(event, guard)?)
}

/// Commit a plan computed against an earlier snapshot.
async fn run_plan(
    state: &SharedState,
    handle: &Arc<SessionHandle>,
    plan: Plan,
) -> Result<SessionSummary, ServiceError> {
    let config = state.config();
    let (summary, revealed) = commit_with_broadcast(state, handle, |live, changes| {
        enter_phase(live, &plan, config, SystemTime::now(), changes)?;
        let revealed: Vec<AnswerEntity> = if plan.event == SessionEvent::CloseAnswers {
            live.answers_in_round(live.session.round_index)
                .cloned()
                .collect()
        } else {
            Vec::new()
        };
        Ok((SessionSummary::from(&live.session), revealed))
    })
    .await?;
    reveal_answers(handle.hub(), &revealed);

    info!(
        session_id = %handle.id(),
        plan_id = %plan.id,
        from = ?plan.from,
        to = ?plan.to,
        round = summary.round_index,
        "session phase changed"
    );
    Ok(summary)
}

/// Leave the lobby and open round 0.
pub async fn start_game(
    state: &SharedState,
    session_id: Uuid,
    uid: &str,
) -> Result<SessionSummary, ServiceError> {
    let handle = state.session(session_id).await?;
    let plan = handle
        .read(|live| -> Result<Plan, ServiceError> {
            ensure_host(live, uid)?;
            Ok(live.machine().plan(SessionEvent::StartGame, None)?)
        })
        .await?;
    run_plan(state, &handle, plan).await
}

/// Move a running session one phase forward, provided the host still sees `expected_phase`.
pub async fn advance_phase(
    state: &SharedState,
    session_id: Uuid,
    uid: &str,
    expected_phase: SessionPhase,
) -> Result<SessionSummary, ServiceError> {
    let handle = state.session(session_id).await?;
    let plan = handle
        .read(|live| -> Result<Plan, ServiceError> {
            ensure_host(live, uid)?;
            plan_advance(live, Some(expected_phase))
        })
        .await?;
    run_plan(state, &handle, plan).await
}

/// End the session from any phase. Ending an ended session changes nothing.
pub async fn end_session(
    state: &SharedState,
    session_id: Uuid,
    uid: &str,
) -> Result<SessionSummary, ServiceError> {
    let handle = state.session(session_id).await?;
    handle.read(|live| ensure_host(live, uid)).await?;

    let config = state.config();
    let (summary, ended_now) = commit_with_broadcast(state, &handle, |live, changes| {
        if live.session.status == SessionPhase::Ended {
            return Ok((SessionSummary::from(&live.session), false));
        }
        let plan = live.machine().plan(SessionEvent::EndSession, None)?;
        enter_phase(live, &plan, config, SystemTime::now(), changes)?;
        Ok((SessionSummary::from(&live.session), true))
    })
    .await?;

    if ended_now {
        info!(%session_id, "session ended by host");
    }
    Ok(summary)
}

/// Advance a session whose phase deadline has passed. Returns whether a transition was committed.
///
/// Losing a race against the host is expected and only logged.
pub async fn expire_phase(
    state: &SharedState,
    session_id: Uuid,
    now: SystemTime,
) -> Result<bool, ServiceError> {
    let handle = state.session(session_id).await?;
    let plan = handle
        .read(|live| -> Result<Option<Plan>, ServiceError> {
            match live.session.ends_at {
                Some(deadline) if deadline <= now && live.session.status.is_running() => {
                    plan_advance(live, Some(live.session.status)).map(Some)
                }
                _ => Ok(None),
            }
        })
        .await?;

    let Some(plan) = plan else {
        return Ok(false);
    };

    match run_plan(state, &handle, plan).await {
        Ok(_) => Ok(true),
        Err(ServiceError::StaleTransition { expected, actual }) => {
            debug!(%session_id, ?expected, ?actual, "phase already moved on before expiry");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

/// Read model of a session by id.
pub async fn snapshot(state: &SharedState, session_id: Uuid) -> Result<SessionSnapshot, ServiceError> {
    let handle = state.session(session_id).await?;
    Ok(handle.read(|live| SessionSnapshot::from(live)).await)
}

/// Read model of a session by join code.
pub async fn snapshot_by_code(state: &SharedState, code: &str) -> Result<SessionSnapshot, ServiceError> {
    let handle = state.session_by_code(code).await?;
    Ok(handle.read(|live| SessionSnapshot::from(live)).await)
}

/// Ranked standings of every team, including soft-removed ones.
pub async fn leaderboard(
    state: &SharedState,
    session_id: Uuid,
) -> Result<Vec<LeaderboardEntry>, ServiceError> {
    let handle = state.session(session_id).await?;
    Ok(handle
        .read(|live| build_leaderboard(live).into_iter().map(Into::into).collect())
        .await)
}

/// Per-group breakdown of a round, available once that round reached its results.
pub async fn round_results(
    state: &SharedState,
    session_id: Uuid,
    round_index: u32,
) -> Result<RoundResults, ServiceError> {
    let handle = state.session(session_id).await?;
    handle
        .read(|live| {
            let session = &live.session;
            if round_index as usize >= session.rounds.len() {
                return Err(ServiceError::NotFound(format!(
                    "round {round_index} of session `{session_id}`"
                )));
            }

            let settled = round_index < session.round_index
                || matches!(session.status, SessionPhase::Results | SessionPhase::Ended);
            if !settled {
                return Err(ServiceError::ValidationFailed(format!(
                    "results of round {round_index} are not available yet"
                )));
            }

            Ok(RoundResults {
                round_index,
                groups: score_round(live, round_index)
                    .into_iter()
                    .map(GroupResult::from)
                    .collect(),
            })
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::session_store::memory::MemorySessionStore,
        dto::{
            play::{SubmitAnswerRequest, SubmitVoteRequest},
            session::SettingsInput,
        },
        services::{membership_service, moderation::RustrictModerator, play_service},
        state::AppState,
    };

    async fn app() -> SharedState {
        let state = AppState::new(AppConfig::default(), Arc::new(RustrictModerator));
        state
            .set_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        state
    }

    fn request(settings: SettingsInput) -> CreateSessionRequest {
        CreateSessionRequest {
            creator_name: "Quizmaster".into(),
            venue_name: None,
            settings: Some(settings),
        }
    }

    async fn lobby_with_teams(state: &SharedState, teams: usize) -> SessionSummary {
        let session = create_session(state, "host", request(SettingsInput::default()))
            .await
            .unwrap();
        for index in 0..teams {
            membership_service::join_session(
                state,
                &format!("uid-{index}"),
                crate::dto::team::JoinSessionRequest {
                    code: session.code.clone(),
                    team_name: format!("Team {index}"),
                    device_id: None,
                },
            )
            .await
            .unwrap();
        }
        session
    }

    #[tokio::test]
    async fn created_session_waits_in_lobby() {
        let state = app().await;
        let summary = create_session(&state, "host", request(SettingsInput::default()))
            .await
            .unwrap();
        assert_eq!(summary.status, SessionPhase::Lobby);
        assert_eq!(summary.code.len(), JOIN_CODE_LENGTH);
        assert!(summary.current_round.is_none());

        let by_code = snapshot_by_code(&state, &summary.code.to_lowercase())
            .await
            .unwrap();
        assert_eq!(by_code.session.id, summary.id);
    }

    #[tokio::test]
    async fn out_of_range_settings_are_invalid() {
        let state = app().await;
        let err = create_session(
            &state,
            "host",
            request(SettingsInput {
                rounds: 0,
                ..SettingsInput::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_SETTINGS");
    }

    #[tokio::test]
    async fn blank_creator_name_is_rejected() {
        let state = app().await;
        let err = create_session(
            &state,
            "host",
            CreateSessionRequest {
                creator_name: "   ".into(),
                venue_name: None,
                settings: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn empty_lobby_cannot_start() {
        let state = app().await;
        let session = lobby_with_teams(&state, 0).await;
        let err = start_game(&state, session.id, "host").await.unwrap_err();
        assert_eq!(err.code(), "NOT_ENOUGH_TEAMS");

        let snapshot = snapshot(&state, session.id).await.unwrap();
        assert_eq!(snapshot.session.status, SessionPhase::Lobby);
        assert_eq!(snapshot.session.version, 0);
    }

    #[tokio::test]
    async fn only_the_host_drives_the_session() {
        let state = app().await;
        let session = lobby_with_teams(&state, 2).await;
        let err = start_game(&state, session.id, "uid-0").await.unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn start_opens_round_zero_with_a_deadline() {
        let state = app().await;
        let session = lobby_with_teams(&state, 5).await;
        let started = start_game(&state, session.id, "host").await.unwrap();

        assert_eq!(started.status, SessionPhase::Answer);
        assert!(started.ends_at.is_some());
        assert!(started.started_at.is_some());
        let round = started.current_round.unwrap();
        assert_eq!(round.index, 0);
        assert_eq!(round.groups.len(), 2);
        let covered: usize = round.groups.iter().map(|group| group.team_ids.len()).sum();
        assert_eq!(covered, 5);

        let err = start_game(&state, session.id, "host").await.unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");
    }

    #[tokio::test]
    async fn stale_guard_is_rejected_without_mutation() {
        let state = app().await;
        let session = lobby_with_teams(&state, 2).await;
        start_game(&state, session.id, "host").await.unwrap();

        let err = advance_phase(&state, session.id, "host", SessionPhase::Vote)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STALE_TRANSITION");
        let snapshot = snapshot(&state, session.id).await.unwrap();
        assert_eq!(snapshot.session.status, SessionPhase::Answer);
    }

    #[tokio::test]
    async fn last_round_results_lead_to_the_end() {
        let state = app().await;
        let session = create_session(
            &state,
            "host",
            request(SettingsInput {
                rounds: 1,
                results_secs: 0,
                ..SettingsInput::default()
            }),
        )
        .await
        .unwrap();
        membership_service::join_session(
            &state,
            "uid-a",
            crate::dto::team::JoinSessionRequest {
                code: session.code.clone(),
                team_name: "Alpha".into(),
                device_id: None,
            },
        )
        .await
        .unwrap();

        start_game(&state, session.id, "host").await.unwrap();
        advance_phase(&state, session.id, "host", SessionPhase::Answer)
            .await
            .unwrap();
        let results = advance_phase(&state, session.id, "host", SessionPhase::Vote)
            .await
            .unwrap();
        assert_eq!(results.status, SessionPhase::Results);
        assert!(results.ends_at.is_none(), "results wait for the host");

        let ended = advance_phase(&state, session.id, "host", SessionPhase::Results)
            .await
            .unwrap();
        assert_eq!(ended.status, SessionPhase::Ended);

        let err = advance_phase(&state, session.id, "host", SessionPhase::Ended)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");
    }

    #[tokio::test]
    async fn next_round_repartitions_the_roster() {
        let state = app().await;
        let session = lobby_with_teams(&state, 3).await;
        start_game(&state, session.id, "host").await.unwrap();
        advance_phase(&state, session.id, "host", SessionPhase::Answer)
            .await
            .unwrap();
        advance_phase(&state, session.id, "host", SessionPhase::Vote)
            .await
            .unwrap();
        let next = advance_phase(&state, session.id, "host", SessionPhase::Results)
            .await
            .unwrap();

        assert_eq!(next.status, SessionPhase::Answer);
        assert_eq!(next.round_index, 1);
        assert_eq!(next.current_round.unwrap().index, 1);
    }

    #[tokio::test]
    async fn ending_twice_is_a_no_op() {
        let state = app().await;
        let session = lobby_with_teams(&state, 1).await;
        let first = end_session(&state, session.id, "host").await.unwrap();
        assert_eq!(first.status, SessionPhase::Ended);
        assert!(first.ends_at.is_none());

        let second = end_session(&state, session.id, "host").await.unwrap();
        assert_eq!(second.status, SessionPhase::Ended);
        assert_eq!(second.version, first.version);
    }

    #[tokio::test]
    async fn concurrent_advances_commit_exactly_once() {
        let state = app().await;
        let session = lobby_with_teams(&state, 4).await;
        start_game(&state, session.id, "host").await.unwrap();

        let (left, right) = tokio::join!(
            advance_phase(&state, session.id, "host", SessionPhase::Answer),
            advance_phase(&state, session.id, "host", SessionPhase::Answer),
        );

        let outcomes = [left, right];
        let committed = outcomes.iter().filter(|result| result.is_ok()).count();
        assert_eq!(committed, 1);
        let stale = outcomes
            .iter()
            .filter_map(|result| result.as_ref().err())
            .all(|err| err.code() == "STALE_TRANSITION");
        assert!(stale);

        let snapshot = snapshot(&state, session.id).await.unwrap();
        assert_eq!(snapshot.session.status, SessionPhase::Vote);
        assert_eq!(snapshot.session.version, 2);
    }

    #[tokio::test]
    async fn expiry_only_fires_after_the_deadline() {
        let state = app().await;
        let session = lobby_with_teams(&state, 2).await;
        start_game(&state, session.id, "host").await.unwrap();

        let now = SystemTime::now();
        assert!(!expire_phase(&state, session.id, now).await.unwrap());

        let later = now + Duration::from_secs(600);
        assert!(expire_phase(&state, session.id, later).await.unwrap());
        let snapshot = snapshot(&state, session.id).await.unwrap();
        assert_eq!(snapshot.session.status, SessionPhase::Vote);
    }

    #[tokio::test]
    async fn round_results_wait_for_the_results_phase() {
        let state = app().await;
        let session = lobby_with_teams(&state, 2).await;
        start_game(&state, session.id, "host").await.unwrap();

        let err = round_results(&state, session.id, 0).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
        let err = round_results(&state, session.id, 7).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");

        advance_phase(&state, session.id, "host", SessionPhase::Answer)
            .await
            .unwrap();
        advance_phase(&state, session.id, "host", SessionPhase::Vote)
            .await
            .unwrap();
        let results = round_results(&state, session.id, 0).await.unwrap();
        assert_eq!(results.groups.len(), 1);
        assert!(results.groups[0].winners.is_empty());
    }

    async fn answer_as(state: &SharedState, session_id: Uuid, uid: &str, team_id: Uuid, text: &str) -> Uuid {
        play_service::submit_answer(
            state,
            session_id,
            uid,
            SubmitAnswerRequest {
                team_id,
                round_index: 0,
                text: text.into(),
            },
        )
        .await
        .unwrap()
        .id
    }

    async fn team_ids(state: &SharedState, session_id: Uuid) -> Vec<Uuid> {
        snapshot(state, session_id)
            .await
            .unwrap()
            .teams
            .iter()
            .map(|team| team.id)
            .collect()
    }

    #[tokio::test]
    async fn ending_mid_vote_settles_the_round() {
        let state = app().await;
        let session = lobby_with_teams(&state, 2).await;
        let started = start_game(&state, session.id, "host").await.unwrap();
        let group_id = started.current_round.unwrap().groups[0].id;
        let teams = team_ids(&state, session.id).await;

        let winning = answer_as(&state, session.id, "uid-0", teams[0], "Marmalade").await;
        answer_as(&state, session.id, "uid-1", teams[1], "Custard").await;
        advance_phase(&state, session.id, "host", SessionPhase::Answer)
            .await
            .unwrap();
        play_service::submit_vote(
            &state,
            session.id,
            "uid-1",
            SubmitVoteRequest {
                voter_team_id: teams[1],
                round_index: 0,
                group_id,
                answer_id: winning,
            },
        )
        .await
        .unwrap();

        end_session(&state, session.id, "host").await.unwrap();

        let results = round_results(&state, session.id, 0).await.unwrap();
        let awarded: i64 = results.groups[0]
            .answers
            .iter()
            .filter(|answer| answer.team_id == teams[0])
            .map(|answer| answer.points)
            .sum();
        assert_eq!(awarded, 1100);

        let board = leaderboard(&state, session.id).await.unwrap();
        assert_eq!(board[0].team_id, teams[0]);
        assert_eq!(board[0].score, 1100);
        assert_eq!(board[1].score, 0);

        end_session(&state, session.id, "host").await.unwrap();
        let board = leaderboard(&state, session.id).await.unwrap();
        assert_eq!(board[0].score, 1100, "points are awarded once");
    }

    #[tokio::test]
    async fn answers_are_revealed_when_answering_closes() {
        let state = app().await;
        let session = lobby_with_teams(&state, 2).await;
        start_game(&state, session.id, "host").await.unwrap();
        let teams = team_ids(&state, session.id).await;
        let mut feed = state.session(session.id).await.unwrap().hub().subscribe();

        answer_as(&state, session.id, "uid-0", teams[0], "Marmalade").await;
        let mut while_answering = Vec::new();
        while let Ok(event) = feed.try_recv() {
            while_answering.push(event);
        }
        assert!(
            while_answering
                .iter()
                .any(|event| event.event.as_deref() == Some("answers.upserted"))
        );
        assert!(while_answering.iter().all(|event| !event.data.contains("Marmalade")));

        advance_phase(&state, session.id, "host", SessionPhase::Answer)
            .await
            .unwrap();
        let mut after_close = Vec::new();
        while let Ok(event) = feed.try_recv() {
            after_close.push(event);
        }
        assert!(after_close.iter().any(|event| {
            event.event.as_deref() == Some("answers.upserted") && event.data.contains("Marmalade")
        }));
    }

    #[tokio::test]
    async fn unknown_session_is_reported() {
        let state = app().await;
        let err = snapshot(&state, Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), "SESSION_NOT_FOUND");
    }
}
