use std::time::SystemTime;

use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{AnswerEntity, TeamEntity, VoteEntity},
    dto::play::{AnswerSummary, SubmitAnswerRequest, SubmitVoteRequest, VoteSummary},
    error::ServiceError,
    services::moderation::moderate_answer,
    state::{
        LiveSession, SharedState, state_machine::SessionPhase,
        transitions::commit_with_broadcast,
    },
};

fn ensure_phase(live: &LiveSession, phase: SessionPhase) -> Result<(), ServiceError> {
    if live.session.status == phase {
        Ok(())
    } else {
        Err(ServiceError::InvalidTransition(format!(
            "session is in {:?}, not {phase:?}",
            live.session.status
        )))
    }
}

fn ensure_current_round(live: &LiveSession, round_index: u32) -> Result<(), ServiceError> {
    if live.session.round_index == round_index {
        Ok(())
    } else {
        Err(ServiceError::ValidationFailed(format!(
            "round {round_index} is not the current round ({})",
            live.session.round_index
        )))
    }
}

/// Active team captained by `uid`.
fn captained_team<'a>(
    live: &'a LiveSession,
    team_id: Uuid,
    uid: &str,
) -> Result<&'a TeamEntity, ServiceError> {
    let team = live
        .teams
        .get(&team_id)
        .filter(|team| team.is_active())
        .ok_or_else(|| ServiceError::NotFound(format!("team `{team_id}`")))?;
    if team.uid.as_deref() != Some(uid) {
        return Err(ServiceError::Unauthorized(
            "only the team captain can submit for the team".into(),
        ));
    }
    Ok(team)
}

/// Record a team's answer for the current round.
///
/// Moderation runs before the session gate is taken; flagged text is stored redacted.
pub async fn submit_answer(
    state: &SharedState,
    session_id: Uuid,
    uid: &str,
    request: SubmitAnswerRequest,
) -> Result<AnswerSummary, ServiceError> {
    request
        .validate()
        .map_err(|err| ServiceError::ValidationFailed(err.to_string()))?;
    let handle = state.session(session_id).await?;

    let text = request.text.trim().to_string();
    let moderated = moderate_answer(state.moderator().as_ref(), &text).await;

    let answer = commit_with_broadcast(state, &handle, |live, changes| {
        ensure_phase(live, SessionPhase::Answer)?;
        ensure_current_round(live, request.round_index)?;
        let team = captained_team(live, request.team_id, uid)?;
        let group = live
            .group_of(request.round_index, team.id)
            .ok_or_else(|| {
                ServiceError::ValidationFailed("team has no prompt in this round".into())
            })?;

        let limit = live.session.settings.answer_max_chars as usize;
        let length = text.chars().count();
        if length == 0 || length > limit {
            return Err(ServiceError::ValidationFailed(format!(
                "answer must contain between 1 and {limit} characters"
            )));
        }

        if live
            .answers_in_round(request.round_index)
            .any(|answer| answer.team_id == team.id)
        {
            return Err(ServiceError::DuplicateAnswer);
        }

        let now = SystemTime::now();
        let answer = AnswerEntity {
            id: Uuid::new_v4(),
            session_id,
            team_id: team.id,
            round_index: request.round_index,
            group_id: group.id,
            text: moderated.text.clone(),
            masked: moderated.masked,
            created_at: now,
        };
        live.put_answer(answer.clone(), changes);
        live.mark_team_active(answer.team_id, now, changes);
        Ok(answer)
    })
    .await?;

    info!(
        %session_id,
        team_id = %answer.team_id,
        round = answer.round_index,
        masked = answer.masked,
        "answer submitted"
    );
    Ok(AnswerSummary::from(&answer))
}

/// Record a team's vote for one answer of a group in the current round.
pub async fn submit_vote(
    state: &SharedState,
    session_id: Uuid,
    uid: &str,
    request: SubmitVoteRequest,
) -> Result<VoteSummary, ServiceError> {
    let handle = state.session(session_id).await?;

    let vote = commit_with_broadcast(state, &handle, |live, changes| {
        ensure_phase(live, SessionPhase::Vote)?;
        ensure_current_round(live, request.round_index)?;
        let voter = captained_team(live, request.voter_team_id, uid)?.id;

        let answer = live
            .answers
            .get(&request.answer_id)
            .ok_or_else(|| ServiceError::NotFound(format!("answer `{}`", request.answer_id)))?;
        if answer.round_index != request.round_index || answer.group_id != request.group_id {
            return Err(ServiceError::ValidationFailed(
                "answer does not belong to this round and group".into(),
            ));
        }

        if live.votes_in_round(request.round_index).any(|vote| {
            vote.voter_team_id == voter && vote.group_id == request.group_id
        }) {
            return Err(ServiceError::DuplicateVote);
        }
        if answer.team_id == voter {
            return Err(ServiceError::SelfVote);
        }

        let now = SystemTime::now();
        let vote = VoteEntity {
            id: Uuid::new_v4(),
            session_id,
            voter_team_id: voter,
            round_index: request.round_index,
            group_id: request.group_id,
            answer_id: answer.id,
            created_at: now,
        };
        live.put_vote(vote.clone(), changes);
        live.mark_team_active(voter, now, changes);
        Ok(vote)
    })
    .await?;

    info!(
        %session_id,
        team_id = %vote.voter_team_id,
        round = vote.round_index,
        "vote submitted"
    );
    Ok(VoteSummary::from(&vote))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::session_store::memory::MemorySessionStore,
        dto::{
            session::{CreateSessionRequest, SessionSummary, SettingsInput},
            team::{JoinResponse, JoinSessionRequest, JoinTeamRequest},
        },
        services::{membership_service, moderation::RustrictModerator, session_service},
        state::AppState,
    };

    struct Table {
        state: SharedState,
        session: SessionSummary,
        teams: Vec<JoinResponse>,
        group_id: Uuid,
    }

    async fn started_table(team_count: usize) -> Table {
        started_table_in_groups(team_count, 4).await
    }

    async fn started_table_in_groups(team_count: usize, group_size: u32) -> Table {
        let state = AppState::new(AppConfig::default(), Arc::new(RustrictModerator));
        state
            .set_session_store(Arc::new(MemorySessionStore::new()))
            .await;

        let session = session_service::create_session(
            &state,
            "host",
            CreateSessionRequest {
                creator_name: "Host".into(),
                venue_name: None,
                settings: Some(SettingsInput {
                    answer_max_chars: 20,
                    allow_late_join: true,
                    group_size,
                    ..SettingsInput::default()
                }),
            },
        )
        .await
        .unwrap();

        let mut teams = Vec::new();
        for index in 0..team_count {
            teams.push(
                membership_service::join_session(
                    &state,
                    &format!("captain-{index}"),
                    JoinSessionRequest {
                        code: session.code.clone(),
                        team_name: format!("Team {index}"),
                        device_id: None,
                    },
                )
                .await
                .unwrap(),
            );
        }

        let started = session_service::start_game(&state, session.id, "host")
            .await
            .unwrap();
        let group_id = started.current_round.unwrap().groups[0].id;
        Table {
            state,
            session,
            teams,
            group_id,
        }
    }

    fn answer_request(team: &JoinResponse, text: &str) -> SubmitAnswerRequest {
        SubmitAnswerRequest {
            team_id: team.team.id,
            round_index: 0,
            text: text.to_string(),
        }
    }

    async fn answer(table: &Table, index: usize, text: &str) -> Result<AnswerSummary, ServiceError> {
        submit_answer(
            &table.state,
            table.session.id,
            &format!("captain-{index}"),
            answer_request(&table.teams[index], text),
        )
        .await
    }

    async fn vote(
        table: &Table,
        voter: usize,
        answer_id: Uuid,
        group_id: Uuid,
    ) -> Result<VoteSummary, ServiceError> {
        submit_vote(
            &table.state,
            table.session.id,
            &format!("captain-{voter}"),
            SubmitVoteRequest {
                voter_team_id: table.teams[voter].team.id,
                round_index: 0,
                group_id,
                answer_id,
            },
        )
        .await
    }

    async fn to_vote_phase(table: &Table) {
        session_service::advance_phase(&table.state, table.session.id, "host", SessionPhase::Answer)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn one_answer_per_team_and_round() {
        let table = started_table(3).await;
        let first = answer(&table, 0, "  A llama  ").await.unwrap();
        assert_eq!(first.text, "A llama");
        assert!(!first.masked);

        let err = answer(&table, 0, "Second thoughts").await.unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_ANSWER");
    }

    #[tokio::test]
    async fn concurrent_duplicate_answers_keep_one() {
        let table = started_table(2).await;
        let (left, right) = tokio::join!(answer(&table, 1, "left"), answer(&table, 1, "right"));
        let accepted = [&left, &right].iter().filter(|result| result.is_ok()).count();
        assert_eq!(accepted, 1);

        let snapshot = session_service::snapshot(&table.state, table.session.id)
            .await
            .unwrap();
        assert_eq!(snapshot.answered_team_ids, vec![table.teams[1].team.id]);
    }

    #[tokio::test]
    async fn answers_are_checked_before_storing() {
        let table = started_table(2).await;

        let err = answer(&table, 0, &"x".repeat(21)).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");

        let err = submit_answer(
            &table.state,
            table.session.id,
            "captain-1",
            answer_request(&table.teams[0], "not my team"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");

        let err = submit_answer(
            &table.state,
            table.session.id,
            "captain-0",
            SubmitAnswerRequest {
                round_index: 3,
                ..answer_request(&table.teams[0], "wrong round")
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn only_the_captain_answers_for_the_team() {
        let table = started_table(2).await;
        membership_service::join_team(
            &table.state,
            "teammate",
            JoinTeamRequest {
                code: table.session.code.clone(),
                team_code: table.teams[0].team_code.clone(),
                device_id: None,
            },
        )
        .await
        .unwrap();

        let err = submit_answer(
            &table.state,
            table.session.id,
            "teammate",
            answer_request(&table.teams[0], "sneaky"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn flagged_answers_are_masked() {
        let table = started_table(2).await;
        let stored = answer(&table, 0, "what the fuck").await.unwrap();
        assert!(stored.masked);
        assert_ne!(stored.text, "what the fuck");
    }

    #[tokio::test]
    async fn answers_close_with_the_answer_phase() {
        let table = started_table(2).await;
        to_vote_phase(&table).await;
        let err = answer(&table, 0, "too late").await.unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");
    }

    #[tokio::test]
    async fn vote_rules_are_enforced() {
        let table = started_table(3).await;
        let a = answer(&table, 0, "alpha").await.unwrap();
        let b = answer(&table, 1, "bravo").await.unwrap();

        let err = vote(&table, 1, a.id, table.group_id).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");

        to_vote_phase(&table).await;

        let err = vote(&table, 0, a.id, table.group_id).await.unwrap_err();
        assert_eq!(err.code(), "SELF_VOTE");

        let err = vote(&table, 2, Uuid::new_v4(), table.group_id).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");

        let err = vote(&table, 2, a.id, Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");

        vote(&table, 2, a.id, table.group_id).await.unwrap();
        let err = vote(&table, 2, b.id, table.group_id).await.unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_VOTE");

        let snapshot = session_service::snapshot(&table.state, table.session.id)
            .await
            .unwrap();
        assert_eq!(snapshot.votes.len(), 1);
        assert_eq!(snapshot.answers.len(), 2);
    }

    #[tokio::test]
    async fn teams_vote_once_in_every_group() {
        let table = started_table_in_groups(4, 2).await;
        let snapshot = session_service::snapshot(&table.state, table.session.id)
            .await
            .unwrap();
        let groups = snapshot.session.current_round.unwrap().groups;
        assert_eq!(groups.len(), 2);

        let group_of = |index: usize| {
            groups
                .iter()
                .find(|group| group.team_ids.contains(&table.teams[index].team.id))
                .map(|group| group.id)
                .unwrap()
        };
        let mut answers = Vec::new();
        for index in 0..4 {
            answers.push(answer(&table, index, "idea").await.unwrap());
        }
        to_vote_phase(&table).await;

        let voter = 0;
        let own_group = group_of(voter);
        let outsider = (0..4).find(|&index| group_of(index) != own_group).unwrap();
        let neighbour = (1..4).find(|&index| group_of(index) == own_group).unwrap();

        vote(&table, voter, answers[outsider].id, group_of(outsider))
            .await
            .unwrap();
        vote(&table, voter, answers[neighbour].id, own_group)
            .await
            .unwrap();

        let other = (0..4)
            .find(|&index| index != outsider && group_of(index) == group_of(outsider))
            .unwrap();
        let err = vote(&table, voter, answers[other].id, group_of(outsider))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_VOTE");
    }

    #[tokio::test]
    async fn submissions_leave_the_version_alone() {
        let table = started_table(3).await;
        let before = session_service::snapshot(&table.state, table.session.id)
            .await
            .unwrap()
            .session
            .version;

        let a = answer(&table, 0, "alpha").await.unwrap();
        answer(&table, 1, "bravo").await.unwrap();
        let after_answers = session_service::snapshot(&table.state, table.session.id)
            .await
            .unwrap()
            .session
            .version;
        assert_eq!(after_answers, before);

        to_vote_phase(&table).await;
        vote(&table, 2, a.id, table.group_id).await.unwrap();
        let after_vote = session_service::snapshot(&table.state, table.session.id)
            .await
            .unwrap()
            .session
            .version;
        assert_eq!(after_vote, before + 1);
    }
}
