use std::time::SystemTime;

use rand::seq::IndexedRandom;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AppConfig,
    dao::models::{BannedTeamEntity, SessionEntity, TeamEntity, TeamMemberEntity},
    dto::{
        session::SessionSummary,
        team::{
            BanRequest, BannedTeamSummary, JoinResponse, JoinSessionRequest, JoinTeamRequest,
            TeamSummary,
        },
    },
    error::ServiceError,
    services::{
        partitioner::seat_team,
        session_service::{ensure_host, generate_code},
    },
    state::{
        ChangeSet, LiveSession, SharedState, state_machine::SessionPhase,
        transitions::commit_with_broadcast,
    },
};

/// Length of the code teammates use to attach extra devices to a team.
pub const TEAM_CODE_LENGTH: usize = 4;

fn ensure_accepting_joins(session: &SessionEntity) -> Result<(), ServiceError> {
    match session.status {
        SessionPhase::Lobby => Ok(()),
        SessionPhase::Ended => Err(ServiceError::SessionClosed),
        _ if session.settings.allow_late_join => Ok(()),
        _ => Err(ServiceError::SessionClosed),
    }
}

/// Seat a team joining a running game in a group of the current round.
fn seat_late_team(
    live: &mut LiveSession,
    config: &AppConfig,
    team_id: Uuid,
    changes: &mut ChangeSet,
) {
    if !live.session.status.is_running() {
        return;
    }

    let session = &mut live.session;
    let library = if session.settings.prompts.is_empty() {
        config.prompts()
    } else {
        session.settings.prompts.as_slice()
    };
    let Some(round) = session.rounds.get_mut(session.round_index as usize) else {
        return;
    };
    seat_team(
        round,
        team_id,
        session.settings.group_size as usize,
        library,
        &mut session.used_prompts,
        &mut rand::rng(),
    );
    live.touch_session(changes);
}

fn join_response(live: &LiveSession, team: &TeamEntity, uid: &str) -> JoinResponse {
    JoinResponse {
        session: SessionSummary::from(&live.session),
        team: team.into(),
        team_code: team.team_code.clone(),
        is_captain: team.uid.as_deref() == Some(uid),
    }
}

/// First palette entry no active team wears, or a random one once the palette is exhausted.
fn pick_mascot(live: &LiveSession, config: &AppConfig) -> String {
    let used: Vec<&str> = live.active_teams().map(|team| team.mascot.as_str()).collect();
    match config.first_unused_mascot(&used) {
        Some(mascot) => mascot.to_string(),
        None => config
            .mascots()
            .choose(&mut rand::rng())
            .cloned()
            .unwrap_or_default(),
    }
}

fn unique_team_code(live: &LiveSession) -> String {
    loop {
        let code = generate_code(TEAM_CODE_LENGTH);
        if !live.teams.values().any(|team| team.team_code == code) {
            return code;
        }
    }
}

/// Create a team in the session identified by `request.code`, with the caller as captain.
///
/// A caller already playing for an active team gets that team back instead, even after the lobby
/// closed, so reconnecting devices find their team again.
pub async fn join_session(
    state: &SharedState,
    uid: &str,
    request: JoinSessionRequest,
) -> Result<JoinResponse, ServiceError> {
    request
        .validate()
        .map_err(|err| ServiceError::ValidationFailed(err.to_string()))?;
    let handle = state.session_by_code(&request.code).await?;
    let team_name = request.team_name.trim().to_string();
    let device_id = request.device_id;
    let config = state.config();

    let (response, created) = commit_with_broadcast(state, &handle, |live, changes| {
        if let Some(team) = live.team_of_member(uid) {
            return Ok((join_response(live, team, uid), false));
        }
        ensure_accepting_joins(&live.session)?;

        let max_teams = live.session.settings.max_teams;
        if live.active_team_count() >= max_teams as usize {
            return Err(ServiceError::SessionFull(max_teams));
        }
        if live.active_team_named(&team_name).is_some() {
            return Err(ServiceError::DuplicateTeamName(team_name.clone()));
        }
        if live.is_name_banned(&team_name) {
            return Err(ServiceError::Banned(team_name.clone()));
        }

        let now = SystemTime::now();
        let team = TeamEntity {
            id: Uuid::new_v4(),
            session_id: live.session.id,
            uid: Some(uid.to_string()),
            name: team_name.clone(),
            team_code: unique_team_code(live),
            score: 0,
            mascot: pick_mascot(live, config),
            joined_at: now,
            last_active_at: now,
        };
        live.put_team(team.clone(), changes);
        live.put_member(
            TeamMemberEntity {
                session_id: live.session.id,
                team_id: team.id,
                uid: uid.to_string(),
                device_id: device_id.clone(),
                is_captain: true,
                joined_at: now,
            },
            changes,
        );
        seat_late_team(live, config, team.id, changes);
        Ok((join_response(live, &team, uid), true))
    })
    .await?;

    if created {
        info!(
            session_id = %handle.id(),
            team_id = %response.team.id,
            team = %response.team.name,
            "team joined"
        );
    }
    Ok(response)
}

/// Attach the caller's device to an existing team as a non-captain member.
pub async fn join_team(
    state: &SharedState,
    uid: &str,
    request: JoinTeamRequest,
) -> Result<JoinResponse, ServiceError> {
    request
        .validate()
        .map_err(|err| ServiceError::ValidationFailed(err.to_string()))?;
    let handle = state.session_by_code(&request.code).await?;
    let team_code = request.team_code.trim().to_string();
    let device_id = request.device_id;

    commit_with_broadcast(state, &handle, |live, changes| {
        ensure_accepting_joins(&live.session)?;

        let team = live
            .active_team_with_code(&team_code)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("team with code `{team_code}`")))?;

        if let Some(current) = live.team_of_member(uid) {
            if current.id == team.id {
                return Ok(join_response(live, &team, uid));
            }
            return Err(ServiceError::ValidationFailed(
                "this identity already plays for another team".into(),
            ));
        }

        live.put_member(
            TeamMemberEntity {
                session_id: live.session.id,
                team_id: team.id,
                uid: uid.to_string(),
                device_id: device_id.clone(),
                is_captain: false,
                joined_at: SystemTime::now(),
            },
            changes,
        );
        Ok(join_response(live, &team, uid))
    })
    .await
}

/// Remove the caller from a team.
///
/// A departing captain hands over to the earliest-joined remaining member; when nobody is left
/// the team is soft-removed and keeps its score and history.
pub async fn leave_team(
    state: &SharedState,
    session_id: Uuid,
    team_id: Uuid,
    uid: &str,
) -> Result<TeamSummary, ServiceError> {
    let handle = state.session(session_id).await?;

    let team = commit_with_broadcast(state, &handle, |live, changes| {
        let mut team = live
            .teams
            .get(&team_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("team `{team_id}`")))?;
        let member = live
            .remove_member(team_id, uid, changes)
            .ok_or_else(|| ServiceError::NotFound(format!("member of team `{team_id}`")))?;

        if member.is_captain {
            let next_captain = live.members_of(team_id).next().cloned();
            match next_captain {
                Some(mut successor) => {
                    successor.is_captain = true;
                    team.uid = Some(successor.uid.clone());
                    live.put_member(successor, changes);
                }
                None => team.uid = None,
            }
            live.put_team(team.clone(), changes);
        }
        Ok(team)
    })
    .await?;

    match &team.uid {
        Some(captain) => info!(%session_id, %team_id, captain = %captain, "member left team"),
        None => info!(%session_id, %team_id, "last member left; team soft-removed"),
    }
    Ok(TeamSummary::from(&team))
}

/// Delete a team and its members without banning it.
pub async fn kick_team(
    state: &SharedState,
    session_id: Uuid,
    host_uid: &str,
    team_id: Uuid,
) -> Result<(), ServiceError> {
    let handle = state.session(session_id).await?;
    commit_with_broadcast(state, &handle, |live, changes| {
        ensure_host(live, host_uid)?;
        live.remove_team(team_id, changes)
            .ok_or_else(|| ServiceError::NotFound(format!("team `{team_id}`")))?;
        Ok(())
    })
    .await?;

    info!(%session_id, %team_id, "team kicked");
    Ok(())
}

/// Delete a team and block its name from rejoining.
pub async fn ban_team(
    state: &SharedState,
    session_id: Uuid,
    host_uid: &str,
    team_id: Uuid,
    request: BanRequest,
) -> Result<BannedTeamSummary, ServiceError> {
    request
        .validate()
        .map_err(|err| ServiceError::ValidationFailed(err.to_string()))?;
    let handle = state.session(session_id).await?;
    let reason = request
        .reason
        .map(|reason| reason.trim().to_string())
        .filter(|reason| !reason.is_empty());

    let ban = commit_with_broadcast(state, &handle, |live, changes| {
        ensure_host(live, host_uid)?;
        let team = live
            .remove_team(team_id, changes)
            .ok_or_else(|| ServiceError::NotFound(format!("team `{team_id}`")))?;

        let ban = BannedTeamEntity {
            id: Uuid::new_v4(),
            session_id,
            team_id,
            team_name: team.name,
            banned_by: host_uid.to_string(),
            reason: reason.clone(),
            created_at: SystemTime::now(),
        };
        live.put_ban(ban.clone(), changes);
        Ok(ban)
    })
    .await?;

    info!(%session_id, %team_id, team = %ban.team_name, "team banned");
    Ok(BannedTeamSummary::from(&ban))
}

/// Lift a ban so the name may join again.
pub async fn unban_team(
    state: &SharedState,
    session_id: Uuid,
    host_uid: &str,
    ban_id: Uuid,
) -> Result<(), ServiceError> {
    let handle = state.session(session_id).await?;
    commit_with_broadcast(state, &handle, |live, changes| {
        ensure_host(live, host_uid)?;
        live.remove_ban(ban_id, changes)
            .ok_or_else(|| ServiceError::NotFound(format!("ban `{ban_id}`")))?;
        Ok(())
    })
    .await?;

    info!(%session_id, %ban_id, "ban lifted");
    Ok(())
}

/// Bans of a session, oldest first.
pub async fn list_bans(
    state: &SharedState,
    session_id: Uuid,
    host_uid: &str,
) -> Result<Vec<BannedTeamSummary>, ServiceError> {
    let handle = state.session(session_id).await?;
    handle
        .read(|live| -> Result<Vec<BannedTeamSummary>, ServiceError> {
            ensure_host(live, host_uid)?;
            Ok(live.bans.values().map(BannedTeamSummary::from).collect())
        })
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use futures::future::BoxFuture;

    use super::*;
    use crate::{
        dao::{
            models::{SessionRecord, StoredChange},
            session_store::{SessionStore, memory::MemorySessionStore},
            storage::{StorageError, StorageResult},
        },
        dto::session::{CreateSessionRequest, SettingsInput},
        services::{moderation::RustrictModerator, session_service},
        state::AppState,
    };

    /// Memory store whose commits can be switched off.
    #[derive(Clone, Default)]
    struct FlakyStore {
        inner: MemorySessionStore,
        failing: Arc<AtomicBool>,
    }

    impl SessionStore for FlakyStore {
        fn commit(
            &self,
            session_id: Uuid,
            changes: Vec<StoredChange>,
        ) -> BoxFuture<'static, StorageResult<()>> {
            if self.failing.load(Ordering::SeqCst) {
                return Box::pin(async {
                    Err(StorageError::unavailable(
                        "commit refused",
                        std::io::Error::other("disk on fire"),
                    ))
                });
            }
            self.inner.commit(session_id, changes)
        }

        fn load_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionRecord>>> {
            self.inner.load_session(id)
        }

        fn find_session_by_code(
            &self,
            code: String,
        ) -> BoxFuture<'static, StorageResult<Option<Uuid>>> {
            self.inner.find_session_by_code(code)
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.try_reconnect()
        }
    }

    async fn app_with(store: Arc<dyn SessionStore>) -> SharedState {
        let state = AppState::new(AppConfig::default(), Arc::new(RustrictModerator));
        state.set_session_store(store).await;
        state
    }

    async fn app() -> SharedState {
        app_with(Arc::new(MemorySessionStore::new())).await
    }

    async fn session(state: &SharedState, settings: SettingsInput) -> SessionSummary {
        session_service::create_session(
            state,
            "host",
            CreateSessionRequest {
                creator_name: "Host".into(),
                venue_name: Some("The Crown".into()),
                settings: Some(settings),
            },
        )
        .await
        .unwrap()
    }

    async fn join(
        state: &SharedState,
        code: &str,
        uid: &str,
        name: &str,
    ) -> Result<JoinResponse, ServiceError> {
        join_session(
            state,
            uid,
            JoinSessionRequest {
                code: code.to_string(),
                team_name: name.to_string(),
                device_id: None,
            },
        )
        .await
    }

    async fn join_as_member(
        state: &SharedState,
        code: &str,
        uid: &str,
        team_code: &str,
    ) -> Result<JoinResponse, ServiceError> {
        join_team(
            state,
            uid,
            JoinTeamRequest {
                code: code.to_string(),
                team_code: team_code.to_string(),
                device_id: Some("tablet".into()),
            },
        )
        .await
    }

    #[tokio::test]
    async fn joining_creates_a_captained_team() {
        let state = app().await;
        let session = session(&state, SettingsInput::default()).await;

        let joined = join(&state, &session.code, "uid-a", "  Quizzly Bears ").await.unwrap();
        assert!(joined.is_captain);
        assert_eq!(joined.team.name, "Quizzly Bears");
        assert_eq!(joined.team_code.len(), TEAM_CODE_LENGTH);
        assert_eq!(joined.team.mascot, AppConfig::default().mascots()[0]);

        let again = join(&state, &session.code, "uid-a", "Another Name").await.unwrap();
        assert_eq!(again.team.id, joined.team.id);

        let snapshot = session_service::snapshot(&state, session.id).await.unwrap();
        assert_eq!(snapshot.teams.len(), 1);
    }

    #[tokio::test]
    async fn mascots_are_not_shared_while_the_palette_lasts() {
        let state = app().await;
        let session = session(&state, SettingsInput::default()).await;
        let first = join(&state, &session.code, "uid-a", "Alpha").await.unwrap();
        let second = join(&state, &session.code, "uid-b", "Bravo").await.unwrap();
        assert_ne!(first.team.mascot, second.team.mascot);
    }

    #[tokio::test]
    async fn join_rules_are_enforced() {
        let state = app().await;
        let session = session(
            &state,
            SettingsInput {
                max_teams: 2,
                ..SettingsInput::default()
            },
        )
        .await;

        join(&state, &session.code, "uid-a", "Alpha").await.unwrap();
        let err = join(&state, &session.code, "uid-b", "Alpha").await.unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_TEAM_NAME");

        join(&state, &session.code, "uid-b", "Bravo").await.unwrap();
        let err = join(&state, &session.code, "uid-c", "Charlie").await.unwrap_err();
        assert_eq!(err.code(), "SESSION_FULL");

        let err = join(&state, "ZZZZZZ", "uid-c", "Charlie").await.unwrap_err();
        assert_eq!(err.code(), "SESSION_NOT_FOUND");

        let err = join(&state, &session.code, "uid-d", "   ").await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn banned_names_stay_out_until_unbanned() {
        let state = app().await;
        let session = session(&state, SettingsInput::default()).await;
        let joined = join(&state, &session.code, "uid-a", "Rowdy").await.unwrap();

        let ban = ban_team(
            &state,
            session.id,
            "host",
            joined.team.id,
            BanRequest {
                reason: Some("heckling".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(ban.team_name, "Rowdy");

        let err = join(&state, &session.code, "uid-b", "Rowdy").await.unwrap_err();
        assert_eq!(err.code(), "BANNED");

        let bans = list_bans(&state, session.id, "host").await.unwrap();
        assert_eq!(bans.len(), 1);
        let err = list_bans(&state, session.id, "uid-a").await.unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");

        unban_team(&state, session.id, "host", ban.id).await.unwrap();
        join(&state, &session.code, "uid-b", "Rowdy").await.unwrap();
    }

    #[tokio::test]
    async fn kicked_team_may_rejoin() {
        let state = app().await;
        let session = session(&state, SettingsInput::default()).await;
        let joined = join(&state, &session.code, "uid-a", "Alpha").await.unwrap();

        let err = kick_team(&state, session.id, "uid-a", joined.team.id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");

        kick_team(&state, session.id, "host", joined.team.id).await.unwrap();
        let snapshot = session_service::snapshot(&state, session.id).await.unwrap();
        assert!(snapshot.teams.is_empty());

        let rejoined = join(&state, &session.code, "uid-a", "Alpha").await.unwrap();
        assert_ne!(rejoined.team.id, joined.team.id);
    }

    #[tokio::test]
    async fn lobby_closes_unless_late_join_is_allowed() {
        let state = app().await;
        let closed = session(&state, SettingsInput::default()).await;
        join(&state, &closed.code, "uid-a", "Alpha").await.unwrap();
        session_service::start_game(&state, closed.id, "host").await.unwrap();
        let err = join(&state, &closed.code, "uid-b", "Bravo").await.unwrap_err();
        assert_eq!(err.code(), "SESSION_CLOSED");

        let open = session(
            &state,
            SettingsInput {
                allow_late_join: true,
                ..SettingsInput::default()
            },
        )
        .await;
        join(&state, &open.code, "uid-a", "Alpha").await.unwrap();
        session_service::start_game(&state, open.id, "host").await.unwrap();
        join(&state, &open.code, "uid-b", "Bravo").await.unwrap();

        session_service::end_session(&state, open.id, "host").await.unwrap();
        let err = join(&state, &open.code, "uid-c", "Charlie").await.unwrap_err();
        assert_eq!(err.code(), "SESSION_CLOSED");
    }

    #[tokio::test]
    async fn late_teams_join_a_group_of_the_running_round() {
        let state = app().await;
        let open = session(
            &state,
            SettingsInput {
                allow_late_join: true,
                ..SettingsInput::default()
            },
        )
        .await;
        join(&state, &open.code, "uid-a", "Alpha").await.unwrap();
        session_service::start_game(&state, open.id, "host").await.unwrap();

        join(&state, &open.code, "uid-b", "Bravo").await.unwrap();
        join(&state, &open.code, "uid-c", "Charlie").await.unwrap();
        session_service::advance_phase(&state, open.id, "host", SessionPhase::Answer)
            .await
            .unwrap();
        join(&state, &open.code, "uid-d", "Delta").await.unwrap();
        session_service::advance_phase(&state, open.id, "host", SessionPhase::Vote)
            .await
            .unwrap();
        join(&state, &open.code, "uid-e", "Echo").await.unwrap();

        let snapshot = session_service::snapshot(&state, open.id).await.unwrap();
        let round = snapshot.session.current_round.unwrap();
        assert_eq!(round.index, 0);
        assert_eq!(round.groups.len(), 2);
        assert_eq!(round.groups[0].team_ids.len(), 4);
        for team in &snapshot.teams {
            let holding = round
                .groups
                .iter()
                .filter(|group| group.team_ids.contains(&team.id))
                .count();
            assert_eq!(holding, 1, "{} is not seated exactly once", team.name);
        }
    }

    #[tokio::test]
    async fn captaincy_passes_to_the_earliest_member() {
        let state = app().await;
        let session = session(&state, SettingsInput::default()).await;
        let captain = join(&state, &session.code, "uid-a", "Alpha").await.unwrap();

        let second = join_as_member(&state, &session.code, "uid-b", &captain.team_code)
            .await
            .unwrap();
        assert!(!second.is_captain);
        assert_eq!(second.team.id, captain.team.id);
        join_as_member(&state, &session.code, "uid-c", &captain.team_code)
            .await
            .unwrap();

        let after = leave_team(&state, session.id, captain.team.id, "uid-a")
            .await
            .unwrap();
        assert!(after.active);

        let promoted = join_as_member(&state, &session.code, "uid-b", &captain.team_code)
            .await
            .unwrap();
        assert!(promoted.is_captain);
    }

    #[tokio::test]
    async fn last_member_leaving_soft_removes_the_team() {
        let state = app().await;
        let session = session(&state, SettingsInput::default()).await;
        let joined = join(&state, &session.code, "uid-a", "Alpha").await.unwrap();

        let left = leave_team(&state, session.id, joined.team.id, "uid-a")
            .await
            .unwrap();
        assert!(!left.active);

        let snapshot = session_service::snapshot(&state, session.id).await.unwrap();
        assert!(snapshot.teams.is_empty());
        assert_eq!(snapshot.leaderboard.len(), 1);
        assert!(!snapshot.leaderboard[0].active);

        join(&state, &session.code, "uid-b", "Alpha").await.unwrap();

        let err = leave_team(&state, session.id, joined.team.id, "uid-a")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn member_of_one_team_cannot_join_another() {
        let state = app().await;
        let session = session(&state, SettingsInput::default()).await;
        join(&state, &session.code, "uid-a", "Alpha").await.unwrap();
        let bravo = join(&state, &session.code, "uid-b", "Bravo").await.unwrap();

        let err = join_as_member(&state, &session.code, "uid-a", &bravo.team_code)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");

        let err = join_as_member(&state, &session.code, "uid-c", "QQQQ")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn failed_commit_leaves_no_trace() {
        let store = FlakyStore::default();
        let state = app_with(Arc::new(store.clone())).await;
        let session = session(&state, SettingsInput::default()).await;

        store.failing.store(true, Ordering::SeqCst);
        let err = join(&state, &session.code, "uid-a", "Alpha").await.unwrap_err();
        assert_eq!(err.code(), "STORAGE_UNAVAILABLE");

        let snapshot = session_service::snapshot(&state, session.id).await.unwrap();
        assert!(snapshot.teams.is_empty());

        store.failing.store(false, Ordering::SeqCst);
        join(&state, &session.code, "uid-a", "Alpha").await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_joins_respect_the_team_cap() {
        let state = app().await;
        let session = session(
            &state,
            SettingsInput {
                max_teams: 3,
                ..SettingsInput::default()
            },
        )
        .await;

        let mut tasks = Vec::new();
        for index in 0..8 {
            let state = state.clone();
            let code = session.code.clone();
            tasks.push(tokio::spawn(async move {
                join(&state, &code, &format!("uid-{index}"), &format!("Team {index}")).await
            }));
        }

        let mut joined = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => joined += 1,
                Err(err) => assert_eq!(err.code(), "SESSION_FULL"),
            }
        }
        assert_eq!(joined, 3);
    }
}
