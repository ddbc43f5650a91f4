//! In-memory aggregate of one session and the handle that serializes its mutations.

use std::{sync::Arc, time::SystemTime};

use indexmap::IndexMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{
            AnswerEntity, BannedTeamEntity, GroupEntity, SessionEntity, SessionRecord,
            StoredChange, TeamEntity, TeamMemberEntity, VoteEntity,
        },
        session_store::SessionStore,
    },
    error::ServiceError,
    state::{SseHub, state_machine::SessionStateMachine},
};

/// Row changes recorded while a mutation runs against a draft.
#[derive(Debug, Default)]
pub struct ChangeSet {
    changes: Vec<StoredChange>,
}

impl ChangeSet {
    /// Record one change.
    pub fn push(&mut self, change: StoredChange) {
        self.changes.push(change);
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Recorded changes, in order.
    pub fn into_inner(self) -> Vec<StoredChange> {
        self.changes
    }
}

/// Committed state of one session.
#[derive(Debug, Clone)]
pub struct LiveSession {
    /// Session row.
    pub session: SessionEntity,
    /// Teams in join order, including soft-removed ones.
    pub teams: IndexMap<Uuid, TeamEntity>,
    /// Membership rows in join order.
    pub members: Vec<TeamMemberEntity>,
    /// Ban rows.
    pub bans: IndexMap<Uuid, BannedTeamEntity>,
    /// Answers in submission order.
    pub answers: IndexMap<Uuid, AnswerEntity>,
    /// Votes in submission order.
    pub votes: IndexMap<Uuid, VoteEntity>,
}

impl LiveSession {
    /// Wrap a freshly created session row.
    pub fn new(session: SessionEntity) -> Self {
        Self {
            session,
            teams: IndexMap::new(),
            members: Vec::new(),
            bans: IndexMap::new(),
            answers: IndexMap::new(),
            votes: IndexMap::new(),
        }
    }

    /// Rebuild the aggregate from persisted rows; `None` when the session row is missing.
    pub fn from_record(record: SessionRecord) -> Option<Self> {
        let SessionRecord {
            session,
            mut teams,
            mut members,
            bans,
            mut answers,
            mut votes,
        } = record;

        teams.sort_by_key(|team| team.joined_at);
        members.sort_by_key(|member| member.joined_at);
        answers.sort_by_key(|answer| answer.created_at);
        votes.sort_by_key(|vote| vote.created_at);

        Some(Self {
            session: session?,
            teams: teams.into_iter().map(|team| (team.id, team)).collect(),
            members,
            bans: bans.into_iter().map(|ban| (ban.id, ban)).collect(),
            answers: answers
                .into_iter()
                .map(|answer| (answer.id, answer))
                .collect(),
            votes: votes.into_iter().map(|vote| (vote.id, vote)).collect(),
        })
    }

    /// State machine positioned at the committed phase.
    pub fn machine(&self) -> SessionStateMachine {
        SessionStateMachine::at(self.session.status, self.session.version)
    }

    /// Teams that still have a captain, in join order.
    pub fn active_teams(&self) -> impl Iterator<Item = &TeamEntity> {
        self.teams.values().filter(|team| team.is_active())
    }

    /// Number of active teams.
    pub fn active_team_count(&self) -> usize {
        self.active_teams().count()
    }

    /// Active team with exactly this name.
    pub fn active_team_named(&self, name: &str) -> Option<&TeamEntity> {
        self.active_teams().find(|team| team.name == name)
    }

    /// Active team with this team code.
    pub fn active_team_with_code(&self, team_code: &str) -> Option<&TeamEntity> {
        self.active_teams()
            .find(|team| team.team_code.eq_ignore_ascii_case(team_code))
    }

    /// Active team the identity is a member of.
    pub fn team_of_member(&self, uid: &str) -> Option<&TeamEntity> {
        self.members
            .iter()
            .filter(|member| member.uid == uid)
            .find_map(|member| self.teams.get(&member.team_id))
            .filter(|team| team.is_active())
    }

    /// Members of a team in join order.
    pub fn members_of(&self, team_id: Uuid) -> impl Iterator<Item = &TeamMemberEntity> {
        self.members
            .iter()
            .filter(move |member| member.team_id == team_id)
    }

    /// Whether a ban row blocks this exact name.
    pub fn is_name_banned(&self, name: &str) -> bool {
        self.bans.values().any(|ban| ban.team_name == name)
    }

    /// Group a team was assigned to in a round.
    pub fn group_of(&self, round_index: u32, team_id: Uuid) -> Option<&GroupEntity> {
        self.session
            .rounds
            .get(round_index as usize)?
            .groups
            .iter()
            .find(|group| group.team_ids.contains(&team_id))
    }

    /// Group of a round by id.
    pub fn group(&self, round_index: u32, group_id: Uuid) -> Option<&GroupEntity> {
        self.session
            .rounds
            .get(round_index as usize)?
            .groups
            .iter()
            .find(|group| group.id == group_id)
    }

    /// Answers of one round, in submission order.
    pub fn answers_in_round(&self, round_index: u32) -> impl Iterator<Item = &AnswerEntity> {
        self.answers
            .values()
            .filter(move |answer| answer.round_index == round_index)
    }

    /// Votes of one round, in submission order.
    pub fn votes_in_round(&self, round_index: u32) -> impl Iterator<Item = &VoteEntity> {
        self.votes
            .values()
            .filter(move |vote| vote.round_index == round_index)
    }

    /// Record the session row as changed.
    pub fn touch_session(&mut self, changes: &mut ChangeSet) {
        changes.push(StoredChange::Session(self.session.clone()));
    }

    /// Insert or replace a team.
    pub fn put_team(&mut self, team: TeamEntity, changes: &mut ChangeSet) {
        changes.push(StoredChange::Team(team.clone()));
        self.teams.insert(team.id, team);
    }

    /// Delete a team together with its members.
    pub fn remove_team(&mut self, team_id: Uuid, changes: &mut ChangeSet) -> Option<TeamEntity> {
        let team = self.teams.shift_remove(&team_id)?;
        let departing: Vec<String> = self
            .members_of(team_id)
            .map(|member| member.uid.clone())
            .collect();
        for uid in departing {
            self.remove_member(team_id, &uid, changes);
        }
        changes.push(StoredChange::TeamDeleted { team_id });
        Some(team)
    }

    /// Insert or replace a membership row.
    pub fn put_member(&mut self, member: TeamMemberEntity, changes: &mut ChangeSet) {
        changes.push(StoredChange::Member(member.clone()));
        match self
            .members
            .iter_mut()
            .find(|existing| existing.team_id == member.team_id && existing.uid == member.uid)
        {
            Some(slot) => *slot = member,
            None => self.members.push(member),
        }
    }

    /// Delete a membership row.
    pub fn remove_member(
        &mut self,
        team_id: Uuid,
        uid: &str,
        changes: &mut ChangeSet,
    ) -> Option<TeamMemberEntity> {
        let position = self
            .members
            .iter()
            .position(|member| member.team_id == team_id && member.uid == uid)?;
        let member = self.members.remove(position);
        changes.push(StoredChange::MemberDeleted {
            team_id,
            uid: uid.to_string(),
        });
        Some(member)
    }

    /// Insert a ban row.
    pub fn put_ban(&mut self, ban: BannedTeamEntity, changes: &mut ChangeSet) {
        changes.push(StoredChange::Ban(ban.clone()));
        self.bans.insert(ban.id, ban);
    }

    /// Delete a ban row.
    pub fn remove_ban(&mut self, ban_id: Uuid, changes: &mut ChangeSet) -> Option<BannedTeamEntity> {
        let ban = self.bans.shift_remove(&ban_id)?;
        changes.push(StoredChange::BanDeleted { ban_id });
        Some(ban)
    }

    /// Insert an answer.
    pub fn put_answer(&mut self, answer: AnswerEntity, changes: &mut ChangeSet) {
        changes.push(StoredChange::Answer(answer.clone()));
        self.answers.insert(answer.id, answer);
    }

    /// Insert a vote.
    pub fn put_vote(&mut self, vote: VoteEntity, changes: &mut ChangeSet) {
        changes.push(StoredChange::Vote(vote.clone()));
        self.votes.insert(vote.id, vote);
    }

    /// Refresh a team's activity timestamp.
    pub fn mark_team_active(&mut self, team_id: Uuid, now: SystemTime, changes: &mut ChangeSet) {
        if let Some(team) = self.teams.get(&team_id) {
            let mut team = team.clone();
            team.last_active_at = now;
            self.put_team(team, changes);
        }
    }
}

/// Shared handle for one live session.
pub struct SessionHandle {
    id: Uuid,
    gate: Mutex<()>,
    live: RwLock<LiveSession>,
    hub: SseHub,
}

impl SessionHandle {
    /// Wrap committed state in a new handle.
    pub fn new(live: LiveSession) -> Self {
        Self {
            id: live.session.id,
            gate: Mutex::new(()),
            live: RwLock::new(live),
            hub: SseHub::default(),
        }
    }

    /// Session identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Change feed of this session.
    pub fn hub(&self) -> &SseHub {
        &self.hub
    }

    /// Run a read-only projection against the committed state without taking the gate.
    pub async fn read<R>(&self, read: impl FnOnce(&LiveSession) -> R) -> R {
        let guard = self.live.read().await;
        read(&guard)
    }

    /// Serialize a mutation: run `work` on a draft, persist its changes, then publish the draft.
    ///
    /// Nothing becomes visible unless `work` succeeds and the store accepts the whole batch.
    pub async fn mutate<T, F>(
        &self,
        store: &Arc<dyn SessionStore>,
        work: F,
    ) -> Result<(T, Vec<StoredChange>), ServiceError>
    where
        F: FnOnce(&mut LiveSession, &mut ChangeSet) -> Result<T, ServiceError>,
    {
        let _gate = self.gate.lock().await;

        let mut draft = self.live.read().await.clone();
        let mut changes = ChangeSet::default();
        let value = work(&mut draft, &mut changes)?;

        if changes.is_empty() {
            return Ok((value, Vec::new()));
        }

        let changes = changes.into_inner();
        if let Err(err) = store.commit(self.id, changes.clone()).await {
            warn!(session_id = %self.id, error = %err, "failed to persist session changes");
            return Err(err.into());
        }

        *self.live.write().await = draft;
        debug!(session_id = %self.id, count = changes.len(), "session changes committed");
        Ok((value, changes))
    }
}
