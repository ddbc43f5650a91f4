use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::state_machine::SessionPhase;

/// Host-tunable settings fixed when the session is created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettingsEntity {
    /// Seconds teams have to submit an answer.
    pub answer_secs: u32,
    /// Seconds teams have to vote.
    pub vote_secs: u32,
    /// Seconds results stay on screen; zero waits for the host.
    pub results_secs: u32,
    /// Maximum number of active teams.
    pub max_teams: u32,
    /// Number of rounds before the session ends.
    pub rounds: u32,
    /// Target number of teams sharing one prompt.
    pub group_size: u32,
    /// Maximum answer length after trimming.
    pub answer_max_chars: u32,
    /// Whether teams may join after the lobby closes.
    pub allow_late_join: bool,
    /// Session-specific prompt library; empty means the configured library.
    #[serde(default)]
    pub prompts: Vec<String>,
}

/// A subset of teams sharing one prompt within a round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupEntity {
    /// Stable identifier for the group.
    pub id: Uuid,
    /// Prompt shown to the group.
    pub prompt: String,
    /// Teams answering this prompt.
    pub team_ids: Vec<Uuid>,
}

/// One prompt/answer/vote cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundEntity {
    /// Zero-based round index.
    pub index: u32,
    /// Disjoint groups covering the teams active at round start.
    pub groups: Vec<GroupEntity>,
}

/// Root row of a session; rounds are embedded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Primary key of the session.
    pub id: Uuid,
    /// Uppercase join code.
    pub code: String,
    /// Current phase.
    pub status: SessionPhase,
    /// Current round, meaningful only while a game is running.
    pub round_index: u32,
    /// Rounds generated so far.
    pub rounds: Vec<RoundEntity>,
    /// Deadline of the current phase, if it auto-expires.
    pub ends_at: Option<SystemTime>,
    /// Settings chosen at creation.
    pub settings: SettingsEntity,
    /// Identity of the host.
    pub creator_uid: String,
    /// Display name of the host.
    pub creator_name: String,
    /// Optional venue shown on the presenter display.
    pub venue_name: Option<String>,
    /// Prompt library indices already drawn in this session.
    #[serde(default)]
    pub used_prompts: Vec<usize>,
    /// Bumped on every phase transition.
    pub version: u64,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Time the host started the game.
    pub started_at: Option<SystemTime>,
}

impl SessionEntity {
    /// Round currently being played, if any.
    pub fn current_round(&self) -> Option<&RoundEntity> {
        match self.status {
            SessionPhase::Lobby | SessionPhase::Ended => None,
            _ => self.rounds.get(self.round_index as usize),
        }
    }
}

/// Team row. `uid` is cleared when the last member leaves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamEntity {
    /// Stable identifier for the team.
    pub id: Uuid,
    /// Owning session.
    pub session_id: Uuid,
    /// Identity of the current captain.
    pub uid: Option<String>,
    /// Display name, unique among active teams.
    pub name: String,
    /// Code other devices use to join this team.
    pub team_code: String,
    /// Cumulative score.
    pub score: i64,
    /// Mascot picked from the configured palette.
    pub mascot: String,
    /// Join timestamp.
    pub joined_at: SystemTime,
    /// Last time a member acted on behalf of the team.
    pub last_active_at: SystemTime,
}

impl TeamEntity {
    /// Teams without a captain are soft-removed.
    pub fn is_active(&self) -> bool {
        self.uid.is_some()
    }
}

/// One identity attached to a team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamMemberEntity {
    /// Owning session.
    pub session_id: Uuid,
    /// Team the member belongs to.
    pub team_id: Uuid,
    /// External identity.
    pub uid: String,
    /// Optional device label.
    pub device_id: Option<String>,
    /// Whether this member currently captains the team.
    pub is_captain: bool,
    /// Join timestamp, used to pick the next captain.
    pub joined_at: SystemTime,
}

/// Name-based ban recorded by the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BannedTeamEntity {
    /// Identifier of the ban row.
    pub id: Uuid,
    /// Owning session.
    pub session_id: Uuid,
    /// Team that was banned.
    pub team_id: Uuid,
    /// Team name at ban time; blocks joins with the same name.
    pub team_name: String,
    /// Identity of the host who banned the team.
    pub banned_by: String,
    /// Optional reason shown to the host.
    pub reason: Option<String>,
    /// Ban timestamp.
    pub created_at: SystemTime,
}

/// A team's answer for one round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerEntity {
    /// Identifier of the answer.
    pub id: Uuid,
    /// Owning session.
    pub session_id: Uuid,
    /// Answering team.
    pub team_id: Uuid,
    /// Round the answer belongs to.
    pub round_index: u32,
    /// Group the team answered in.
    pub group_id: Uuid,
    /// Stored rendering, redacted when flagged.
    pub text: String,
    /// Whether moderation flagged the original text.
    pub masked: bool,
    /// Submission timestamp.
    pub created_at: SystemTime,
}

/// A team's vote for one answer of a group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteEntity {
    /// Identifier of the vote.
    pub id: Uuid,
    /// Owning session.
    pub session_id: Uuid,
    /// Voting team.
    pub voter_team_id: Uuid,
    /// Round the vote belongs to.
    pub round_index: u32,
    /// Group the voted answer belongs to.
    pub group_id: Uuid,
    /// Answer receiving the vote.
    pub answer_id: Uuid,
    /// Submission timestamp.
    pub created_at: SystemTime,
}

/// Everything persisted for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    /// Session row; `None` only while a record is being assembled.
    pub session: Option<SessionEntity>,
    /// Team rows, including soft-removed ones.
    pub teams: Vec<TeamEntity>,
    /// Membership rows.
    pub members: Vec<TeamMemberEntity>,
    /// Ban rows.
    pub bans: Vec<BannedTeamEntity>,
    /// Answer rows.
    pub answers: Vec<AnswerEntity>,
    /// Vote rows.
    pub votes: Vec<VoteEntity>,
}

/// Persisted collections, used to name change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// `sessions`
    Sessions,
    /// `teams`
    Teams,
    /// `team_members`
    TeamMembers,
    /// `banned_teams`
    BannedTeams,
    /// `answers`
    Answers,
    /// `votes`
    Votes,
}

impl Collection {
    /// Collection name as stored and broadcast.
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Sessions => "sessions",
            Collection::Teams => "teams",
            Collection::TeamMembers => "team_members",
            Collection::BannedTeams => "banned_teams",
            Collection::Answers => "answers",
            Collection::Votes => "votes",
        }
    }
}

/// A single row-level change committed as part of one session mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredChange {
    /// Insert or replace the session row.
    Session(SessionEntity),
    /// Insert or replace a team row.
    Team(TeamEntity),
    /// Delete a team row.
    TeamDeleted {
        /// Deleted team.
        team_id: Uuid,
    },
    /// Insert or replace a membership row.
    Member(TeamMemberEntity),
    /// Delete a membership row.
    MemberDeleted {
        /// Team the member belonged to.
        team_id: Uuid,
        /// Identity of the removed member.
        uid: String,
    },
    /// Insert or replace a ban row.
    Ban(BannedTeamEntity),
    /// Delete a ban row.
    BanDeleted {
        /// Deleted ban.
        ban_id: Uuid,
    },
    /// Insert an answer row.
    Answer(AnswerEntity),
    /// Insert a vote row.
    Vote(VoteEntity),
}

impl StoredChange {
    /// Collection touched by this change.
    pub fn collection(&self) -> Collection {
        match self {
            StoredChange::Session(_) => Collection::Sessions,
            StoredChange::Team(_) | StoredChange::TeamDeleted { .. } => Collection::Teams,
            StoredChange::Member(_) | StoredChange::MemberDeleted { .. } => {
                Collection::TeamMembers
            }
            StoredChange::Ban(_) | StoredChange::BanDeleted { .. } => Collection::BannedTeams,
            StoredChange::Answer(_) => Collection::Answers,
            StoredChange::Vote(_) => Collection::Votes,
        }
    }

    /// Row key inside its collection.
    pub fn key(&self) -> String {
        match self {
            StoredChange::Session(session) => session.id.to_string(),
            StoredChange::Team(team) => team.id.to_string(),
            StoredChange::TeamDeleted { team_id } => team_id.to_string(),
            StoredChange::Member(member) => member_key(member.team_id, &member.uid),
            StoredChange::MemberDeleted { team_id, uid } => member_key(*team_id, uid),
            StoredChange::Ban(ban) => ban.id.to_string(),
            StoredChange::BanDeleted { ban_id } => ban_id.to_string(),
            StoredChange::Answer(answer) => answer.id.to_string(),
            StoredChange::Vote(vote) => vote.id.to_string(),
        }
    }

    /// Whether the change removes its row.
    pub fn is_delete(&self) -> bool {
        matches!(
            self,
            StoredChange::TeamDeleted { .. }
                | StoredChange::MemberDeleted { .. }
                | StoredChange::BanDeleted { .. }
        )
    }

    /// Round index for answer and vote rows, used to filter subscriptions.
    pub fn round_index(&self) -> Option<u32> {
        match self {
            StoredChange::Answer(answer) => Some(answer.round_index),
            StoredChange::Vote(vote) => Some(vote.round_index),
            _ => None,
        }
    }
}

/// Membership rows are keyed by team and identity.
pub fn member_key(team_id: Uuid, uid: &str) -> String {
    format!("{team_id}:{uid}")
}

impl SessionRecord {
    /// Apply committed changes in order.
    pub fn apply(&mut self, changes: &[StoredChange]) {
        for change in changes {
            match change {
                StoredChange::Session(session) => self.session = Some(session.clone()),
                StoredChange::Team(team) => upsert(&mut self.teams, team.clone(), |t| t.id),
                StoredChange::TeamDeleted { team_id } => self.teams.retain(|t| t.id != *team_id),
                StoredChange::Member(member) => {
                    let key = member_key(member.team_id, &member.uid);
                    match self
                        .members
                        .iter_mut()
                        .find(|m| member_key(m.team_id, &m.uid) == key)
                    {
                        Some(slot) => *slot = member.clone(),
                        None => self.members.push(member.clone()),
                    }
                }
                StoredChange::MemberDeleted { team_id, uid } => self
                    .members
                    .retain(|m| !(m.team_id == *team_id && m.uid == *uid)),
                StoredChange::Ban(ban) => upsert(&mut self.bans, ban.clone(), |b| b.id),
                StoredChange::BanDeleted { ban_id } => self.bans.retain(|b| b.id != *ban_id),
                StoredChange::Answer(answer) => upsert(&mut self.answers, answer.clone(), |a| a.id),
                StoredChange::Vote(vote) => upsert(&mut self.votes, vote.clone(), |v| v.id),
            }
        }
    }
}

fn upsert<T>(rows: &mut Vec<T>, row: T, key: impl Fn(&T) -> Uuid) {
    let id = key(&row);
    match rows.iter_mut().find(|existing| key(existing) == id) {
        Some(slot) => *slot = row,
        None => rows.push(row),
    }
}
