use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    dao::models::{GroupEntity, RoundEntity, SessionEntity, SettingsEntity},
    dto::{
        format_system_time,
        play::{AnswerSummary, VoteSummary},
        team::TeamSummary,
    },
    services::scoring::{AnswerOutcome, GroupOutcome, LeaderboardRow, build_leaderboard},
    state::{LiveSession, state_machine::SessionPhase},
};

/// Payload used by a host to open a new session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateSessionRequest {
    #[validate(length(min = 1, max = 40))]
    pub creator_name: String,
    #[serde(default)]
    #[validate(length(max = 80))]
    pub venue_name: Option<String>,
    /// Omitted settings fall back to their defaults.
    #[serde(default)]
    pub settings: Option<SettingsInput>,
}

/// Host-tunable settings. Every field is optional on the wire.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct SettingsInput {
    #[serde(default = "default_answer_secs")]
    #[validate(range(min = 10, max = 600))]
    pub answer_secs: u32,
    #[serde(default = "default_vote_secs")]
    #[validate(range(min = 10, max = 600))]
    pub vote_secs: u32,
    /// Zero keeps results on screen until the host advances.
    #[serde(default = "default_results_secs")]
    #[validate(range(max = 300))]
    pub results_secs: u32,
    #[serde(default = "default_max_teams")]
    #[validate(range(min = 1, max = 100))]
    pub max_teams: u32,
    #[serde(default = "default_rounds")]
    #[validate(range(min = 1, max = 20))]
    pub rounds: u32,
    #[serde(default = "default_group_size")]
    #[validate(range(min = 2, max = 12))]
    pub group_size: u32,
    #[serde(default = "default_answer_max_chars")]
    #[validate(range(min = 1, max = 500))]
    pub answer_max_chars: u32,
    #[serde(default)]
    pub allow_late_join: bool,
    /// Session-specific prompt library replacing the configured one.
    #[serde(default)]
    #[validate(length(max = 200), custom(function = "validate_prompts"))]
    pub prompts: Vec<String>,
}

fn default_answer_secs() -> u32 {
    90
}

fn default_vote_secs() -> u32 {
    45
}

fn default_results_secs() -> u32 {
    15
}

fn default_max_teams() -> u32 {
    12
}

fn default_rounds() -> u32 {
    3
}

fn default_group_size() -> u32 {
    4
}

fn default_answer_max_chars() -> u32 {
    120
}

fn validate_prompts(prompts: &[String]) -> Result<(), ValidationError> {
    for prompt in prompts {
        let length = prompt.trim().chars().count();
        if !(1..=200).contains(&length) {
            let mut err = ValidationError::new("prompt_length");
            err.message = Some("Prompts must contain between 1 and 200 characters".into());
            return Err(err);
        }
    }
    Ok(())
}

impl Default for SettingsInput {
    fn default() -> Self {
        Self {
            answer_secs: default_answer_secs(),
            vote_secs: default_vote_secs(),
            results_secs: default_results_secs(),
            max_teams: default_max_teams(),
            rounds: default_rounds(),
            group_size: default_group_size(),
            answer_max_chars: default_answer_max_chars(),
            allow_late_join: false,
            prompts: Vec::new(),
        }
    }
}

impl From<SettingsInput> for SettingsEntity {
    fn from(input: SettingsInput) -> Self {
        Self {
            answer_secs: input.answer_secs,
            vote_secs: input.vote_secs,
            results_secs: input.results_secs,
            max_teams: input.max_teams,
            rounds: input.rounds,
            group_size: input.group_size,
            answer_max_chars: input.answer_max_chars,
            allow_late_join: input.allow_late_join,
            prompts: input
                .prompts
                .into_iter()
                .map(|prompt| prompt.trim().to_string())
                .collect(),
        }
    }
}

/// Phase guard sent with every host advance.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AdvanceRequest {
    /// Phase the host console currently displays.
    pub expected_phase: SessionPhase,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SettingsSummary {
    pub answer_secs: u32,
    pub vote_secs: u32,
    pub results_secs: u32,
    pub max_teams: u32,
    pub rounds: u32,
    pub group_size: u32,
    pub answer_max_chars: u32,
    pub allow_late_join: bool,
    pub custom_prompts: usize,
}

impl From<&SettingsEntity> for SettingsSummary {
    fn from(settings: &SettingsEntity) -> Self {
        Self {
            answer_secs: settings.answer_secs,
            vote_secs: settings.vote_secs,
            results_secs: settings.results_secs,
            max_teams: settings.max_teams,
            rounds: settings.rounds,
            group_size: settings.group_size,
            answer_max_chars: settings.answer_max_chars,
            allow_late_join: settings.allow_late_join,
            custom_prompts: settings.prompts.len(),
        }
    }
}

/// Public projection of a session row.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionSummary {
    pub id: Uuid,
    pub code: String,
    pub status: SessionPhase,
    pub round_index: u32,
    pub total_rounds: u32,
    /// RFC 3339 deadline of the current phase, absent when the host advances manually.
    pub ends_at: Option<String>,
    pub creator_name: String,
    pub venue_name: Option<String>,
    pub settings: SettingsSummary,
    pub current_round: Option<RoundSummary>,
    pub version: u64,
    pub created_at: String,
    pub started_at: Option<String>,
}

impl From<&SessionEntity> for SessionSummary {
    fn from(session: &SessionEntity) -> Self {
        Self {
            id: session.id,
            code: session.code.clone(),
            status: session.status,
            round_index: session.round_index,
            total_rounds: session.settings.rounds,
            ends_at: session.ends_at.map(format_system_time),
            creator_name: session.creator_name.clone(),
            venue_name: session.venue_name.clone(),
            settings: (&session.settings).into(),
            current_round: session.current_round().map(Into::into),
            version: session.version,
            created_at: format_system_time(session.created_at),
            started_at: session.started_at.map(format_system_time),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoundSummary {
    pub index: u32,
    pub groups: Vec<GroupSummary>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GroupSummary {
    pub id: Uuid,
    pub prompt: String,
    pub team_ids: Vec<Uuid>,
}

impl From<&RoundEntity> for RoundSummary {
    fn from(round: &RoundEntity) -> Self {
        Self {
            index: round.index,
            groups: round.groups.iter().map(Into::into).collect(),
        }
    }
}

impl From<&GroupEntity> for GroupSummary {
    fn from(group: &GroupEntity) -> Self {
        Self {
            id: group.id,
            prompt: group.prompt.clone(),
            team_ids: group.team_ids.clone(),
        }
    }
}

/// Read model served to hosts, teams and presenter displays.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionSnapshot {
    pub session: SessionSummary,
    /// Active teams in join order.
    pub teams: Vec<TeamSummary>,
    /// Teams that already answered the current round.
    pub answered_team_ids: Vec<Uuid>,
    /// Current round answers; withheld while answers are still being written.
    pub answers: Vec<AnswerSummary>,
    /// Current round votes.
    pub votes: Vec<VoteSummary>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

impl From<&LiveSession> for SessionSnapshot {
    fn from(live: &LiveSession) -> Self {
        let session = &live.session;
        let running = session.status.is_running();
        let round = session.round_index;

        let answered_team_ids = if running {
            live.answers_in_round(round).map(|answer| answer.team_id).collect()
        } else {
            Vec::new()
        };
        let answers = if running && session.status != SessionPhase::Answer {
            live.answers_in_round(round).map(Into::into).collect()
        } else {
            Vec::new()
        };
        let votes = if running {
            live.votes_in_round(round).map(Into::into).collect()
        } else {
            Vec::new()
        };

        Self {
            session: session.into(),
            teams: live.active_teams().map(Into::into).collect(),
            answered_team_ids,
            answers,
            votes,
            leaderboard: build_leaderboard(live)
                .into_iter()
                .map(Into::into)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub team_id: Uuid,
    pub name: String,
    pub score: i64,
    pub mascot: String,
    pub active: bool,
}

impl From<LeaderboardRow> for LeaderboardEntry {
    fn from(row: LeaderboardRow) -> Self {
        Self {
            rank: row.rank,
            team_id: row.team_id,
            name: row.name,
            score: row.score,
            mascot: row.mascot,
            active: row.active,
        }
    }
}

/// Per-group breakdown of one round.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoundResults {
    pub round_index: u32,
    pub groups: Vec<GroupResult>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GroupResult {
    pub group_id: Uuid,
    pub prompt: String,
    pub winners: Vec<Uuid>,
    pub answers: Vec<AnswerResult>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnswerResult {
    pub answer_id: Uuid,
    pub team_id: Uuid,
    pub text: String,
    pub masked: bool,
    pub votes: u32,
    pub winner: bool,
    pub points: i64,
}

impl From<GroupOutcome> for GroupResult {
    fn from(outcome: GroupOutcome) -> Self {
        Self {
            group_id: outcome.group_id,
            prompt: outcome.prompt.clone(),
            winners: outcome.winners().map(|answer| answer.answer_id).collect(),
            answers: outcome.answers.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<AnswerOutcome> for AnswerResult {
    fn from(outcome: AnswerOutcome) -> Self {
        Self {
            answer_id: outcome.answer_id,
            team_id: outcome.team_id,
            text: outcome.text,
            masked: outcome.masked,
            votes: outcome.votes,
            winner: outcome.winner,
            points: outcome.points,
        }
    }
}
