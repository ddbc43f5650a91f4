use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{BannedTeamEntity, TeamEntity, TeamMemberEntity},
    dto::{
        format_system_time,
        session::SessionSummary,
        validation::{validate_join_code, validate_team_name},
    },
};

/// Payload sent by a device creating a new team.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinSessionRequest {
    #[validate(custom(function = "validate_join_code"))]
    pub code: String,
    #[validate(custom(function = "validate_team_name"))]
    pub team_name: String,
    #[serde(default)]
    #[validate(length(max = 64))]
    pub device_id: Option<String>,
}

/// Payload sent by an extra device joining an existing team.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinTeamRequest {
    #[validate(custom(function = "validate_join_code"))]
    pub code: String,
    #[validate(length(equal = 4))]
    pub team_code: String,
    #[serde(default)]
    #[validate(length(max = 64))]
    pub device_id: Option<String>,
}

/// Optional reason recorded with a ban.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct BanRequest {
    #[serde(default)]
    #[validate(length(max = 200))]
    pub reason: Option<String>,
}

/// Returned to a device after joining.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JoinResponse {
    pub session: SessionSummary,
    pub team: TeamSummary,
    /// Shared with teammates so their devices can join the same team.
    pub team_code: String,
    pub is_captain: bool,
}

/// Public projection of a team. The team code is only returned to members.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamSummary {
    pub id: Uuid,
    pub name: String,
    pub score: i64,
    pub mascot: String,
    pub active: bool,
    pub joined_at: String,
    pub last_active_at: String,
}

impl From<&TeamEntity> for TeamSummary {
    fn from(team: &TeamEntity) -> Self {
        Self {
            id: team.id,
            name: team.name.clone(),
            score: team.score,
            mascot: team.mascot.clone(),
            active: team.is_active(),
            joined_at: format_system_time(team.joined_at),
            last_active_at: format_system_time(team.last_active_at),
        }
    }
}

/// Ban row as shown to the host.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BannedTeamSummary {
    pub id: Uuid,
    pub team_id: Uuid,
    pub team_name: String,
    pub reason: Option<String>,
    pub created_at: String,
}

impl From<&BannedTeamEntity> for BannedTeamSummary {
    fn from(ban: &BannedTeamEntity) -> Self {
        Self {
            id: ban.id,
            team_id: ban.team_id,
            team_name: ban.team_name.clone(),
            reason: ban.reason.clone(),
            created_at: format_system_time(ban.created_at),
        }
    }
}

/// Emitted on the change feed when a membership row changes.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamMemberSummary {
    pub team_id: Uuid,
    pub device_id: Option<String>,
    pub is_captain: bool,
    pub joined_at: String,
}

impl From<&TeamMemberEntity> for TeamMemberSummary {
    fn from(member: &TeamMemberEntity) -> Self {
        Self {
            team_id: member.team_id,
            device_id: member.device_id.clone(),
            is_captain: member.is_captain,
            joined_at: format_system_time(member.joined_at),
        }
    }
}
