use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{AnswerEntity, VoteEntity},
    dto::format_system_time,
};

/// Answer submitted by a team captain.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitAnswerRequest {
    pub team_id: Uuid,
    pub round_index: u32,
    /// Upper bound enforced by the session's `answer_max_chars` after trimming.
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
}

/// Vote cast by a team captain for one answer of a group.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitVoteRequest {
    pub voter_team_id: Uuid,
    pub round_index: u32,
    pub group_id: Uuid,
    pub answer_id: Uuid,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnswerSummary {
    pub id: Uuid,
    pub team_id: Uuid,
    pub round_index: u32,
    pub group_id: Uuid,
    pub text: String,
    pub masked: bool,
    pub created_at: String,
}

impl From<&AnswerEntity> for AnswerSummary {
    fn from(answer: &AnswerEntity) -> Self {
        Self {
            id: answer.id,
            team_id: answer.team_id,
            round_index: answer.round_index,
            group_id: answer.group_id,
            text: answer.text.clone(),
            masked: answer.masked,
            created_at: format_system_time(answer.created_at),
        }
    }
}

/// Answer as announced while answers are still being written: who answered, never what.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnswerReceipt {
    pub id: Uuid,
    pub team_id: Uuid,
    pub round_index: u32,
    pub group_id: Uuid,
    pub created_at: String,
}

impl From<&AnswerEntity> for AnswerReceipt {
    fn from(answer: &AnswerEntity) -> Self {
        Self {
            id: answer.id,
            team_id: answer.team_id,
            round_index: answer.round_index,
            group_id: answer.group_id,
            created_at: format_system_time(answer.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VoteSummary {
    pub id: Uuid,
    pub voter_team_id: Uuid,
    pub round_index: u32,
    pub group_id: Uuid,
    pub answer_id: Uuid,
    pub created_at: String,
}

impl From<&VoteEntity> for VoteSummary {
    fn from(vote: &VoteEntity) -> Self {
        Self {
            id: vote.id,
            voter_team_id: vote.voter_team_id,
            round_index: vote.round_index,
            group_id: vote.group_id,
            answer_id: vote.answer_id,
            created_at: format_system_time(vote.created_at),
        }
    }
}
