//! Round scoring and leaderboard ranking.

use itertools::Itertools;
use uuid::Uuid;

use crate::{
    dao::models::{AnswerEntity, VoteEntity},
    services::aggregation::{determine_winners, tally_votes},
    state::LiveSession,
};

/// Points per vote received.
pub const POINTS_PER_VOTE: i64 = 100;
/// Bonus awarded to every winning answer of a group.
pub const WINNER_BONUS: i64 = 1000;

/// Points earned by one answer.
pub fn calculate_points(vote_count: u32, is_winner: bool) -> i64 {
    i64::from(vote_count) * POINTS_PER_VOTE + if is_winner { WINNER_BONUS } else { 0 }
}

/// Scored answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub answer_id: Uuid,
    pub team_id: Uuid,
    pub text: String,
    pub masked: bool,
    pub votes: u32,
    pub winner: bool,
    pub points: i64,
}

/// Scored group of one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOutcome {
    pub group_id: Uuid,
    pub prompt: String,
    pub answers: Vec<AnswerOutcome>,
}

impl GroupOutcome {
    /// Answers that won the group.
    pub fn winners(&self) -> impl Iterator<Item = &AnswerOutcome> {
        self.answers.iter().filter(|answer| answer.winner)
    }
}

/// Tally every group of a round. Returns an empty list for rounds that do not exist.
pub fn score_round(live: &LiveSession, round_index: u32) -> Vec<GroupOutcome> {
    let Some(round) = live.session.rounds.get(round_index as usize) else {
        return Vec::new();
    };

    round
        .groups
        .iter()
        .map(|group| {
            let answers: Vec<&AnswerEntity> = live
                .answers_in_round(round_index)
                .filter(|answer| answer.group_id == group.id)
                .collect();
            let votes: Vec<&VoteEntity> = live
                .votes_in_round(round_index)
                .filter(|vote| vote.group_id == group.id)
                .collect();

            let counts = tally_votes(answers.iter().copied(), votes.iter().copied());
            let winners = determine_winners(answers.iter().copied(), &counts);

            let answers = answers
                .into_iter()
                .map(|answer| {
                    let votes = counts.get(&answer.id).copied().unwrap_or(0);
                    let winner = winners.contains(&answer.id);
                    AnswerOutcome {
                        answer_id: answer.id,
                        team_id: answer.team_id,
                        text: answer.text.clone(),
                        masked: answer.masked,
                        votes,
                        winner,
                        points: calculate_points(votes, winner),
                    }
                })
                .collect();

            GroupOutcome {
                group_id: group.id,
                prompt: group.prompt.clone(),
                answers,
            }
        })
        .collect()
}

/// One leaderboard line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardRow {
    /// Competition rank: tied scores share a rank and the next rank skips accordingly.
    pub rank: u32,
    pub team_id: Uuid,
    pub name: String,
    pub score: i64,
    pub mascot: String,
    /// Soft-removed teams keep their score but are flagged inactive.
    pub active: bool,
}

/// Rank every team of the session by score, then by name.
pub fn build_leaderboard(live: &LiveSession) -> Vec<LeaderboardRow> {
    let sorted = live
        .teams
        .values()
        .sorted_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));

    let mut rows: Vec<LeaderboardRow> = Vec::with_capacity(live.teams.len());
    for (position, team) in sorted.enumerate() {
        let rank = match rows.last() {
            Some(previous) if previous.score == team.score => previous.rank,
            _ => position as u32 + 1,
        };
        rows.push(LeaderboardRow {
            rank,
            team_id: team.id,
            name: team.name.clone(),
            score: team.score,
            mascot: team.mascot.clone(),
            active: team.is_active(),
        });
    }
    rows
}
