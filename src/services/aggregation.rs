//! Vote tallies and winner selection over committed rows.

use indexmap::IndexMap;
use uuid::Uuid;

use crate::dao::models::{AnswerEntity, VoteEntity};

/// Count votes per answer. Every answer starts at zero; votes for answers outside `answers`
/// contribute nothing.
pub fn tally_votes<'a>(
    answers: impl IntoIterator<Item = &'a AnswerEntity>,
    votes: impl IntoIterator<Item = &'a VoteEntity>,
) -> IndexMap<Uuid, u32> {
    let mut counts: IndexMap<Uuid, u32> = answers.into_iter().map(|answer| (answer.id, 0)).collect();
    for vote in votes {
        if let Some(count) = counts.get_mut(&vote.answer_id) {
            *count += 1;
        }
    }
    counts
}

/// Every answer tied at the greatest vote count, provided that count is positive.
pub fn determine_winners<'a>(
    answers: impl IntoIterator<Item = &'a AnswerEntity>,
    counts: &IndexMap<Uuid, u32>,
) -> Vec<Uuid> {
    let scored: Vec<(Uuid, u32)> = answers
        .into_iter()
        .map(|answer| (answer.id, counts.get(&answer.id).copied().unwrap_or(0)))
        .collect();

    let best = scored.iter().map(|(_, count)| *count).max().unwrap_or(0);
    if best == 0 {
        return Vec::new();
    }

    scored
        .into_iter()
        .filter(|(_, count)| *count == best)
        .map(|(id, _)| id)
        .collect()
}
