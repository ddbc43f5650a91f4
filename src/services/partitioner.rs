//! Splits the active roster into prompt groups for one round.

use std::collections::HashSet;

use rand::{Rng, seq::SliceRandom};
use uuid::Uuid;

use crate::dao::models::{GroupEntity, RoundEntity};

/// Number of groups needed so that none exceeds `group_size`.
pub fn group_count(team_count: usize, group_size: usize) -> usize {
    team_count.div_ceil(group_size.max(1))
}

/// Shuffle teams and deal them round-robin so group sizes differ by at most one.
pub fn partition_teams<R: Rng>(
    team_ids: &[Uuid],
    group_size: usize,
    rng: &mut R,
) -> Vec<Vec<Uuid>> {
    let count = group_count(team_ids.len(), group_size);
    let mut shuffled = team_ids.to_vec();
    shuffled.shuffle(rng);

    let mut groups = vec![Vec::with_capacity(group_size); count];
    for (position, team_id) in shuffled.into_iter().enumerate() {
        groups[position % count].push(team_id);
    }
    groups
}

/// Draw `count` prompt indices from a library of `library_len` entries.
///
/// Indices listed in `used` are skipped until the library runs dry; then the pool is recycled,
/// still avoiding indices drawn earlier in the same call when possible.
pub fn draw_prompts<R: Rng>(
    library_len: usize,
    used: &mut Vec<usize>,
    count: usize,
    rng: &mut R,
) -> Vec<usize> {
    if library_len == 0 {
        return Vec::new();
    }

    let mut drawn = Vec::with_capacity(count);
    for _ in 0..count {
        let mut available = unused(library_len, used);
        if available.is_empty() {
            used.clear();
            used.extend(drawn.iter().copied());
            available = unused(library_len, used);
        }
        if available.is_empty() {
            available = (0..library_len).collect();
        }

        let pick = available[rng.random_range(0..available.len())];
        used.push(pick);
        drawn.push(pick);
    }
    drawn
}

fn unused(library_len: usize, used: &[usize]) -> Vec<usize> {
    let taken: HashSet<usize> = used.iter().copied().collect();
    (0..library_len)
        .filter(|index| !taken.contains(index))
        .collect()
}

/// Build a round over the given teams, recording drawn prompts in `used_prompts`.
pub fn build_round<R: Rng>(
    index: u32,
    team_ids: &[Uuid],
    group_size: usize,
    library: &[String],
    used_prompts: &mut Vec<usize>,
    rng: &mut R,
) -> RoundEntity {
    let partition = partition_teams(team_ids, group_size, rng);
    let prompts = draw_prompts(library.len(), used_prompts, partition.len(), rng);

    let groups = partition
        .into_iter()
        .enumerate()
        .map(|(position, team_ids)| GroupEntity {
            id: Uuid::new_v4(),
            prompt: prompt_text(library, prompts.get(position).copied(), index, position),
            team_ids,
        })
        .collect();

    RoundEntity { index, groups }
}

fn prompt_text(library: &[String], drawn: Option<usize>, round: u32, position: usize) -> String {
    drawn
        .and_then(|index| library.get(index))
        .cloned()
        .unwrap_or_else(|| format!("Round {} prompt {}", round + 1, position + 1))
}

/// Seat a team that joined after the round was partitioned.
///
/// The team goes to the smallest group with room left; when every group is full, it opens a
/// group of its own with a fresh prompt. Returns the id of the group holding the team.
pub fn seat_team<R: Rng>(
    round: &mut RoundEntity,
    team_id: Uuid,
    group_size: usize,
    library: &[String],
    used_prompts: &mut Vec<usize>,
    rng: &mut R,
) -> Uuid {
    if let Some(group) = round
        .groups
        .iter()
        .find(|group| group.team_ids.contains(&team_id))
    {
        return group.id;
    }

    let smallest = round
        .groups
        .iter_mut()
        .filter(|group| group.team_ids.len() < group_size.max(1))
        .min_by_key(|group| group.team_ids.len());
    if let Some(group) = smallest {
        group.team_ids.push(team_id);
        return group.id;
    }

    let drawn = draw_prompts(library.len(), used_prompts, 1, rng);
    let position = round.groups.len();
    let group = GroupEntity {
        id: Uuid::new_v4(),
        prompt: prompt_text(library, drawn.first().copied(), round.index, position),
        team_ids: vec![team_id],
    };
    let id = group.id;
    round.groups.push(group);
    id
}
