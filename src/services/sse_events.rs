use serde::Serialize;
use tracing::warn;

use crate::{
    dao::models::{AnswerEntity, Collection, StoredChange},
    dto::{
        play::{AnswerReceipt, AnswerSummary, VoteSummary},
        session::SessionSummary,
        sse::{DeletedEvent, ServerEvent},
        team::{BannedTeamSummary, TeamMemberSummary, TeamSummary},
    },
    state::{SseHub, state_machine::SessionPhase},
};

const SUFFIX_UPSERTED: &str = "upserted";
const SUFFIX_DELETED: &str = "deleted";

/// Publish one event per committed row change, in commit order.
///
/// `phase` is the session phase the changes were committed in. Answer text stays private while
/// it is still [`SessionPhase::Answer`]; only a receipt goes out.
pub fn broadcast_changes(hub: &SseHub, changes: &[StoredChange], phase: SessionPhase) {
    for change in changes {
        broadcast_change(hub, change, phase);
    }
}

/// Publish the full text of answers once answering closed.
pub fn reveal_answers(hub: &SseHub, answers: &[AnswerEntity]) {
    let name = format!("{}.{SUFFIX_UPSERTED}", Collection::Answers.as_str());
    for answer in answers {
        send_event(
            hub,
            name.clone(),
            Some(answer.round_index),
            &AnswerSummary::from(answer),
        );
    }
}

fn broadcast_change(hub: &SseHub, change: &StoredChange, phase: SessionPhase) {
    let suffix = if change.is_delete() {
        SUFFIX_DELETED
    } else {
        SUFFIX_UPSERTED
    };
    let name = format!("{}.{suffix}", change.collection().as_str());
    let round = change.round_index();

    match change {
        StoredChange::Session(session) => {
            send_event(hub, name, round, &SessionSummary::from(session))
        }
        StoredChange::Team(team) => send_event(hub, name, round, &TeamSummary::from(team)),
        StoredChange::Member(member) => {
            send_event(hub, name, round, &TeamMemberSummary::from(member))
        }
        StoredChange::Ban(ban) => send_event(hub, name, round, &BannedTeamSummary::from(ban)),
        StoredChange::Answer(answer) if phase == SessionPhase::Answer => {
            send_event(hub, name, round, &AnswerReceipt::from(answer))
        }
        StoredChange::Answer(answer) => {
            send_event(hub, name, round, &AnswerSummary::from(answer))
        }
        StoredChange::Vote(vote) => send_event(hub, name, round, &VoteSummary::from(vote)),
        StoredChange::TeamDeleted { .. }
        | StoredChange::MemberDeleted { .. }
        | StoredChange::BanDeleted { .. } => {
            send_event(hub, name, round, &DeletedEvent { id: change.key() })
        }
    }
}

fn send_event(hub: &SseHub, event: String, round: Option<u32>, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.clone()), payload) {
        Ok(event) => hub.broadcast(event.in_round(round)),
        Err(err) => warn!(event = %event, error = %err, "failed to serialize SSE payload"),
    }
}
