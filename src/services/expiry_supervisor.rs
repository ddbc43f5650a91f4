use std::time::{Duration, SystemTime};

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use crate::{
    services::session_service,
    state::{SharedState, state_machine::SessionPhase},
};

/// Interval between deadline sweeps.
pub const TICK: Duration = Duration::from_secs(1);

/// Advance sessions whose phase deadline passed, forever.
pub async fn run(state: SharedState) {
    let mut ticker = interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        sweep(&state, SystemTime::now()).await;
    }
}

/// One pass over the sessions held in memory: expire due phases, then evict ended sessions
/// nobody is watching anymore. Returns how many phases were advanced.
pub async fn sweep(state: &SharedState, now: SystemTime) -> usize {
    let mut advanced = 0;

    for handle in state.live_sessions() {
        let (phase, ends_at) = handle
            .read(|live| (live.session.status, live.session.ends_at))
            .await;

        match (phase, ends_at) {
            (SessionPhase::Ended, _) => {
                if handle.hub().subscriber_count() == 0 {
                    state.evict(handle.id()).await;
                }
            }
            (_, Some(deadline)) if deadline <= now => {
                match session_service::expire_phase(state, handle.id(), now).await {
                    Ok(true) => advanced += 1,
                    Ok(false) => {}
                    Err(err) => {
                        warn!(session_id = %handle.id(), error = %err, "failed to expire phase")
                    }
                }
            }
            _ => {}
        }
    }

    if advanced > 0 {
        debug!(advanced, "expired session phases");
    }
    advanced
}
