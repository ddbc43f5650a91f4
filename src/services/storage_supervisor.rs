use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{session_store::SessionStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

fn backoff(delay: Duration) -> Duration {
    (delay * 2).min(MAX_DELAY)
}

/// Connect to the session store, then keep polling it; the shared state is flagged degraded
/// whenever the store stops answering.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn SessionStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_session_store(store.clone()).await;
                info!("session store connected; leaving degraded mode");
                delay = INITIAL_DELAY;

                watch_health(&state, store.as_ref()).await;
                warn!("session store lost; reconnecting from scratch");
            }
            Err(err) => warn!(error = %err, "session store connection attempt failed"),
        }

        sleep(delay).await;
        delay = backoff(delay);
    }
}

/// Poll the store until it fails and cannot be revived in place.
async fn watch_health(state: &SharedState, store: &dyn SessionStore) {
    loop {
        if store.health_check().await.is_ok() {
            if state.is_degraded().await {
                info!("session store healthy again; leaving degraded mode");
                state.update_degraded(false).await;
            }
            sleep(HEALTH_POLL_INTERVAL).await;
            continue;
        }

        if reconnect(state, store).await {
            state.update_degraded(false).await;
            sleep(HEALTH_POLL_INTERVAL).await;
        } else {
            warn!("exhausted session store reconnect attempts; staying in degraded mode");
            return;
        }
    }
}

async fn reconnect(state: &SharedState, store: &dyn SessionStore) -> bool {
    let mut delay = INITIAL_DELAY;
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "session store reconnected after failed health check");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(attempt, error = %err, "session store reconnect failed; entering degraded mode");
                    state.update_degraded(true).await;
                } else {
                    warn!(attempt, error = %err, "session store reconnect attempt failed");
                }
                sleep(delay).await;
                delay = backoff(delay);
            }
        }
    }
    false
}
