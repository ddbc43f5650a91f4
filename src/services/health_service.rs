use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Ping the session store and report health, logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let live_sessions = state.live_session_count();

    let store = match state.require_store().await {
        Ok(store) => store,
        Err(_) => {
            warn!("session store unavailable (degraded mode)");
            return HealthResponse::degraded(live_sessions);
        }
    };

    if let Err(err) = store.health_check().await {
        warn!(error = %err, "session store health check failed");
        return HealthResponse::degraded(live_sessions);
    }

    if state.is_degraded().await {
        HealthResponse::degraded(live_sessions)
    } else {
        HealthResponse::ok(live_sessions)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig, dao::session_store::memory::MemorySessionStore,
        services::moderation::RustrictModerator, state::AppState,
    };

    #[tokio::test]
    async fn degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default(), Arc::new(RustrictModerator));
        assert!(!health_status(&state).await.is_ok());

        state
            .set_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        let report = health_status(&state).await;
        assert!(report.is_ok());
        assert_eq!(report.live_sessions, 0);
    }
}
