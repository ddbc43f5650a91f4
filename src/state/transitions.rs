use std::sync::Arc;

use crate::{
    error::ServiceError,
    services::sse_events::broadcast_changes,
    state::{ChangeSet, LiveSession, SessionHandle, SharedState},
};

/// Run a mutation under the session gate, then broadcast every committed row change.
pub async fn commit_with_broadcast<T, F>(
    state: &SharedState,
    handle: &Arc<SessionHandle>,
    work: F,
) -> Result<T, ServiceError>
where
    F: FnOnce(&mut LiveSession, &mut ChangeSet) -> Result<T, ServiceError>,
{
    let store = state.require_store().await?;
    let ((value, phase), changes) = handle
        .mutate(&store, |live, changes| {
            let value = work(live, changes)?;
            Ok((value, live.session.status))
        })
        .await?;
    broadcast_changes(handle.hub(), &changes, phase);
    Ok(value)
}
