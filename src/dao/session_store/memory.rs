use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{SessionRecord, StoredChange},
    session_store::SessionStore,
    storage::StorageResult,
};

/// Keeps every session record in a concurrent map.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    records: Arc<DashMap<Uuid, SessionRecord>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn commit(
        &self,
        session_id: Uuid,
        changes: Vec<StoredChange>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let records = self.records.clone();
        Box::pin(async move {
            // The entry guard holds the shard lock, so a batch lands as one unit.
            records.entry(session_id).or_default().apply(&changes);
            Ok(())
        })
    }

    fn load_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionRecord>>> {
        let records = self.records.clone();
        Box::pin(async move {
            Ok(records
                .get(&id)
                .filter(|record| record.session.is_some())
                .map(|record| record.clone()))
        })
    }

    fn find_session_by_code(&self, code: String) -> BoxFuture<'static, StorageResult<Option<Uuid>>> {
        let records = self.records.clone();
        Box::pin(async move {
            Ok(records.iter().find_map(|entry| {
                entry
                    .session
                    .as_ref()
                    .filter(|session| session.code.eq_ignore_ascii_case(&code))
                    .map(|session| session.id)
            }))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
