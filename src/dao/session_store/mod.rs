/// In-process store used when no database is configured and in tests.
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{SessionRecord, StoredChange};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the persistence layer for live sessions.
///
/// Every session mutation is handed over as one ordered batch of row changes.
pub trait SessionStore: Send + Sync {
    fn commit(
        &self,
        session_id: Uuid,
        changes: Vec<StoredChange>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn load_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionRecord>>>;
    fn find_session_by_code(&self, code: String) -> BoxFuture<'static, StorageResult<Option<Uuid>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
