use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    ClientSession, Database, IndexModel,
    bson::{Document, doc},
    error::Error as MongoError,
    options::IndexOptions,
};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::MongoRecord,
};
use crate::dao::{
    models::{
        AnswerEntity, BannedTeamEntity, Collection, SessionEntity, SessionRecord, StoredChange,
        TeamEntity, TeamMemberEntity, VoteEntity,
    },
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};

const CHILD_COLLECTIONS: [Collection; 5] = [
    Collection::Teams,
    Collection::TeamMembers,
    Collection::BannedTeams,
    Collection::Answers,
    Collection::Votes,
];

fn transaction_error(
    session_id: Uuid,
    stage: &'static str,
) -> impl FnOnce(MongoError) -> MongoDaoError {
    move |source| MongoDaoError::Transaction {
        session_id,
        stage,
        source,
    }
}

/// Session store writing each entity kind to its own MongoDB collection.
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    database: RwLock<Database>,
    config: MongoConfig,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.database.read().await.clone();

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (_client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        *self.database.write().await = database;
        Ok(())
    }
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (_client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let store = Self {
            inner: Arc::new(MongoInner {
                database: RwLock::new(database),
                config,
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn database(&self) -> Database {
        self.inner.database.read().await.clone()
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let sessions = database.collection::<Document>(Collection::Sessions.as_str());
        let code_index = IndexModel::builder()
            .keys(doc! {"body.code": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("session_code_idx".to_owned()))
                    .build(),
            )
            .build();
        sessions
            .create_index(code_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: Collection::Sessions.as_str(),
                index: "body.code",
                source,
            })?;

        for collection in CHILD_COLLECTIONS {
            let index = IndexModel::builder()
                .keys(doc! {"session_id": 1})
                .options(
                    IndexOptions::builder()
                        .name(Some(format!("{}_session_idx", collection.as_str())))
                        .build(),
                )
                .build();
            database
                .collection::<Document>(collection.as_str())
                .create_index(index)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection: collection.as_str(),
                    index: "session_id",
                    source,
                })?;
        }

        Ok(())
    }

    async fn upsert<T>(
        database: &Database,
        txn: &mut ClientSession,
        session_id: Uuid,
        collection: Collection,
        key: String,
        body: T,
    ) -> MongoResult<()>
    where
        T: Serialize + Send + Sync,
    {
        let target = database.collection::<MongoRecord<T>>(collection.as_str());
        let record = MongoRecord::new(session_id, key.clone(), body);

        target
            .replace_one(doc! { "_id": key.as_str() }, &record)
            .upsert(true)
            .session(&mut *txn)
            .await
            .map_err(|source| MongoDaoError::Write {
                session_id,
                collection: collection.as_str(),
                key,
                source,
            })?;
        Ok(())
    }

    async fn delete(
        database: &Database,
        txn: &mut ClientSession,
        session_id: Uuid,
        collection: Collection,
        key: String,
    ) -> MongoResult<()> {
        let target = database.collection::<Document>(collection.as_str());

        target
            .delete_one(doc! { "_id": key.as_str() })
            .session(&mut *txn)
            .await
            .map_err(|source| MongoDaoError::Write {
                session_id,
                collection: collection.as_str(),
                key,
                source,
            })?;
        Ok(())
    }

    async fn apply(
        database: &Database,
        txn: &mut ClientSession,
        session_id: Uuid,
        changes: Vec<StoredChange>,
    ) -> MongoResult<()> {
        for change in changes {
            let collection = change.collection();
            let key = change.key();
            match change {
                StoredChange::Session(row) => {
                    Self::upsert(database, txn, session_id, collection, key, row).await?
                }
                StoredChange::Team(row) => {
                    Self::upsert(database, txn, session_id, collection, key, row).await?
                }
                StoredChange::Member(row) => {
                    Self::upsert(database, txn, session_id, collection, key, row).await?
                }
                StoredChange::Ban(row) => {
                    Self::upsert(database, txn, session_id, collection, key, row).await?
                }
                StoredChange::Answer(row) => {
                    Self::upsert(database, txn, session_id, collection, key, row).await?
                }
                StoredChange::Vote(row) => {
                    Self::upsert(database, txn, session_id, collection, key, row).await?
                }
                StoredChange::TeamDeleted { .. }
                | StoredChange::MemberDeleted { .. }
                | StoredChange::BanDeleted { .. } => {
                    Self::delete(database, txn, session_id, collection, key).await?
                }
            }
        }
        Ok(())
    }

    /// Applies the batch in order inside one transaction; a failed write leaves no row behind.
    ///
    /// Transactions need MongoDB running as a replica set.
    async fn commit(&self, session_id: Uuid, changes: Vec<StoredChange>) -> MongoResult<()> {
        let count = changes.len();
        let database = self.database().await;

        let mut txn = database
            .client()
            .start_session()
            .await
            .map_err(transaction_error(session_id, "start session"))?;
        txn.start_transaction()
            .await
            .map_err(transaction_error(session_id, "start transaction"))?;

        if let Err(err) = Self::apply(&database, &mut txn, session_id, changes).await {
            if let Err(abort) = txn.abort_transaction().await {
                warn!(%session_id, error = %abort, "failed to abort MongoDB transaction");
            }
            return Err(err);
        }

        txn.commit_transaction()
            .await
            .map_err(transaction_error(session_id, "commit transaction"))?;
        debug!(%session_id, count, "committed session changes to MongoDB");
        Ok(())
    }

    async fn rows<T>(&self, session_id: Uuid, collection: Collection) -> MongoResult<Vec<T>>
    where
        T: DeserializeOwned + Send + Sync + Unpin,
    {
        let source = self
            .database()
            .await
            .collection::<MongoRecord<T>>(collection.as_str());
        let read_error = |source| MongoDaoError::Read {
            session_id,
            collection: collection.as_str(),
            source,
        };

        let records: Vec<MongoRecord<T>> = source
            .find(doc! { "session_id": session_id.to_string() })
            .await
            .map_err(read_error)?
            .try_collect()
            .await
            .map_err(read_error)?;

        Ok(records.into_iter().map(|record| record.body).collect())
    }

    async fn load_session(&self, id: Uuid) -> MongoResult<Option<SessionRecord>> {
        let sessions = self
            .database()
            .await
            .collection::<MongoRecord<SessionEntity>>(Collection::Sessions.as_str());

        let Some(session) = sessions
            .find_one(doc! { "_id": id.to_string() })
            .await
            .map_err(|source| MongoDaoError::Read {
                session_id: id,
                collection: Collection::Sessions.as_str(),
                source,
            })?
        else {
            return Ok(None);
        };

        Ok(Some(SessionRecord {
            session: Some(session.body),
            teams: self.rows::<TeamEntity>(id, Collection::Teams).await?,
            members: self
                .rows::<TeamMemberEntity>(id, Collection::TeamMembers)
                .await?,
            bans: self
                .rows::<BannedTeamEntity>(id, Collection::BannedTeams)
                .await?,
            answers: self.rows::<AnswerEntity>(id, Collection::Answers).await?,
            votes: self.rows::<VoteEntity>(id, Collection::Votes).await?,
        }))
    }

    async fn find_session_by_code(&self, code: String) -> StorageResult<Option<Uuid>> {
        let sessions = self
            .database()
            .await
            .collection::<MongoRecord<SessionEntity>>(Collection::Sessions.as_str());

        let found = sessions
            .find_one(doc! { "body.code": code.to_ascii_uppercase() })
            .await
            .map_err(|source| MongoDaoError::FindByCode {
                code: code.clone(),
                source,
            })?;

        found
            .map(|record| {
                Uuid::parse_str(&record.key).map_err(|err| StorageError::Corrupted {
                    collection: Collection::Sessions.as_str(),
                    message: err.to_string(),
                })
            })
            .transpose()
    }
}

impl SessionStore for MongoSessionStore {
    fn commit(
        &self,
        session_id: Uuid,
        changes: Vec<StoredChange>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.commit(session_id, changes).await.map_err(Into::into) })
    }

    fn load_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionRecord>>> {
        let store = self.clone();
        Box::pin(async move { store.load_session(id).await.map_err(Into::into) })
    }

    fn find_session_by_code(&self, code: String) -> BoxFuture<'static, StorageResult<Option<Uuid>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session_by_code(code).await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
