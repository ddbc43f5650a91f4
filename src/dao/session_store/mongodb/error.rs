use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to write `{key}` to `{collection}` for session `{session_id}`")]
    Write {
        session_id: Uuid,
        collection: &'static str,
        key: String,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB transaction failed to {stage} for session `{session_id}`")]
    Transaction {
        session_id: Uuid,
        stage: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to read `{collection}` for session `{session_id}`")]
    Read {
        session_id: Uuid,
        collection: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to look up session by code `{code}`")]
    FindByCode {
        code: String,
        #[source]
        source: MongoError,
    },
}
