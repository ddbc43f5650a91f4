use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope stored in every collection: the row key, the owning session and the entity itself.
///
/// Keeping `session_id` at the top level lets subscribers and indexes filter rows per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRecord<T> {
    #[serde(rename = "_id")]
    pub key: String,
    pub session_id: String,
    pub body: T,
}

impl<T> MongoRecord<T> {
    pub fn new(session_id: Uuid, key: String, body: T) -> Self {
        Self {
            key,
            session_id: session_id.to_string(),
            body,
        }
    }
}
