use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
    /// Round the payload belongs to, for answer and vote rows.
    pub round: Option<u32>,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
            round: None,
        })
    }

    /// Tag the event with the round it belongs to.
    pub fn in_round(mut self, round: Option<u32>) -> Self {
        self.round = round;
        self
    }

    /// Whether a subscriber filtering on `round` should receive this event.
    pub fn visible_in(&self, round: Option<u32>) -> bool {
        match (round, self.round) {
            (Some(wanted), Some(actual)) => wanted == actual,
            _ => true,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    pub session_id: Uuid,
    /// Round filter applied to this stream, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Payload of `<collection>.deleted` events.
pub struct DeletedEvent {
    pub id: String,
}
