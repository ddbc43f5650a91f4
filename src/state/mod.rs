pub mod session;
mod sse;
pub mod state_machine;
pub mod transitions;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};
use tracing::info;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::session_store::SessionStore,
    error::ServiceError,
    services::moderation::Moderator,
};

pub use self::session::{ChangeSet, LiveSession, SessionHandle};
pub use self::sse::SseHub;

pub type SharedState = Arc<AppState>;

/// Central application state: the store slot, the live session registry and shared collaborators.
pub struct AppState {
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    sessions: DashMap<Uuid, Arc<SessionHandle>>,
    codes: DashMap<String, Uuid>,
    config: AppConfig,
    moderator: Arc<dyn Moderator>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, moderator: Arc<dyn Moderator>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            session_store: RwLock::new(None),
            sessions: DashMap::new(),
            codes: DashMap::new(),
            config,
            moderator,
            degraded: degraded_tx,
        })
    }

    /// Obtain a handle to the current session store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.session_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current session store, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        self.session_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a session store and leave degraded mode.
    pub async fn set_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let flagged = *self.degraded.borrow();
        flagged || self.session_store.read().await.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Moderation collaborator used for answers.
    pub fn moderator(&self) -> Arc<dyn Moderator> {
        self.moderator.clone()
    }

    /// Handles of every session currently held in memory.
    pub fn live_sessions(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of sessions currently held in memory.
    pub fn live_session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Whether a join code is already taken by a session held in memory.
    pub fn code_in_use(&self, code: &str) -> bool {
        self.codes.contains_key(&code.to_ascii_uppercase())
    }

    /// Track a session in memory, returning the handle that won if another caller raced us.
    pub fn register(&self, live: LiveSession) -> Arc<SessionHandle> {
        let id = live.session.id;
        let code = live.session.code.to_ascii_uppercase();
        let handle = self
            .sessions
            .entry(id)
            .or_insert_with(|| Arc::new(SessionHandle::new(live)))
            .clone();
        self.codes.insert(code, id);
        handle
    }

    /// Drop a session from memory; persisted rows are untouched.
    pub async fn evict(&self, id: Uuid) {
        if let Some((_, handle)) = self.sessions.remove(&id) {
            let code = handle.read(|live| live.session.code.clone()).await;
            self.codes.remove_if(&code, |_, owner| *owner == id);
            info!(session_id = %id, "evicted session from memory");
        }
    }

    /// Look a session up by id, hydrating it from the store when it is not in memory.
    pub async fn session(&self, id: Uuid) -> Result<Arc<SessionHandle>, ServiceError> {
        if let Some(handle) = self.sessions.get(&id) {
            return Ok(handle.clone());
        }

        let store = self.require_store().await?;
        let record = store
            .load_session(id)
            .await?
            .and_then(LiveSession::from_record)
            .ok_or_else(|| ServiceError::SessionNotFound(id.to_string()))?;
        info!(session_id = %id, "hydrated session from storage");
        Ok(self.register(record))
    }

    /// Look a session up by its join code, case-insensitively.
    pub async fn session_by_code(&self, code: &str) -> Result<Arc<SessionHandle>, ServiceError> {
        let code = code.trim().to_ascii_uppercase();
        let known = self.codes.get(&code).map(|entry| *entry.value());
        let id = match known {
            Some(id) => id,
            None => {
                let store = self.require_store().await?;
                store
                    .find_session_by_code(code.clone())
                    .await?
                    .ok_or_else(|| ServiceError::SessionNotFound(code.clone()))?
            }
        };
        self.session(id).await
    }
}
