/// Entities persisted per session and the change records applied to them.
pub mod models;
/// Persistence seam for live sessions.
pub mod session_store;
/// Storage error types shared by every backend.
pub mod storage;
