/// Vote tallies and round winners.
pub mod aggregation;
/// OpenAPI documentation generation.
pub mod documentation;
/// Deadline sweeper advancing timed-out phases.
pub mod expiry_supervisor;
/// Health check service.
pub mod health_service;
/// Team membership: joins, captaincy, leaving, kicks and bans.
pub mod membership_service;
/// Fail-open answer moderation.
pub mod moderation;
/// Splitting teams into answer groups.
pub mod partitioner;
/// Answer and vote submission.
pub mod play_service;
/// Points and leaderboard.
pub mod scoring;
/// Session lifecycle and read models.
pub mod session_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events subscription service.
pub mod sse_service;
/// Session store connection and health supervision.
pub mod storage_supervisor;
