use thiserror::Error;

/// Errors raised while constructing a map or a scheduler.
///
/// Map operations themselves are total: every argument a caller can express
/// is valid, and scheduler-internal races are absorbed rather than surfaced.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("eviction interval must be greater than zero")]
    ZeroInterval,
    #[error("scheduler thread pool must have at least one thread")]
    ZeroThreads,
    #[error("failed to spawn eviction worker thread")]
    WorkerSpawn(#[from] std::io::Error),
}
