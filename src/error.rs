use thiserror::Error;

/// Every failure in this crate reflects a broken data invariant or a modeling
/// bug upstream, never a transient condition, so there is no retry or recovery
/// path anywhere: errors propagate straight out of the operation that detected
/// them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Partition descriptor is inconsistent with the graph: {0}")]
    InvalidPartition(String),

    #[error("Cycle detected in computation graph: {0}")]
    CycleDetected(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Graph inconsistency: {0}")]
    Inconsistency(String),
}

pub type Result<T> = std::result::Result<T, Error>;
