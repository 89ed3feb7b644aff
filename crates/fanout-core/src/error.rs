use fanout_model::IdError;
use thiserror::Error;

/// Misuse of the coordinator API, reported before any item runs.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("invalid item identifier {id:?}: {source}")]
    InvalidIdentifier {
        id: String,
        #[source]
        source: IdError,
    },
    #[error("duplicate item identifier: {0}")]
    DuplicateId(String),
    #[error("credential pool is empty")]
    EmptyPool,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PoolError {
    #[error("duplicate credential key at position {0}")]
    DuplicateKey(usize),
    #[error("empty credential key at position {0}")]
    EmptyKey(usize),
}
