use jellyfish_core::{proof::ProofError, NodeKey, Version};

/// Errors surfaced by the tree.
///
/// Store failures are carried unchanged in [`Error::Storage`]. Every other variant except
/// [`Error::InvalidArgument`] and [`Error::NonMonotonicVersion`] signals a bug in the tree or a
/// corrupted store; the operation that raised it must be abandoned as a whole.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("version {requested} does not follow the latest committed version {latest}")]
    NonMonotonicVersion { latest: Version, requested: Version },
    #[error("node {0} written twice in one transaction")]
    DuplicateNode(NodeKey),
    #[error("node {0} marked stale twice")]
    StaleTwice(NodeKey),
    #[error("traversal went deeper than the key length")]
    DepthExceeded,
    #[error("corrupted tree: {0}")]
    Corrupted(String),
    #[error(transparent)]
    Proof(#[from] ProofError),
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
