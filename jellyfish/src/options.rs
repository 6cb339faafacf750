/// Options when creating a [`crate::JellyfishMerkleTree`].
#[derive(Debug, Clone)]
pub struct Options {
    /// Enable or disable metrics collection.
    pub(crate) metrics: bool,
    /// Whether commit batches ask the store to sync to durable storage.
    pub(crate) sync_commits: bool,
    /// Whether proofs resolve the lone sibling of each traversed branch.
    pub(crate) proof_neighbors: bool,
}

impl Options {
    /// Create a new `Options` instance with the default values.
    pub fn new() -> Self {
        Self {
            metrics: false,
            sync_commits: true,
            proof_neighbors: true,
        }
    }

    /// Set metrics collection on or off.
    ///
    /// Default: off.
    pub fn metrics(&mut self, metrics: bool) {
        self.metrics = metrics;
    }

    /// Set whether each commit batch is synced before `commit` returns.
    ///
    /// Passed through to the store in [`crate::store::CommitConfig`]. Default: on.
    pub fn sync_commits(&mut self, sync_commits: bool) {
        self.sync_commits = sync_commits;
    }

    /// Set whether proof generation looks up the lone sibling of every branch on the path.
    ///
    /// This costs one extra store read per branch with exactly one sibling. Default: on.
    pub fn proof_neighbors(&mut self, proof_neighbors: bool) {
        self.proof_neighbors = proof_neighbors;
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}
