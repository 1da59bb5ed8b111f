use crate::staging::StagingStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Staging area holding converted files awaiting download or promotion.
    pub staging: Arc<StagingStore>,
}

impl JobContext {
    pub fn new(cancellation_token: CancellationToken, staging: Arc<StagingStore>) -> Self {
        Self {
            cancellation_token,
            staging,
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
