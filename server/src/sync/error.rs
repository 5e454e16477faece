//! Errors that abort a sync cycle.

/// Every variant is transient from the coordinator's point of view: the
/// cycle stops, no baseline is moved and the next cycle starts over.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("local store error: {0}")]
    Local(#[from] sqlx::Error),

    #[error("remote store error: {0}")]
    Remote(String),

    #[error("remote store returned {status}: {body}")]
    RemoteStatus { status: u16, body: String },

    #[error("remote store timed out")]
    Timeout,

    #[error("engine error: {0}")]
    Engine(#[from] fieldtrack_engine::Error),

    #[error("local data changed during the cycle")]
    ConcurrentChange,
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SyncError::Timeout
        } else {
            SyncError::Remote(e.to_string())
        }
    }
}
