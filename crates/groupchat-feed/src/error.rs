use groupchat_service::ServiceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("edited message cannot be empty")]
    EmptyEdit,

    #[error("not permitted: {0}")]
    NotPermitted(String),

    #[error("no attachment available for this message")]
    NoAttachment,

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("file error: {0}")]
    Io(#[from] std::io::Error),
}

impl FeedError {
    /// Rejected locally, before anything was sent.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FeedError::EmptyMessage | FeedError::EmptyEdit | FeedError::NotPermitted(_)
        )
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FeedError::Service(e) if e.is_unauthorized())
    }
}
