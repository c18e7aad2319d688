use async_trait::async_trait;
use bytes::Bytes;
use groupchat_core::group::Group;
use groupchat_core::message::{Message, NewMessage};
use groupchat_core::session::SessionUser;
use groupchat_core::ChatError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ServiceError::Unauthorized(_))
    }
}

impl From<ChatError> for ServiceError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::NotFound(msg) => ServiceError::NotFound(msg),
            ChatError::InvalidInput(msg) => ServiceError::InvalidInput(msg),
            ChatError::Unauthorized(msg) => ServiceError::Unauthorized(msg),
        }
    }
}

/// Raw attachment content fetched from its storage URL.
#[derive(Debug, Clone)]
pub struct AttachmentBytes {
    pub data: Bytes,
    pub content_type: Option<String>,
}

/// Per-group chat message operations.
///
/// The feed controller programs against this trait.
/// `HttpService` talks to the REST backend.
/// `MemoryService` keeps everything in process (tests).
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Full message list for a group, in store order.
    async fn list_messages(&self, group_id: &str) -> Result<Vec<Message>, ServiceError>;

    /// The store assigns the id, sender and timestamp.
    async fn create_message(&self, group_id: &str, input: &NewMessage) -> Result<(), ServiceError>;

    async fn update_message(
        &self,
        group_id: &str,
        message_id: &str,
        text: &str,
    ) -> Result<(), ServiceError>;

    async fn delete_message(&self, group_id: &str, message_id: &str) -> Result<(), ServiceError>;

    async fn fetch_attachment(&self, url: &str) -> Result<AttachmentBytes, ServiceError>;
}

/// Groups visible to the signed-in user.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    async fn my_groups(&self, user: &SessionUser) -> Result<Vec<Group>, ServiceError>;
}
