use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use groupchat_core::message::{Message, NewMessage};
use groupchat_core::role::Role;
use groupchat_core::session::{Session, SessionHandle, SessionUser};
use groupchat_feed::FeedController;
use groupchat_service::{AttachmentBytes, MemoryService, MessageStore, ServiceError};

pub const GROUP: &str = "g1";
pub const ME: &str = "me";

pub struct Fixture {
    pub session: SessionHandle,
    pub store: Arc<MemoryService>,
    pub feed: Arc<FeedController>,
}

pub fn me() -> SessionUser {
    SessionUser {
        uid: ME.into(),
        email: "me@uni.test".into(),
        display_name: None,
        role: Role::Student,
        group_id: Some(GROUP.into()),
    }
}

/// A feed on `GROUP`, signed in as `ME`, over an empty in-memory store.
pub fn fixture() -> Fixture {
    let session = SessionHandle::signed_in(Session::new(me(), "token"));
    let store = Arc::new(MemoryService::new(session.clone()));
    let feed = Arc::new(FeedController::new(store.clone(), GROUP));
    Fixture {
        session,
        store,
        feed,
    }
}

pub fn texts(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .map(|m| m.text.clone().unwrap_or_default())
        .collect()
}

/// Delays list responses, to hold a load in flight.
pub struct SlowStore {
    pub inner: Arc<MemoryService>,
    pub delay: Duration,
}

#[async_trait]
impl MessageStore for SlowStore {
    async fn list_messages(&self, group_id: &str) -> Result<Vec<Message>, ServiceError> {
        tokio::time::sleep(self.delay).await;
        self.inner.list_messages(group_id).await
    }

    async fn create_message(&self, group_id: &str, input: &NewMessage) -> Result<(), ServiceError> {
        self.inner.create_message(group_id, input).await
    }

    async fn update_message(
        &self,
        group_id: &str,
        message_id: &str,
        text: &str,
    ) -> Result<(), ServiceError> {
        self.inner.update_message(group_id, message_id, text).await
    }

    async fn delete_message(&self, group_id: &str, message_id: &str) -> Result<(), ServiceError> {
        self.inner.delete_message(group_id, message_id).await
    }

    async fn fetch_attachment(&self, url: &str) -> Result<AttachmentBytes, ServiceError> {
        self.inner.fetch_attachment(url).await
    }
}
