use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use groupchat_core::group::Group;
use groupchat_core::message::{Message, MessageKind, NewMessage};
use groupchat_core::role::Role;
use groupchat_core::session::{SessionHandle, SessionUser};
use groupchat_core::Attachment;

use crate::{AttachmentBytes, GroupDirectory, MessageStore, ServiceError};

/// In-process message store for tests.
///
/// Mirrors the backend's rules: the sender comes from the session, only the
/// sender may edit or delete, and blank edits are rejected. Every trait call
/// is counted so tests can assert that validation failures never reach the
/// store.
pub struct MemoryService {
    session: SessionHandle,
    state: Mutex<MemoryState>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

#[derive(Default)]
struct MemoryState {
    messages: HashMap<String, Vec<Message>>,
    groups: Vec<Group>,
    files: HashMap<String, AttachmentBytes>,
}

impl MemoryService {
    pub fn new(session: SessionHandle) -> Self {
        Self {
            session,
            state: Mutex::new(MemoryState::default()),
            offline: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_group(self, group: Group) -> Self {
        self.add_group(group);
        self
    }

    pub fn add_group(&self, group: Group) {
        self.lock().groups.push(group);
    }

    /// Simulate the network going away: every call fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of trait calls that reached the store.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Current contents of a group, bypassing the trait (not counted).
    pub fn messages(&self, group_id: &str) -> Vec<Message> {
        self.lock().messages.get(group_id).cloned().unwrap_or_default()
    }

    /// Write a text message as `sender_id`, as another client would.
    pub fn insert_text(&self, group_id: &str, sender_id: &str, text: &str) -> Message {
        let message = Message {
            id: new_id(),
            group_id: group_id.to_string(),
            sender_id: sender_id.to_string(),
            sender_email: Some(format!("{sender_id}@uni.test")),
            sender_role: None,
            text: Some(text.to_string()),
            attachment: None,
            kind: MessageKind::Text,
            created_at: Some(Utc::now()),
            edited: false,
            edited_at: None,
        };
        self.insert(message.clone());
        message
    }

    /// Insert an arbitrary message, as-is.
    pub fn insert(&self, message: Message) {
        self.lock()
            .messages
            .entry(message.group_id.clone())
            .or_default()
            .push(message);
    }

    /// Remove a message without going through the trait.
    pub fn remove(&self, group_id: &str, message_id: &str) {
        if let Some(list) = self.lock().messages.get_mut(group_id) {
            list.retain(|m| m.id != message_id);
        }
    }

    pub fn put_file(&self, url: &str, data: Bytes, content_type: Option<&str>) {
        self.lock().files.insert(
            url.to_string(),
            AttachmentBytes {
                data,
                content_type: content_type.map(String::from),
            },
        );
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_call(&self) -> Result<SessionUser, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(ServiceError::Transport("store unreachable".into()));
        }
        Ok(self.session.user()?)
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn find_mut<'a>(
    state: &'a mut MemoryState,
    group_id: &str,
    message_id: &str,
) -> Result<&'a mut Message, ServiceError> {
    state
        .messages
        .get_mut(group_id)
        .and_then(|list| list.iter_mut().find(|m| m.id == message_id))
        .ok_or_else(|| ServiceError::NotFound(format!("message {message_id}")))
}

#[async_trait]
impl MessageStore for MemoryService {
    async fn list_messages(&self, group_id: &str) -> Result<Vec<Message>, ServiceError> {
        self.begin_call()?;
        Ok(self.messages(group_id))
    }

    async fn create_message(&self, group_id: &str, input: &NewMessage) -> Result<(), ServiceError> {
        let user = self.begin_call()?;
        if input.is_empty() {
            return Err(ServiceError::InvalidInput("empty message".into()));
        }

        let id = new_id();
        let mut state = self.lock();
        let attachment = input.file.as_ref().map(|file| {
            let url = format!("memory://{group_id}/{id}/{}", file.file_name);
            state.files.insert(
                url.clone(),
                AttachmentBytes {
                    data: file.data.clone(),
                    content_type: Some(file.mime_type.clone()),
                },
            );
            Attachment {
                file_name: file.file_name.clone(),
                mime_type: Some(file.mime_type.clone()),
                url: Some(url),
                path: Some(format!("chat-files/{group_id}/{id}_{}", file.file_name)),
                size_bytes: Some(file.data.len() as u64),
                upload_error: None,
            }
        });
        let kind = if attachment.is_some() {
            MessageKind::Document
        } else {
            MessageKind::Text
        };

        let message = Message {
            id,
            group_id: group_id.to_string(),
            sender_id: user.uid.clone(),
            sender_email: Some(user.email.clone()),
            sender_role: Some(user.role),
            text: input.text.clone().filter(|t| !t.trim().is_empty()),
            attachment,
            kind,
            created_at: Some(Utc::now()),
            edited: false,
            edited_at: None,
        };
        state
            .messages
            .entry(group_id.to_string())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn update_message(
        &self,
        group_id: &str,
        message_id: &str,
        text: &str,
    ) -> Result<(), ServiceError> {
        let user = self.begin_call()?;
        if text.trim().is_empty() {
            return Err(ServiceError::InvalidInput("empty message".into()));
        }
        let mut state = self.lock();
        let message = find_mut(&mut state, group_id, message_id)?;
        if message.sender_id != user.uid {
            return Err(ServiceError::Unauthorized("not the sender".into()));
        }
        message.text = Some(text.to_string());
        message.edited = true;
        message.edited_at = Some(Utc::now());
        Ok(())
    }

    async fn delete_message(&self, group_id: &str, message_id: &str) -> Result<(), ServiceError> {
        let user = self.begin_call()?;
        let mut state = self.lock();
        let message = find_mut(&mut state, group_id, message_id)?;
        if message.sender_id != user.uid {
            return Err(ServiceError::Unauthorized("not the sender".into()));
        }
        let url = message.attachment.as_ref().and_then(|a| a.url.clone());
        if let Some(list) = state.messages.get_mut(group_id) {
            list.retain(|m| m.id != message_id);
        }
        if let Some(url) = url {
            state.files.remove(&url);
        }
        Ok(())
    }

    async fn fetch_attachment(&self, url: &str) -> Result<AttachmentBytes, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(ServiceError::Transport("store unreachable".into()));
        }
        self.lock()
            .files
            .get(url)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(url.to_string()))
    }
}

#[async_trait]
impl GroupDirectory for MemoryService {
    async fn my_groups(&self, user: &SessionUser) -> Result<Vec<Group>, ServiceError> {
        self.begin_call()?;
        let state = self.lock();
        let groups = match user.role {
            Role::Student => state
                .groups
                .iter()
                .filter(|g| g.student_ids.iter().any(|s| *s == user.uid))
                .take(1)
                .cloned()
                .collect(),
            Role::Professor => state
                .groups
                .iter()
                .filter(|g| g.prof_id.as_deref() == Some(user.uid.as_str()))
                .cloned()
                .collect(),
            Role::Admin => state.groups.clone(),
        };
        Ok(groups)
    }
}
