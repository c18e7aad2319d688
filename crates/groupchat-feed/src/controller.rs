use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use groupchat_core::attachment::OutgoingFile;
use groupchat_core::message::{Message, NewMessage};
use groupchat_service::MessageStore;
use tracing::{debug, info, warn};

use crate::error::FeedError;
use crate::files;

/// Client-side view of one group's messages.
///
/// The list is only ever replaced wholesale by a load; mutations go to the
/// store and are followed by a full reload instead of patching local state.
/// Loads and mutations may overlap freely; whichever list response lands
/// last is what the view shows.
pub struct FeedController {
    store: Arc<dyn MessageStore>,
    group_id: String,
    state: Mutex<FeedState>,
}

#[derive(Default)]
struct FeedState {
    messages: Vec<Message>,
    /// Bumped every time `messages` is replaced.
    version: u64,
    last_error: Option<String>,
    closed: bool,
}

/// A pending delete, handed out by [`FeedController::request_delete`].
///
/// Must be confirmed before the controller will dispatch it.
#[derive(Debug, PartialEq, Eq)]
pub struct DeleteRequest {
    group_id: String,
    message_id: String,
}

impl DeleteRequest {
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn confirm(self) -> ConfirmedDelete {
        ConfirmedDelete {
            group_id: self.group_id,
            message_id: self.message_id,
        }
    }

    pub fn cancel(self) {
        debug!(message_id = %self.message_id, "delete cancelled");
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ConfirmedDelete {
    group_id: String,
    message_id: String,
}

impl ConfirmedDelete {
    pub fn message_id(&self) -> &str {
        &self.message_id
    }
}

impl FeedController {
    pub fn new(store: Arc<dyn MessageStore>, group_id: impl Into<String>) -> Self {
        Self {
            store,
            group_id: group_id.into(),
            state: Mutex::new(FeedState::default()),
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current list, in store order.
    pub fn snapshot(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    pub fn version(&self) -> u64 {
        self.lock().version
    }

    pub fn find(&self, message_id: &str) -> Option<Message> {
        self.lock()
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
    }

    /// Reason the most recent load failed, cleared by the next good load.
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Stop applying load results. Responses still in flight are dropped.
    pub fn close(&self) {
        self.lock().closed = true;
        debug!(group_id = %self.group_id, "feed closed");
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Fetch the full list and replace the view with it.
    ///
    /// A failed fetch empties the view and still reports the error.
    pub async fn load_messages(&self) -> Result<(), FeedError> {
        let result = self.store.list_messages(&self.group_id).await;

        let mut state = self.lock();
        if state.closed {
            debug!(group_id = %self.group_id, "discarding load for closed feed");
            return Ok(());
        }
        state.version += 1;
        match result {
            Ok(messages) => {
                debug!(group_id = %self.group_id, count = messages.len(), "messages loaded");
                state.messages = messages;
                state.last_error = None;
                Ok(())
            }
            Err(e) => {
                warn!(group_id = %self.group_id, "load failed: {e}");
                state.messages.clear();
                state.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Post a new message. At least one of `text` (after trimming) or `file`
    /// must be non-empty.
    pub async fn send_message(
        &self,
        text: Option<&str>,
        file: Option<OutgoingFile>,
    ) -> Result<(), FeedError> {
        let text = text.map(str::trim).filter(|t| !t.is_empty());
        let file = file.filter(|f| !f.is_empty());
        if text.is_none() && file.is_none() {
            return Err(FeedError::EmptyMessage);
        }

        let input = NewMessage {
            text: text.map(String::from),
            file,
        };
        self.store.create_message(&self.group_id, &input).await?;
        info!(
            group_id = %self.group_id,
            attachment = input.file.is_some(),
            "message sent"
        );
        self.reload_after_write().await;
        Ok(())
    }

    /// Replace the text of `message_id`. Whether the actor may edit it is
    /// checked by the caller.
    pub async fn edit_message(&self, message_id: &str, text: &str) -> Result<(), FeedError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(FeedError::EmptyEdit);
        }
        self.store
            .update_message(&self.group_id, message_id, text)
            .await?;
        info!(group_id = %self.group_id, message_id, "message edited");
        self.reload_after_write().await;
        Ok(())
    }

    /// First half of a delete; see [`DeleteRequest::confirm`].
    pub fn request_delete(&self, message_id: &str) -> DeleteRequest {
        DeleteRequest {
            group_id: self.group_id.clone(),
            message_id: message_id.to_string(),
        }
    }

    pub async fn delete_message(&self, confirmed: ConfirmedDelete) -> Result<(), FeedError> {
        if confirmed.group_id != self.group_id {
            return Err(FeedError::NotPermitted(format!(
                "delete was confirmed for group {}",
                confirmed.group_id
            )));
        }
        self.store
            .delete_message(&self.group_id, &confirmed.message_id)
            .await?;
        info!(group_id = %self.group_id, message_id = %confirmed.message_id, "message deleted");
        self.reload_after_write().await;
        Ok(())
    }

    /// Save the attachment of `message` into `dir`. Returns the written path.
    /// The feed itself is not touched.
    pub async fn download_attachment(
        &self,
        message: &Message,
        dir: &Path,
    ) -> Result<PathBuf, FeedError> {
        let attachment = message
            .attachment
            .as_ref()
            .filter(|_| message.is_downloadable())
            .ok_or(FeedError::NoAttachment)?;
        let url = attachment.url.as_deref().ok_or(FeedError::NoAttachment)?;

        let blob = self.store.fetch_attachment(url).await?;
        let path = files::save_attachment(dir, &attachment.file_name, &blob.data).await?;
        info!(message_id = %message.id, path = %path.display(), "attachment saved");
        Ok(path)
    }

    async fn reload_after_write(&self) {
        // The write already succeeded; a failed reload is left to the next poll.
        if let Err(e) = self.load_messages().await {
            warn!(group_id = %self.group_id, "reload after write failed: {e}");
        }
    }
}
