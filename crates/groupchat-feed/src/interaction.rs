use groupchat_core::message::Message;

use crate::controller::{ConfirmedDelete, DeleteRequest, FeedController};
use crate::error::FeedError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Edit,
    Delete,
    Download,
}

impl MenuAction {
    pub fn label(&self) -> &'static str {
        match self {
            MenuAction::Edit => "Edit",
            MenuAction::Delete => "Delete",
            MenuAction::Download => "Download",
        }
    }
}

/// Actions the menu offers `user_id` for `message`. Empty means no menu.
pub fn menu_actions(message: &Message, user_id: &str) -> Vec<MenuAction> {
    let mut actions = Vec::new();
    if message.is_editable_by(user_id) {
        actions.push(MenuAction::Edit);
    }
    if message.is_deletable_by(user_id) {
        actions.push(MenuAction::Delete);
    }
    if message.is_downloadable() {
        actions.push(MenuAction::Download);
    }
    actions
}

/// What the user is doing with the feed's messages.
///
/// A single value for the whole feed, so at most one menu, edit or pending
/// delete exists at a time.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum Interaction {
    #[default]
    Viewing,
    MenuOpen {
        message_id: String,
    },
    Editing {
        message_id: String,
        draft: String,
    },
    ConfirmingDelete(DeleteRequest),
}

impl Interaction {
    pub fn is_viewing(&self) -> bool {
        matches!(self, Interaction::Viewing)
    }

    /// Id of the message whose menu is open.
    pub fn open_menu(&self) -> Option<&str> {
        match self {
            Interaction::MenuOpen { message_id } => Some(message_id.as_str()),
            _ => None,
        }
    }

    /// The message this interaction is about, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            Interaction::Viewing => None,
            Interaction::MenuOpen { message_id } | Interaction::Editing { message_id, .. } => {
                Some(message_id.as_str())
            }
            Interaction::ConfirmingDelete(request) => Some(request.message_id()),
        }
    }

    /// Open the menu for `message`, or close it if it is already open.
    /// Any other menu, edit or pending delete is abandoned.
    pub fn toggle_menu(&mut self, message: &Message, user_id: &str) {
        if self.open_menu() == Some(message.id.as_str()) {
            *self = Interaction::Viewing;
            return;
        }
        self.cancel();
        if !menu_actions(message, user_id).is_empty() {
            *self = Interaction::MenuOpen {
                message_id: message.id.clone(),
            };
        }
    }

    /// Close an open menu. Edits and pending deletes are left alone.
    pub fn dismiss_menu(&mut self) {
        if self.open_menu().is_some() {
            *self = Interaction::Viewing;
        }
    }

    /// Return to viewing, abandoning whatever was in progress.
    pub fn cancel(&mut self) {
        if let Interaction::ConfirmingDelete(request) = std::mem::take(self) {
            request.cancel();
        }
    }

    pub fn begin_edit(&mut self, message: &Message, user_id: &str) -> Result<(), FeedError> {
        if !message.is_editable_by(user_id) {
            return Err(FeedError::NotPermitted(
                "only the sender can edit a text message".into(),
            ));
        }
        self.cancel();
        *self = Interaction::Editing {
            message_id: message.id.clone(),
            draft: message.text.clone().unwrap_or_default(),
        };
        Ok(())
    }

    pub fn draft_mut(&mut self) -> Option<&mut String> {
        match self {
            Interaction::Editing { draft, .. } => Some(draft),
            _ => None,
        }
    }

    pub fn draft(&self) -> Option<&str> {
        match self {
            Interaction::Editing { draft, .. } => Some(draft.as_str()),
            _ => None,
        }
    }

    /// Leave editing, yielding `(message_id, draft)` to save.
    pub fn finish_edit(&mut self) -> Option<(String, String)> {
        match std::mem::take(self) {
            Interaction::Editing { message_id, draft } => Some((message_id, draft)),
            other => {
                *self = other;
                None
            }
        }
    }

    pub fn begin_delete(
        &mut self,
        feed: &FeedController,
        message: &Message,
        user_id: &str,
    ) -> Result<(), FeedError> {
        if !message.is_deletable_by(user_id) {
            return Err(FeedError::NotPermitted(
                "only the sender can delete a message".into(),
            ));
        }
        self.cancel();
        *self = Interaction::ConfirmingDelete(feed.request_delete(&message.id));
        Ok(())
    }

    pub fn pending_delete(&self) -> Option<&DeleteRequest> {
        match self {
            Interaction::ConfirmingDelete(request) => Some(request),
            _ => None,
        }
    }

    /// Confirm the pending delete and return to viewing.
    pub fn confirm_delete(&mut self) -> Option<ConfirmedDelete> {
        match std::mem::take(self) {
            Interaction::ConfirmingDelete(request) => Some(request.confirm()),
            other => {
                *self = other;
                None
            }
        }
    }

    /// Drop the interaction if its message left the feed.
    pub fn sync(&mut self, messages: &[Message]) {
        let gone = self
            .target()
            .is_some_and(|id| !messages.iter().any(|m| m.id == id));
        if gone {
            self.cancel();
        }
    }
}
