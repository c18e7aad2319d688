use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attachment::{Attachment, OutgoingFile};
use crate::role::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Document,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Document => "document",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "text" => Some(MessageKind::Text),
            "document" => Some(MessageKind::Document),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat message as served by the message store.
///
/// Decoding is lenient: a message missing both text and attachment still
/// decodes, and [`Message::is_well_formed`] reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawMessage", into = "RawMessage")]
pub struct Message {
    pub id: String,
    pub group_id: String,
    pub sender_id: String,
    pub sender_email: Option<String>,
    pub sender_role: Option<Role>,
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
    pub kind: MessageKind,
    pub created_at: Option<DateTime<Utc>>,
    pub edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_from(&self, user_id: &str) -> bool {
        !user_id.is_empty() && self.sender_id == user_id
    }

    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    pub fn is_well_formed(&self) -> bool {
        self.has_text() || self.attachment.is_some()
    }

    /// Only the sender may edit, and only plain text messages.
    pub fn is_editable_by(&self, user_id: &str) -> bool {
        self.kind == MessageKind::Text && self.is_from(user_id)
    }

    pub fn is_deletable_by(&self, user_id: &str) -> bool {
        self.is_from(user_id)
    }

    pub fn is_downloadable(&self) -> bool {
        self.kind == MessageKind::Document
            && self.attachment.as_ref().is_some_and(|a| a.is_downloadable())
    }
}

/// Payload for a new message. At least one of `text` or `file` must be set.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub text: Option<String>,
    pub file: Option<OutgoingFile>,
}

impl NewMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            file: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        let no_text = self.text.as_deref().map_or(true, |t| t.trim().is_empty());
        let no_file = self.file.as_ref().map_or(true, |f| f.is_empty());
        no_text && no_file
    }
}

// -- Wire format --

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(default)]
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group_id: Option<String>,
    #[serde(default)]
    sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sender_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sender_role: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    edited_at: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_size: Option<u64>,
    #[serde(default)]
    upload_failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl From<RawMessage> for Message {
    fn from(raw: RawMessage) -> Self {
        let attachment = raw.file_name.map(|file_name| Attachment {
            file_name,
            mime_type: raw.mime_type,
            url: raw.file_url.filter(|u| !u.is_empty()),
            path: raw.file_path,
            size_bytes: raw.file_size,
            upload_error: if raw.upload_failed {
                Some(raw.error_message.unwrap_or_else(|| "upload failed".into()))
            } else {
                None
            },
        });

        let kind = match raw.kind.as_deref().and_then(MessageKind::from_str) {
            Some(kind) => kind,
            None if attachment.is_some() => MessageKind::Document,
            None => MessageKind::Text,
        };

        Message {
            id: raw.id,
            group_id: raw.group_id.unwrap_or_default(),
            sender_id: raw.sender_id,
            sender_email: raw.sender_email,
            sender_role: raw.sender_role.as_deref().and_then(Role::from_str),
            text: raw.text,
            attachment,
            kind,
            created_at: raw.timestamp.as_deref().and_then(parse_timestamp),
            edited: raw.edited,
            edited_at: raw.edited_at.as_deref().and_then(parse_timestamp),
        }
    }
}

impl From<Message> for RawMessage {
    fn from(m: Message) -> Self {
        let mut raw = RawMessage {
            id: m.id,
            group_id: Some(m.group_id).filter(|g| !g.is_empty()),
            sender_id: m.sender_id,
            sender_email: m.sender_email,
            sender_role: m.sender_role.map(|r| r.as_str().to_string()),
            timestamp: m.created_at.map(|t| t.to_rfc3339()),
            edited: m.edited,
            edited_at: m.edited_at.map(|t| t.to_rfc3339()),
            kind: Some(m.kind.as_str().to_string()),
            text: m.text,
            ..Default::default()
        };
        if let Some(a) = m.attachment {
            raw.file_name = Some(a.file_name);
            raw.file_path = a.path;
            raw.file_url = a.url;
            raw.mime_type = a.mime_type;
            raw.file_size = a.size_bytes;
            raw.upload_failed = a.upload_error.is_some();
            raw.error_message = a.upload_error;
        }
        raw
    }
}

/// Accepts RFC 3339 and offset-less ISO 8601 (taken as UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
