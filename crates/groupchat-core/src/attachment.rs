use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// File attached to a document message.
///
/// `url` is `None` when the store recorded the message but the blob upload
/// failed; `upload_error` then carries the store's reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub upload_error: Option<String>,
}

impl Attachment {
    pub fn is_downloadable(&self) -> bool {
        self.upload_error.is_none() && self.url.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// Short upper-cased type label taken from the MIME subtype,
    /// e.g. `application/pdf` -> `PDF`.
    pub fn type_label(&self) -> String {
        self.mime_type
            .as_deref()
            .and_then(|m| m.split('/').nth(1))
            .map(|sub| sub.split(';').next().unwrap_or(sub).trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "FILE".to_string())
    }
}

/// A file selected for upload with a new message.
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl OutgoingFile {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.file_name.is_empty()
    }
}
