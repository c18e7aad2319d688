use std::time::Duration;

use async_trait::async_trait;
use groupchat_core::group::Group;
use groupchat_core::message::{Message, NewMessage};
use groupchat_core::role::Role;
use groupchat_core::session::{Session, SessionHandle, SessionUser};
use reqwest::multipart::{Form, Part};
use reqwest::{header, Client, RequestBuilder, StatusCode};
use tracing::debug;

use crate::{AttachmentBytes, GroupDirectory, MessageStore, ServiceError};

/// Async HTTP client for the chat backend.
///
/// Every call reads the bearer token from the shared [`SessionHandle`] at
/// request time, so a sign-out or token refresh applies to the next request.
pub struct HttpService {
    base_url: String,
    client: Client,
    session: SessionHandle,
}

impl HttpService {
    pub fn new(base_url: &str, session: SessionHandle) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            base_url,
            client: Client::new(),
            session,
        }
    }

    pub fn with_timeout(
        base_url: &str,
        session: SessionHandle,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    fn with_auth(&self, builder: RequestBuilder) -> Result<RequestBuilder, ServiceError> {
        let token = self.session.bearer()?;
        Ok(builder.header(header::AUTHORIZATION, format!("Bearer {token}")))
    }

    /// Resolve the user behind `token` (`GET /auth/me`).
    /// Does not touch the shared session.
    pub async fn fetch_current_user(&self, token: &str) -> Result<SessionUser, ServiceError> {
        let resp = self
            .client
            .get(format!("{}/auth/me", self.base_url))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await
            .map_err(transport_error)?;
        handle_response(resp).await
    }

    /// Validate `token` with the backend and start the shared session.
    pub async fn sign_in(&self, token: &str) -> Result<SessionUser, ServiceError> {
        let user = self.fetch_current_user(token).await?;
        debug!(uid = %user.uid, role = %user.role, "signed in");
        self.session.sign_in(Session::new(user.clone(), token));
        Ok(user)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ServiceError> {
        debug!(path, "GET");
        let builder = self.client.get(format!("{}{path}", self.base_url));
        let resp = self
            .with_auth(builder)?
            .send()
            .await
            .map_err(transport_error)?;
        handle_response(resp).await
    }

    async fn post_form(&self, path: &str, form: Form) -> Result<(), ServiceError> {
        debug!(path, "POST");
        let builder = self
            .client
            .post(format!("{}{path}", self.base_url))
            .multipart(form);
        let resp = self
            .with_auth(builder)?
            .send()
            .await
            .map_err(transport_error)?;
        expect_success(resp).await
    }

    async fn put_form(&self, path: &str, form: Form) -> Result<(), ServiceError> {
        debug!(path, "PUT");
        let builder = self
            .client
            .put(format!("{}{path}", self.base_url))
            .multipart(form);
        let resp = self
            .with_auth(builder)?
            .send()
            .await
            .map_err(transport_error)?;
        expect_success(resp).await
    }

    async fn delete_req(&self, path: &str) -> Result<(), ServiceError> {
        debug!(path, "DELETE");
        let builder = self.client.delete(format!("{}{path}", self.base_url));
        let resp = self
            .with_auth(builder)?
            .send()
            .await
            .map_err(transport_error)?;
        expect_success(resp).await
    }
}

fn message_form(input: &NewMessage) -> Result<Form, ServiceError> {
    let mut form = Form::new();
    if let Some(text) = input.text.as_deref().filter(|t| !t.is_empty()) {
        form = form.text("text", text.to_string());
    }
    if let Some(file) = &input.file {
        let part = Part::bytes(file.data.to_vec())
            .file_name(file.file_name.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| ServiceError::InvalidInput(format!("mime type: {e}")))?;
        form = form.part("file", part);
    }
    Ok(form)
}

fn transport_error(e: reqwest::Error) -> ServiceError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        ServiceError::Transport(e.to_string())
    } else {
        ServiceError::Internal(e.to_string())
    }
}

async fn handle_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ServiceError> {
    let status = resp.status();
    if status.is_success() {
        resp.json::<T>()
            .await
            .map_err(|e| ServiceError::Internal(format!("json decode: {e}")))
    } else {
        Err(parse_error_with_status(status, resp).await)
    }
}

async fn expect_success(resp: reqwest::Response) -> Result<(), ServiceError> {
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(parse_error_with_status(status, resp).await)
    }
}

async fn parse_error_with_status(status: StatusCode, resp: reqwest::Response) -> ServiceError {
    let body = resp.text().await.unwrap_or_default();
    let msg = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v["detail"]
                .as_str()
                .or_else(|| v["error"].as_str())
                .map(String::from)
        })
        .unwrap_or(body);

    match status {
        StatusCode::NOT_FOUND => ServiceError::NotFound(msg),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ServiceError::InvalidInput(msg),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::Unauthorized(msg),
        _ => ServiceError::Internal(format!("{status}: {msg}")),
    }
}

#[async_trait]
impl MessageStore for HttpService {
    async fn list_messages(&self, group_id: &str) -> Result<Vec<Message>, ServiceError> {
        let mut messages: Vec<Message> = self.get_json(&format!("/chat/{group_id}/messages")).await?;
        for m in &mut messages {
            if m.group_id.is_empty() {
                m.group_id = group_id.to_string();
            }
        }
        Ok(messages)
    }

    async fn create_message(&self, group_id: &str, input: &NewMessage) -> Result<(), ServiceError> {
        let form = message_form(input)?;
        self.post_form(&format!("/chat/{group_id}/messages"), form)
            .await
    }

    async fn update_message(
        &self,
        group_id: &str,
        message_id: &str,
        text: &str,
    ) -> Result<(), ServiceError> {
        let form = Form::new().text("text", text.to_string());
        self.put_form(&format!("/chat/{group_id}/messages/{message_id}"), form)
            .await
    }

    async fn delete_message(&self, group_id: &str, message_id: &str) -> Result<(), ServiceError> {
        self.delete_req(&format!("/chat/{group_id}/messages/{message_id}"))
            .await
    }

    async fn fetch_attachment(&self, url: &str) -> Result<AttachmentBytes, ServiceError> {
        // Signed storage URLs are fetched as-is; backend-relative ones need the token.
        let builder = if url.starts_with('/') {
            self.with_auth(self.client.get(format!("{}{url}", self.base_url)))?
        } else {
            self.client.get(url)
        };
        debug!(url, "fetch attachment");
        let resp = builder.send().await.map_err(transport_error)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(parse_error_with_status(status, resp).await);
        }
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let data = resp
            .bytes()
            .await
            .map_err(|e| ServiceError::Transport(format!("read body: {e}")))?;
        Ok(AttachmentBytes { data, content_type })
    }
}

#[async_trait]
impl GroupDirectory for HttpService {
    async fn my_groups(&self, user: &SessionUser) -> Result<Vec<Group>, ServiceError> {
        match user.role {
            Role::Student => {
                let group: Option<Group> = self.get_json("/groups/my-group").await?;
                Ok(group.into_iter().collect())
            }
            Role::Professor => self.get_json("/admin/my-groups").await,
            Role::Admin => self.get_json("/admin/groups").await,
        }
    }
}
