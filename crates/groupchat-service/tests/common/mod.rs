//! In-process stand-in for the chat backend.
//!
//! Routes mirror the REST surface the client talks to. Storage and the
//! sender/ownership rules come from `MemoryService`; the stub only adds
//! bearer-token authentication and the JSON/multipart wire format.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use groupchat_core::attachment::OutgoingFile;
use groupchat_core::group::Group;
use groupchat_core::message::{Message, NewMessage};
use groupchat_core::role::Role;
use groupchat_core::session::{Session, SessionHandle, SessionUser};
use groupchat_service::{GroupDirectory, MemoryService, MessageStore, ServiceError};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

pub struct StubServer {
    pub base_url: String,
    pub store: Arc<MemoryService>,
    _handle: tokio::task::JoinHandle<()>,
}

#[derive(Clone)]
struct StubState {
    users: Arc<HashMap<String, SessionUser>>,
    acting: SessionHandle,
    store: Arc<MemoryService>,
    // MemoryService takes its sender from one session; requests run one at a time.
    gate: Arc<Mutex<()>>,
}

struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "detail": self.1 }))).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::NotFound(m) => ApiError(StatusCode::NOT_FOUND, m),
            ServiceError::InvalidInput(m) => ApiError(StatusCode::BAD_REQUEST, m),
            ServiceError::Unauthorized(m) => ApiError(StatusCode::FORBIDDEN, m),
            ServiceError::Transport(m) | ServiceError::Internal(m) => {
                ApiError(StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        }
    }
}

pub fn user(uid: &str, role: Role) -> SessionUser {
    SessionUser {
        uid: uid.into(),
        email: format!("{uid}@uni.test"),
        display_name: None,
        role,
        group_id: None,
    }
}

pub fn group(id: &str, prof: &str, students: &[&str]) -> Group {
    Group {
        id: id.into(),
        name: format!("Group {id}"),
        prof_id: Some(prof.into()),
        student_ids: students.iter().map(|s| s.to_string()).collect(),
        project_title: None,
        progress: 0,
    }
}

/// Spawn the stub on a random port. `users` maps bearer tokens to identities.
pub async fn spawn_stub_server(users: Vec<(&str, SessionUser)>, groups: Vec<Group>) -> StubServer {
    let acting = SessionHandle::new();
    let store = Arc::new(MemoryService::new(acting.clone()));
    for g in groups {
        store.add_group(g);
    }
    let state = StubState {
        users: Arc::new(
            users
                .into_iter()
                .map(|(token, user)| (token.to_string(), user))
                .collect(),
        ),
        acting,
        store: store.clone(),
        gate: Arc::new(Mutex::new(())),
    };

    let app = Router::new()
        .route("/auth/me", get(me))
        .route("/chat/{group_id}/messages", get(list).post(create))
        .route(
            "/chat/{group_id}/messages/{message_id}",
            axum::routing::put(update).delete(remove),
        )
        .route("/groups/my-group", get(my_group))
        .route("/admin/my-groups", get(staff_groups))
        .route("/admin/groups", get(staff_groups))
        .route("/files/{*path}", get(file))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    StubServer {
        base_url: format!("http://{addr}"),
        store,
        _handle: handle,
    }
}

fn authenticate(state: &StubState, headers: &HeaderMap) -> Result<SessionUser, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| state.users.get(token))
        .cloned()
        .ok_or_else(|| ApiError(StatusCode::UNAUTHORIZED, "Invalid or expired token".into()))
}

fn act_as(state: &StubState, user: &SessionUser) {
    state.acting.sign_in(Session::new(user.clone(), "stub"));
}

fn bad_form(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError(StatusCode::BAD_REQUEST, e.to_string())
}

async fn me(State(state): State<StubState>, headers: HeaderMap) -> Result<Json<SessionUser>, ApiError> {
    authenticate(&state, &headers).map(Json)
}

async fn list(
    State(state): State<StubState>,
    Path(group_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<Message>>, ApiError> {
    let _gate = state.gate.lock().await;
    act_as(&state, &authenticate(&state, &headers)?);
    let mut messages = state.store.list_messages(&group_id).await?;
    for m in &mut messages {
        if let Some(a) = m.attachment.as_mut() {
            a.url = a
                .url
                .take()
                .map(|u| match u.strip_prefix("memory://") {
                    Some(rest) => format!("/files/{rest}"),
                    None => u,
                });
        }
    }
    Ok(Json(messages))
}

async fn create(
    State(state): State<StubState>,
    Path(group_id): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let _gate = state.gate.lock().await;
    act_as(&state, &authenticate(&state, &headers)?);

    let mut input = NewMessage::default();
    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "text" => input.text = Some(field.text().await.map_err(bad_form)?),
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let mime = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(bad_form)?;
                input.file = Some(OutgoingFile::new(file_name, mime, data));
            }
            _ => {}
        }
    }
    state.store.create_message(&group_id, &input).await?;
    Ok(Json(json!({ "status": "sent" })))
}

async fn update(
    State(state): State<StubState>,
    Path((group_id, message_id)): Path<(String, String)>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let _gate = state.gate.lock().await;
    act_as(&state, &authenticate(&state, &headers)?);

    let mut text = String::new();
    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        if field.name() == Some("text") {
            text = field.text().await.map_err(bad_form)?;
        }
    }
    state
        .store
        .update_message(&group_id, &message_id, &text)
        .await?;
    Ok(Json(json!({ "status": "updated" })))
}

async fn remove(
    State(state): State<StubState>,
    Path((group_id, message_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let _gate = state.gate.lock().await;
    act_as(&state, &authenticate(&state, &headers)?);
    state.store.delete_message(&group_id, &message_id).await?;
    Ok(Json(json!({ "status": "deleted" })))
}

async fn my_group(
    State(state): State<StubState>,
    headers: HeaderMap,
) -> Result<Json<Option<Group>>, ApiError> {
    let _gate = state.gate.lock().await;
    let user = authenticate(&state, &headers)?;
    act_as(&state, &user);
    let groups = state.store.my_groups(&user).await?;
    Ok(Json(groups.into_iter().next()))
}

async fn staff_groups(
    State(state): State<StubState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Group>>, ApiError> {
    let _gate = state.gate.lock().await;
    let user = authenticate(&state, &headers)?;
    if user.role == Role::Student {
        return Err(ApiError(StatusCode::FORBIDDEN, "staff only".into()));
    }
    act_as(&state, &user);
    Ok(Json(state.store.my_groups(&user).await?))
}

async fn file(
    State(state): State<StubState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    authenticate(&state, &headers)?;
    let blob = state
        .store
        .fetch_attachment(&format!("memory://{path}"))
        .await?;
    let content_type = blob
        .content_type
        .unwrap_or_else(|| "application/octet-stream".into());
    Ok(([(header::CONTENT_TYPE, content_type)], blob.data).into_response())
}
