use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::role::Role;

/// Token the backend accepts for the local administrator account.
pub const ADMIN_SESSION_TOKEN: &str = "ADMIN_SESSION";

/// The signed-in user, as returned by the identity endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub uid: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Role,
    /// Students are assigned to a single project group.
    #[serde(default)]
    pub group_id: Option<String>,
}

impl SessionUser {
    pub fn label(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.email,
        }
    }
}

#[derive(Clone)]
pub struct Session {
    pub user: SessionUser,
    token: String,
}

impl Session {
    pub fn new(user: SessionUser, token: impl Into<String>) -> Self {
        Self {
            user,
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_admin_session(&self) -> bool {
        self.token == ADMIN_SESSION_TOKEN
    }
}

// Keep the bearer token out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Shared, explicitly managed session context.
///
/// Cloning yields another handle onto the same session. `sign_in` starts the
/// session, `sign_out` ends it; while signed out every accessor reports
/// [`ChatError::Unauthorized`].
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(session: Session) -> Self {
        let handle = Self::new();
        handle.sign_in(session);
        handle
    }

    pub fn sign_in(&self, session: Session) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    pub fn sign_out(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_signed_in(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn current(&self) -> Result<Session, ChatError> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| ChatError::Unauthorized("not signed in".into()))
    }

    pub fn user(&self) -> Result<SessionUser, ChatError> {
        self.current().map(|s| s.user)
    }

    /// The bearer token for the next request.
    pub fn bearer(&self) -> Result<String, ChatError> {
        self.current().map(|s| s.token)
    }

    /// Swap in a rotated token from the identity provider.
    pub fn refresh_token(&self, token: impl Into<String>) -> Result<(), ChatError> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(session) => {
                session.token = token.into();
                Ok(())
            }
            None => Err(ChatError::Unauthorized("not signed in".into())),
        }
    }
}
