// packages/sdk/src/runtime/session.rs
//! Session and user identity
//!
//! The session id lives in session-scoped storage and is created from
//! `(timestamp + random)` on first read; it never rotates within a
//! session, not even when the user identity changes. The user id lives in
//! browser-persistent storage.

use crate::runtime::storage::StorageHandle;
use crate::utils::ids;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

const SESSION_ID_KEY: &str = "session_id";
const USER_ID_KEY: &str = "user_id";

/// Identity manager over the two storage lifetimes.
pub struct SessionManager {
    session_store: Arc<StorageHandle>,
    persistent_store: Arc<StorageHandle>,
    session_id: String,
    user: Mutex<Option<UserIdentity>>,
}

/// The active user identity.
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub id: String,
    pub properties: Option<serde_json::Value>,
}

impl SessionManager {
    pub fn new(session_store: Arc<StorageHandle>, persistent_store: Arc<StorageHandle>) -> Self {
        let session_id = match session_store.get(SESSION_ID_KEY) {
            Some(existing) => existing,
            None => {
                let fresh = ids::session_id();
                session_store.set(SESSION_ID_KEY, &fresh);
                debug!(session_id = %fresh, "created session");
                fresh
            }
        };

        let user = persistent_store.get(USER_ID_KEY).map(|id| UserIdentity {
            id,
            properties: None,
        });

        Self {
            session_store,
            persistent_store,
            session_id,
            user: Mutex::new(user),
        }
    }

    /// Immutable for the life of the browsing session.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> Option<String> {
        self.user.lock().as_ref().map(|u| u.id.clone())
    }

    pub fn set_user(&self, id: &str, properties: Option<serde_json::Value>) {
        self.persistent_store.set(USER_ID_KEY, id);
        *self.user.lock() = Some(UserIdentity {
            id: id.to_string(),
            properties,
        });
    }

    pub fn clear_user(&self) {
        self.persistent_store.remove(USER_ID_KEY);
        *self.user.lock() = None;
    }

    /// The session-scoped store (exposed for status reporting).
    pub fn session_store(&self) -> &StorageHandle {
        &self.session_store
    }
}
