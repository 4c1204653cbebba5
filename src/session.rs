//! Local-only session: at most one user record, replaced wholesale on
//! register and erased on logout. Passwords are accepted and ignored.

use chrono::Utc;
use std::sync::Arc;

use crate::error::StoreResult;
use crate::events::ChangeEvent;
use crate::storage::{RecordStore, keys};
use crate::types::{User, UserRole};

const LOCAL_USER_ID: u64 = 1;
const LOCAL_EMAIL_DOMAIN: &str = "local.app";

#[derive(Clone)]
pub struct SessionStore {
    store: Arc<RecordStore>,
}

impl SessionStore {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    pub fn current(&self) -> Option<User> {
        self.store.read(keys::USER, None)
    }

    pub fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }

    pub fn set(&self, user: &User) -> StoreResult<()> {
        self.store.write(keys::USER, user)?;
        self.store.publish(ChangeEvent::SessionChanged);
        Ok(())
    }

    pub fn clear(&self) -> StoreResult<()> {
        self.store.remove(keys::USER)?;
        self.store.publish(ChangeEvent::SessionChanged);
        Ok(())
    }

    pub fn create_default(&self, username: &str, email: &str) -> StoreResult<User> {
        let now = Utc::now();
        let user = User {
            id: LOCAL_USER_ID,
            username: username.to_string(),
            email: email.to_string(),
            role: UserRole::User,
            created_at: now,
            updated_at: now,
        };
        self.set(&user)?;
        Ok(user)
    }

    /// Resume the stored session, or start one for `username` if none exists.
    pub fn login(&self, username: &str, _password: &str) -> StoreResult<User> {
        if let Some(user) = self.current() {
            tracing::info!(username = %user.username, "resumed local session");
            return Ok(user);
        }
        let email = format!("{username}@{LOCAL_EMAIL_DOMAIN}");
        let user = self.create_default(username, &email)?;
        tracing::info!(username, "started local session");
        Ok(user)
    }

    pub fn register(&self, username: &str, email: &str, _password: &str) -> StoreResult<User> {
        let user = self.create_default(username, email)?;
        tracing::info!(username, "registered local user");
        Ok(user)
    }

    pub fn logout(&self) -> StoreResult<()> {
        self.clear()?;
        tracing::info!("logged out");
        Ok(())
    }
}
