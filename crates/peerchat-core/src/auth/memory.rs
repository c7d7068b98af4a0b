//! In-process authentication service.
//!
//! Accounts are keyed by normalized email and hold a bcrypt hash. Sign-in
//! state is published through a `watch` channel so observers see every
//! sign-in and sign-out.

use crate::core::{AuthService, AuthUser, Result, SyncError, UserId};
use async_trait::async_trait;
use bcrypt::{hash, verify, DEFAULT_COST};
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

const MIN_PASSWORD_LEN: usize = 6;

/// Account record
#[derive(Debug, Clone)]
struct Account {
    id: UserId,
    email: String,
    password_hash: String,
}

impl Account {
    fn user(&self) -> AuthUser {
        AuthUser {
            id: self.id.clone(),
            email: self.email.clone(),
        }
    }
}

pub struct MemoryAuth {
    accounts: RwLock<HashMap<String, Account>>,
    state: watch::Sender<Option<AuthUser>>,
    cost: u32,
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::with_cost(DEFAULT_COST)
    }

    /// Use a specific bcrypt cost (lower is faster, for tests).
    pub fn with_cost(cost: u32) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            accounts: RwLock::new(HashMap::new()),
            state,
            cost,
        }
    }

    fn normalize(email: &str) -> String {
        email.trim().to_lowercase()
    }

    fn lookup(&self, email: &str) -> Option<Account> {
        self.accounts.read().get(&Self::normalize(email)).cloned()
    }
}

#[async_trait]
impl AuthService for MemoryAuth {
    fn current_user(&self) -> Option<AuthUser> {
        self.state.borrow().clone()
    }

    fn subscribe_auth_state(&self) -> watch::Receiver<Option<AuthUser>> {
        self.state.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser> {
        let Some(account) = self.lookup(email) else {
            warn!("[Auth] Sign-in for unknown account {}", email);
            return Err(SyncError::InvalidCredential);
        };

        let valid = verify(password, &account.password_hash)
            .map_err(|e| SyncError::Auth(format!("Failed to verify password: {}", e)))?;
        if !valid {
            warn!("[Auth] Failed sign-in attempt for {}", account.email);
            return Err(SyncError::InvalidCredential);
        }

        let user = account.user();
        self.state.send_replace(Some(user.clone()));
        info!("[Auth] Signed in: {}", user.email);
        Ok(user)
    }

    async fn create_account(&self, email: &str, password: &str) -> Result<AuthUser> {
        let normalized = Self::normalize(email);
        if !normalized.contains('@') {
            return Err(SyncError::InvalidInput(format!("{:?} is not an email address", email)));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(SyncError::WeakPassword);
        }
        if self.lookup(&normalized).is_some() {
            return Err(SyncError::EmailInUse);
        }

        let password_hash = hash(password, self.cost)
            .map_err(|e| SyncError::Auth(format!("Failed to hash password: {}", e)))?;

        let account = Account {
            id: UserId::new(Uuid::new_v4().simple().to_string()),
            email: normalized.clone(),
            password_hash,
        };

        {
            let mut accounts = self.accounts.write();
            // re-check under the write lock
            if accounts.contains_key(&normalized) {
                return Err(SyncError::EmailInUse);
            }
            accounts.insert(normalized, account.clone());
        }

        let user = account.user();
        self.state.send_replace(Some(user.clone()));
        info!("[Auth] Account registered: {} ({})", user.email, user.id);
        Ok(user)
    }

    async fn sign_out(&self) -> Result<()> {
        if let Some(user) = self.state.send_replace(None) {
            info!("[Auth] Signed out: {}", user.email);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> MemoryAuth {
        MemoryAuth::with_cost(4)
    }

    #[tokio::test]
    async fn test_register_then_sign_in() {
        let auth = auth();
        let created = auth.create_account("Alice@Example.com", "secret1").await.unwrap();
        auth.sign_out().await.unwrap();
        assert!(auth.current_user().is_none());

        let signed_in = auth.sign_in("alice@example.com ", "secret1").await.unwrap();
        assert_eq!(signed_in, created);
        assert_eq!(auth.current_user(), Some(created));
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_email_look_the_same() {
        let auth = auth();
        auth.create_account("bob@example.com", "hunter22").await.unwrap();

        assert!(matches!(
            auth.sign_in("bob@example.com", "wrong!!").await,
            Err(SyncError::InvalidCredential)
        ));
        assert!(matches!(
            auth.sign_in("nobody@example.com", "hunter22").await,
            Err(SyncError::InvalidCredential)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_and_weak_registration() {
        let auth = auth();
        auth.create_account("c@example.com", "longenough").await.unwrap();

        assert!(matches!(
            auth.create_account("C@example.com", "longenough").await,
            Err(SyncError::EmailInUse)
        ));
        assert!(matches!(
            auth.create_account("d@example.com", "short").await,
            Err(SyncError::WeakPassword)
        ));
        assert!(matches!(
            auth.create_account("not-an-email", "longenough").await,
            Err(SyncError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_ids_never_contain_conversation_separator() {
        let auth = auth();
        let user = auth.create_account("e@example.com", "longenough").await.unwrap();
        assert!(crate::identity::validate(&user.id).is_ok());
    }

    #[tokio::test]
    async fn test_auth_state_is_observable() {
        let auth = auth();
        let mut state = auth.subscribe_auth_state();
        assert!(state.borrow().is_none());

        let user = auth.create_account("f@example.com", "longenough").await.unwrap();
        state.changed().await.unwrap();
        assert_eq!(state.borrow().as_ref(), Some(&user));

        auth.sign_out().await.unwrap();
        state.changed().await.unwrap();
        assert!(state.borrow().is_none());
    }
}
