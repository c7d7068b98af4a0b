//! Sign-in-or-register flow and profile bootstrap.
//!
//! Signing in with an unknown email registers it. Either way the user ends
//! up with a `users/{uid}` profile document that the roster can list.

use crate::core::types::timestamp;
use crate::core::{
    AuthService, AuthUser, CollectionPath, Credentials, DocumentStore, Result, SyncError,
};
use crate::roster::RosterStream;
use crate::sync::SyncCore;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Clone)]
pub struct AccountFlow {
    auth: Arc<dyn AuthService>,
    store: Arc<dyn DocumentStore>,
    sync: SyncCore,
    roster: RosterStream,
}

impl AccountFlow {
    pub fn new(
        auth: Arc<dyn AuthService>,
        store: Arc<dyn DocumentStore>,
        sync: SyncCore,
        roster: RosterStream,
    ) -> Self {
        Self {
            auth,
            store,
            sync,
            roster,
        }
    }

    /// Sign in, registering the email first if it is not known.
    pub async fn sign_in_or_register(&self, credentials: &Credentials) -> Result<AuthUser> {
        validate(credentials)?;

        match self
            .auth
            .sign_in(&credentials.email, &credentials.password)
            .await
        {
            Ok(user) => {
                self.ensure_profile(&user, &credentials.name).await?;
                Ok(user)
            }
            Err(SyncError::InvalidCredential) => {
                debug!("[Account] Sign-in refused, registering {}", credentials.email);
                let user = self
                    .auth
                    .create_account(&credentials.email, &credentials.password)
                    .await?;
                self.write_profile(&user, &credentials.name).await?;
                info!("[Account] Registered {} as {}", user.email, user.id);
                Ok(user)
            }
            Err(e) => Err(e),
        }
    }

    /// Close every open conversation and the roster, then sign out.
    pub async fn sign_out(&self) -> Result<()> {
        self.sync.close_all().await;
        self.roster.close();
        self.auth.sign_out().await
    }

    pub fn auth_state(&self) -> watch::Receiver<Option<AuthUser>> {
        self.auth.subscribe_auth_state()
    }

    async fn ensure_profile(&self, user: &AuthUser, name: &str) -> Result<()> {
        let existing = self
            .store
            .get(&CollectionPath::users(), user.id.as_str())
            .await?;
        if existing.is_some() {
            return Ok(());
        }
        self.write_profile(user, name).await
    }

    async fn write_profile(&self, user: &AuthUser, name: &str) -> Result<()> {
        let profile = json!({
            "name": name.trim(),
            "email": user.email,
            "createdAt": timestamp::format(&Utc::now()),
        });
        self.store
            .set(&CollectionPath::users(), user.id.as_str(), profile)
            .await?;
        info!("[Account] Profile written for {}", user.id);
        Ok(())
    }
}

fn validate(credentials: &Credentials) -> Result<()> {
    let missing: Vec<&str> = [
        ("name", &credentials.name),
        ("email", &credentials.email),
        ("password", &credentials.password),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(field, _)| field)
    .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SyncError::InvalidInput(format!(
            "missing {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_lists_missing_fields() {
        assert!(validate(&Credentials::new("Al", "al@x.io", "secret1")).is_ok());

        match validate(&Credentials::new(" ", "al@x.io", "")) {
            Err(SyncError::InvalidInput(msg)) => assert_eq!(msg, "missing name, password"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
