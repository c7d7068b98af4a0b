//! Client facade: the collaborator handles of one signed-in device and the
//! operations a UI layer drives.

use crate::account::AccountFlow;
use crate::cache::LocalCache;
use crate::channel::ConversationChannel;
use crate::config::SyncConfig;
use crate::core::{AuthService, DocumentStore, KeyValueCache, Result, SyncError, UserId};
use crate::roster::{Roster, RosterStream};
use crate::sync::{Conversation, SyncCore};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct Client {
    config: SyncConfig,
    auth: Arc<dyn AuthService>,
    sync: SyncCore,
    roster: RosterStream,
    accounts: AccountFlow,
}

impl Client {
    pub fn new(
        config: SyncConfig,
        auth: Arc<dyn AuthService>,
        store: Arc<dyn DocumentStore>,
        cache: Arc<dyn KeyValueCache>,
    ) -> Self {
        let sync = SyncCore::new(
            auth.clone(),
            ConversationChannel::new(store.clone()),
            LocalCache::new(cache),
            config.idempotent_sends,
        );
        let roster = RosterStream::new(store.clone());
        let accounts = AccountFlow::new(auth.clone(), store, sync.clone(), roster.clone());

        Self {
            config,
            auth,
            sync,
            roster,
            accounts,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Identifier of the signed-in user.
    pub fn current_user(&self) -> Result<UserId> {
        self.auth
            .current_user()
            .map(|user| user.id)
            .ok_or(SyncError::AuthUnavailable)
    }

    /// Open the conversation with `peer`. Opening one that is already open
    /// closes the previous handle.
    pub async fn open_conversation(&self, peer: &UserId) -> Result<Conversation> {
        let me = self.current_user()?;
        if &me == peer {
            return Err(SyncError::SelfConversation);
        }
        self.sync.open(&me, peer).await
    }

    /// Live list of the other users. Replaces any previous roster.
    pub async fn roster(&self) -> Result<Roster> {
        let me = self.current_user()?;
        self.roster.subscribe(&me).await
    }

    pub fn accounts(&self) -> &AccountFlow {
        &self.accounts
    }

    pub fn sync(&self) -> &SyncCore {
        &self.sync
    }

    pub async fn sign_out(&self) -> Result<()> {
        info!("Signing out");
        self.accounts.sign_out().await
    }
}
