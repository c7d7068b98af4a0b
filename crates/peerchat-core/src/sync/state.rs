//! Per-conversation synchronization state machine.
//!
//! `Idle -> Hydrating -> Live -> Closed`. The cached log only lands while no
//! remote snapshot has been applied; every remote snapshot replaces the log
//! wholesale. Nothing is applied once closed.

use crate::core::MessageLog;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Idle,
    Hydrating,
    Live,
    Closed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Hydrating => "hydrating",
            SyncPhase::Live => "live",
            SyncPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// What an observer of a conversation sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationView {
    pub phase: SyncPhase,
    pub messages: MessageLog,
    /// Set when the realtime subscription could not be established or
    /// reported an error. The last known messages stay visible.
    pub subscribe_error: Option<String>,
}

impl Default for ConversationView {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Idle,
            messages: MessageLog::new(),
            subscribe_error: None,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ConversationState {
    view: ConversationView,
    snapshot_applied: bool,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SyncPhase {
        self.view.phase
    }

    pub fn view(&self) -> ConversationView {
        self.view.clone()
    }

    /// Sends are accepted while hydrating or live.
    pub fn accepts_sends(&self) -> bool {
        matches!(self.view.phase, SyncPhase::Hydrating | SyncPhase::Live)
    }

    pub fn begin(&mut self) -> bool {
        if self.view.phase != SyncPhase::Idle {
            return false;
        }
        self.view.phase = SyncPhase::Hydrating;
        true
    }

    /// Install the cached log unless a remote snapshot got there first.
    pub fn apply_hydration(&mut self, log: MessageLog) -> bool {
        if self.snapshot_applied || self.view.phase != SyncPhase::Hydrating {
            return false;
        }
        self.view.messages = log;
        true
    }

    /// Replace the log with a remote snapshot.
    pub fn apply_snapshot(&mut self, log: MessageLog) -> bool {
        if self.view.phase == SyncPhase::Closed {
            return false;
        }
        self.snapshot_applied = true;
        self.view.messages = log;
        self.view.phase = SyncPhase::Live;
        self.view.subscribe_error = None;
        true
    }

    pub fn fail_subscribe(&mut self, reason: impl Into<String>) -> bool {
        if self.view.phase == SyncPhase::Closed {
            return false;
        }
        self.view.subscribe_error = Some(reason.into());
        true
    }

    /// Returns `false` if the conversation was already closed.
    pub fn close(&mut self) -> bool {
        if self.view.phase == SyncPhase::Closed {
            return false;
        }
        self.view.phase = SyncPhase::Closed;
        true
    }
}
