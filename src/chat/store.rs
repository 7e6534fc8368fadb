//! Keyed store of conversation contexts.

use crate::UserId;
use crate::chat::context::ConversationContext;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Shared handle to one user's context.
pub type ContextSlot = Arc<Mutex<ConversationContext>>;

/// Lock a slot. A panic while holding the lock leaves plain data behind, so
/// poisoning is ignored.
pub fn lock(slot: &ContextSlot) -> MutexGuard<'_, ConversationContext> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Concurrent map of user → context. Entries nobody has touched for the idle
/// period are evicted.
#[derive(Clone)]
pub struct ContextStore {
    contexts: moka::sync::Cache<UserId, ContextSlot>,
    max_history: usize,
}

impl std::fmt::Debug for ContextStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextStore")
            .field("entries", &self.contexts.entry_count())
            .finish_non_exhaustive()
    }
}

impl ContextStore {
    pub fn new(idle: Duration, max_history: usize) -> Self {
        Self {
            contexts: moka::sync::Cache::builder().time_to_idle(idle).build(),
            max_history,
        }
    }

    /// The user's context, created empty on first contact.
    pub fn get_or_create(&self, user: &UserId) -> ContextSlot {
        let max_history = self.max_history;
        self.contexts.get_with(user.clone(), || {
            tracing::debug!(user_id = %user, "new conversation context");
            Arc::new(Mutex::new(ConversationContext::new(max_history)))
        })
    }

    pub fn get(&self, user: &UserId) -> Option<ContextSlot> {
        self.contexts.get(user)
    }
}
