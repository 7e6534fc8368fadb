//! Per-user conversation state.

use crate::InboundMessage;
use crate::llm::{ChatMessage, Role};
use tokio::task::JoinHandle;

/// What a fired timer needs to produce one reply.
#[derive(Debug, Clone)]
pub struct PendingTurn {
    pub history: Vec<ChatMessage>,
    /// Newest message of the turn; the reply is attached to it.
    pub reply_to: InboundMessage,
}

/// History and scheduling state of one user's conversation.
///
/// Always accessed behind the slot mutex in [`super::store::ContextStore`], and
/// never across an await.
#[derive(Debug)]
pub struct ConversationContext {
    history: Vec<ChatMessage>,
    /// Unanswered messages of the open user turn, sorted by sequence.
    turn: Vec<(u64, String)>,
    reply_to: Option<InboundMessage>,
    generating: bool,
    /// Bumped on every arm; a timer only fires if its epoch is still current.
    epoch: u64,
    pending: Option<JoinHandle<()>>,
    max_history: usize,
}

impl ConversationContext {
    pub fn new(max_history: usize) -> Self {
        Self {
            history: Vec::new(),
            turn: Vec::new(),
            reply_to: None,
            generating: false,
            epoch: 0,
            pending: None,
            max_history: max_history.max(1),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn has_pending_timer(&self) -> bool {
        self.pending.is_some()
    }

    /// Add a user message. Consecutive user messages merge into one turn,
    /// joined in sequence order no matter the order they were pushed in.
    pub fn push_user(&mut self, message: &InboundMessage) {
        let at = self
            .turn
            .partition_point(|(sequence, _)| *sequence <= message.sequence);
        self.turn.insert(at, (message.sequence, message.text.clone()));

        if self
            .reply_to
            .as_ref()
            .is_none_or(|latest| latest.sequence <= message.sequence)
        {
            self.reply_to = Some(message.clone());
        }

        let merged = self
            .turn
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        match self.history.last_mut() {
            Some(last) if last.role == Role::User => last.content = merged,
            _ => self.history.push(ChatMessage::user(merged)),
        }
        self.trim();
    }

    /// Cancel the pending timer, if any, and install the one `spawn` creates
    /// for the new epoch.
    pub fn arm(&mut self, spawn: impl FnOnce(u64) -> JoinHandle<()>) {
        if let Some(previous) = self.pending.take() {
            previous.abort();
        }
        self.epoch = self.epoch.wrapping_add(1);
        self.pending = Some(spawn(self.epoch));
    }

    /// Enter the generating state for the timer armed at `epoch`.
    ///
    /// Returns the turn to answer, or `None` when the timer is stale, a
    /// generation is already running, or there is nothing to answer.
    pub fn begin_generation(&mut self, epoch: u64) -> Option<PendingTurn> {
        if epoch != self.epoch || self.generating {
            return None;
        }
        let reply_to = self.reply_to.clone()?;
        // The firing timer is the caller itself; detach rather than abort.
        self.pending = None;
        self.generating = true;
        Some(PendingTurn {
            history: self.history.clone(),
            reply_to,
        })
    }

    /// Leave the generating state. A reply closes the open user turn; without
    /// one the turn stays open and later messages keep merging into it.
    pub fn finish_generation(&mut self, reply: Option<String>) {
        self.generating = false;
        if let Some(reply) = reply {
            self.turn.clear();
            self.reply_to = None;
            self.history.push(ChatMessage::assistant(reply));
            self.trim();
        }
    }

    /// Drop the oldest turns past the limit. History always opens with a user
    /// turn, since the primer before it ends with the assistant.
    fn trim(&mut self) {
        if self.history.len() > self.max_history {
            let excess = self.history.len() - self.max_history;
            self.history.drain(..excess);
        }
        while self.history.len() > 1 && self.history[0].role == Role::Assistant {
            self.history.remove(0);
        }
    }
}

impl Drop for ConversationContext {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}
