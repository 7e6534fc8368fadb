//! Debounced, single-flight reply scheduling.

use crate::UserId;
use crate::chat::context::PendingTurn;
use crate::chat::prompt;
use crate::chat::store::{self, ContextSlot, ContextStore};
use crate::config::ChatConfig;
use crate::error::GenerationError;
use crate::llm::ResponseGenerator;
use crate::messaging::{MessagingDyn, truncate_chars};
use crate::{InboundMessage, OutboundResponse, StatusUpdate};
use std::sync::Arc;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Outcome of offering a message to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Not a conversation message.
    Ignored,
    /// Buffered; the debounce timer was (re)started.
    Scheduled,
    /// A reply is still being generated; the user should be told to wait.
    Busy,
}

/// Sent to a user who writes again while their reply is being generated.
pub const STILL_GENERATING_NOTICE: &str =
    "I'm still generating a response for your previous message. Please wait a moment.";

/// Clears the generating flag on every exit path, recording the reply only
/// when [`GenerationGuard::complete`] was reached.
struct GenerationGuard {
    slot: ContextSlot,
    reply: Option<String>,
}

impl GenerationGuard {
    fn complete(mut self, reply: String) {
        self.reply = Some(reply);
    }
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        store::lock(&self.slot).finish_generation(self.reply.take());
    }
}

/// Answers messages in chat channels, one generation per user at a time.
#[derive(Clone)]
pub struct ChatEngine {
    config: Arc<ChatConfig>,
    store: ContextStore,
    generator: Arc<dyn ResponseGenerator>,
    messaging: Arc<dyn MessagingDyn>,
}

impl std::fmt::Debug for ChatEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatEngine")
            .field("channel_prefix", &self.config.channel_prefix)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl ChatEngine {
    pub fn new(
        config: ChatConfig,
        generator: Arc<dyn ResponseGenerator>,
        messaging: Arc<dyn MessagingDyn>,
    ) -> Self {
        let store = ContextStore::new(config.context_idle(), config.max_history_messages);
        Self {
            config: Arc::new(config),
            store,
            generator,
            messaging,
        }
    }

    /// Whether this message belongs to a conversation at all.
    pub fn is_eligible(&self, message: &InboundMessage) -> bool {
        self.config.enabled
            && message.is_processable()
            && message
                .channel_name
                .as_deref()
                .is_some_and(|name| name.starts_with(&self.config.channel_prefix))
            && !message.text.trim().is_empty()
    }

    /// Record the message and (re)start the user's debounce timer.
    ///
    /// Never awaits, so calling it from the dispatch loop commits messages in
    /// the order they are dispatched.
    pub fn admit(&self, message: &InboundMessage) -> Admission {
        if !self.is_eligible(message) {
            return Admission::Ignored;
        }

        let user = message.user_id();
        let slot = self.store.get_or_create(&user);
        let mut context = store::lock(&slot);
        if context.is_generating() {
            tracing::debug!(sender_id = %message.sender_id, "message arrived during generation");
            return Admission::Busy;
        }

        context.push_user(message);
        let engine = self.clone();
        let delay = self.config.debounce();
        context.arm(move |epoch| {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                engine.fire(user, epoch).await;
            })
        });
        Admission::Scheduled
    }

    /// Tell the user their previous message is still being answered.
    pub async fn notify_busy(&self, message: &InboundMessage) {
        self.send(message, OutboundResponse::Text(STILL_GENERATING_NOTICE.into()))
            .await;
    }

    /// Debounce expiry: generate and deliver one reply for the buffered turn.
    async fn fire(&self, user: UserId, epoch: u64) {
        let Some(slot) = self.store.get(&user) else {
            return;
        };

        let turn = {
            let mut context = store::lock(&slot);
            context.begin_generation(epoch)
        };
        let Some(PendingTurn {
            history,
            reply_to: origin,
        }) = turn
        else {
            return;
        };

        let guard = GenerationGuard {
            slot,
            reply: None,
        };
        let typing = self.start_typing(&origin);

        let timeout = self.config.generation_timeout();
        let prompt = prompt::build_prompt(&history);
        let result = tokio::time::timeout(timeout, self.generator.generate(prompt))
            .await
            .unwrap_or(Err(GenerationError::Timeout(timeout)));

        drop(typing);

        match result {
            Ok(reply) => {
                tracing::info!(
                    sender_id = %origin.sender_id,
                    reply_chars = reply.chars().count(),
                    "generated reply"
                );
                let outgoing = truncate_chars(&reply, self.config.max_reply_chars);
                guard.complete(reply);
                self.send(&origin, OutboundResponse::Text(outgoing)).await;
            }
            Err(error) => {
                drop(guard);
                tracing::error!(%error, sender_id = %origin.sender_id, "failed to generate reply");
            }
        }
    }

    /// Typing indicator now and every `typing_interval` until the guard drops.
    fn start_typing(&self, origin: &InboundMessage) -> DropGuard {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let messaging = self.messaging.clone();
        let origin = origin.clone();
        let period = self.config.typing_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(error) = messaging.send_status(&origin, StatusUpdate::Typing).await {
                            tracing::debug!(%error, "failed to send typing indicator");
                        }
                    }
                }
            }
        });

        token.drop_guard()
    }

    async fn send(&self, message: &InboundMessage, response: OutboundResponse) {
        if let Err(error) = self.messaging.respond(message, response).await {
            tracing::warn!(%error, message_id = %message.id, "failed to send chat reply");
        }
    }
}
