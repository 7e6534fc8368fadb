//! Conversational replies in dedicated chat channels.
//!
//! Messages from one user are buffered until they stop typing for the
//! debounce period, then answered in a single generation. While that
//! generation runs, further messages from the same user are turned away.

pub mod context;
pub mod engine;
pub mod prompt;
pub mod store;

pub use context::{ConversationContext, PendingTurn};
pub use engine::{Admission, ChatEngine, STILL_GENERATING_NOTICE};
pub use store::ContextStore;
