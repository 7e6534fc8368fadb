//! Messaging adapters and the outbound length contract.

pub mod discord;
pub mod traits;

pub use discord::DiscordAdapter;
pub use traits::{InboundStream, Messaging, MessagingDyn};

/// Marker appended to text cut at a length limit.
pub const TRUNCATION_MARKER: &str = "...";

/// Clamp `text` to at most `max_chars` characters.
///
/// Text that fits is returned unchanged. Longer text keeps its first
/// `max_chars - 3` characters followed by [`TRUNCATION_MARKER`], so the result
/// is exactly `max_chars` long. Limits below the marker length are not supported.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let keep = max_chars.saturating_sub(TRUNCATION_MARKER.len());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
