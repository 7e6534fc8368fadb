//! Prompt assembly for support conversations.

use crate::llm::ChatMessage;
use indoc::indoc;

pub const SYSTEM_PROMPT: &str = indoc! {"
    You are a support bot for SkinsRestorer. Use the searchKnowledge tool to find relevant \
    information from the knowledge base to answer user questions. Keep responses very short due \
    to Discord's 2000 character limit. Do not use table syntax or advanced formatting like \
    spoilers. Use only basic Discord formatting: **bold**, *italic*, __underline__, [link text](url).

    Your task is to provide support to users that seek help with the plugin.
    Use short sentence since the user may not know Minecraft well, no yapping.
    You are allowed to use Markdown format, but not other formats.
    Always be on-topic, do not let the user go off-topic."};

const PRIMER_USER: &str = "Hi Steward! I have an issue with SkinsRestorer. Can you help me?";
const PRIMER_ASSISTANT: &str = "Hello! Can you describe your issue? I wanna help you.";

/// System preamble, the fixed two-turn primer, then the conversation.
pub fn build_prompt(history: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 3);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    messages.push(ChatMessage::user(PRIMER_USER));
    messages.push(ChatMessage::assistant(PRIMER_ASSISTANT));
    messages.extend_from_slice(history);
    messages
}
