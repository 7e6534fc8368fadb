//! Steward: a community support assistant that triages pasted logs, screenshots and
//! diagnostic dumps, and answers questions in dedicated chat channels.

pub mod chat;
pub mod config;
pub mod error;
pub mod fetch;
pub mod llm;
pub mod messaging;
pub mod ocr;
pub mod release;
pub mod triage;

pub use error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Unique sender identifier used to key conversations.
pub type UserId = Arc<str>;

/// Inbound message, normalized from the gateway event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    /// Position of the message in its channel. Discord snowflakes sort by
    /// creation time, so this orders a user's messages even when the gateway
    /// delivers them out of order.
    pub sequence: u64,
    pub channel_id: String,
    pub sender_id: String,
    /// Username used for reply attribution.
    pub sender_name: String,
    /// Server nickname, when the sender has one.
    pub sender_nickname: Option<String>,
    /// Role names of the sender in the guild.
    pub sender_roles: Vec<String>,
    /// Role names of every mentioned guild member, one list per member.
    pub mentioned_roles: Vec<Vec<String>>,
    /// Whether the message replies to another message.
    pub is_reply: bool,
    /// Whether this is the opening message of a new forum post.
    pub starts_forum_post: bool,
    /// None for channels without a name (DMs, or when the lookup failed).
    pub channel_name: Option<String>,
    pub text: String,
    /// Text of every field of every rich embed carried by the message.
    pub embed_fields: Vec<String>,
    pub attachments: Vec<Attachment>,
    pub is_direct_message: bool,
    pub is_from_bot: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl InboundMessage {
    /// Direct messages and bot messages are never processed.
    pub fn is_processable(&self) -> bool {
        !self.is_direct_message && !self.is_from_bot
    }

    pub fn user_id(&self) -> UserId {
        Arc::from(self.sender_id.as_str())
    }

    /// Nickname if set, otherwise the username.
    pub fn display_name(&self) -> &str {
        self.sender_nickname.as_deref().unwrap_or(&self.sender_name)
    }
}

/// File attachment metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub url: String,
    /// Content type as declared by the uploader.
    pub content_type: Option<String>,
    pub size_bytes: Option<u64>,
}

/// Outbound response to the messaging platform. Every variant replies to the
/// triggering message.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundResponse {
    Text(String),
    /// Structured informational blocks (rendered as embeds on Discord).
    Blocks {
        content: Option<String>,
        blocks: Vec<InfoBlock>,
        attachment: Option<FileAttachment>,
    },
    /// Add a reaction emoji to the triggering message.
    Reaction(String),
}

/// A file sent along with a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    pub filename: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Status updates for messaging platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Show the "is typing" indicator in the message's channel.
    Typing,
}

/// How prominently a block should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Known error explanation.
    Notice,
    Info,
    Warning,
    Error,
}

/// One informational block produced by the triage pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoBlock {
    pub title: String,
    pub body: String,
    pub severity: Severity,
    pub tips: Vec<String>,
    pub link: Option<String>,
    /// Literal text that caused the block to be produced.
    pub excerpt: Option<String>,
    pub footer: Option<String>,
    pub thumbnail: Option<String>,
}

impl InfoBlock {
    pub fn new(severity: Severity, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            severity,
            tips: Vec::new(),
            link: None,
            excerpt: None,
            footer: None,
            thumbnail: None,
        }
    }

    pub fn with_tips(mut self, tips: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tips = tips.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }

    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail = Some(url.into());
        self
    }
}
