//! Discord messaging adapter using serenity.

use crate::error::MessagingError;
use crate::messaging::traits::{InboundStream, Messaging};
use crate::messaging::truncate_chars;
use crate::{Attachment, InboundMessage, InfoBlock, OutboundResponse, Severity, StatusUpdate};

use anyhow::Context as _;
use serenity::all::{
    Cache, ChannelId, ChannelType, Colour, Context, CreateAttachment, CreateEmbed,
    CreateEmbedFooter, CreateMessage, EventHandler, GatewayIntents, GuildChannel, Http, Message,
    MessageId, ReactionType, Ready, RoleId, ShardManager,
};
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};

/// Discord message content limit, in characters.
const MAX_MESSAGE_LENGTH: usize = 2_000;
const MAX_EMBEDS_PER_MESSAGE: usize = 10;
const MAX_EMBED_TITLE: usize = 256;
const MAX_EMBED_DESCRIPTION: usize = 4_096;
const MAX_EMBED_FIELD: usize = 1_024;
const MAX_EMBED_FOOTER: usize = 2_048;

const ACCENT: Colour = Colour::new(0xE0_A5_2A);
const RED: Colour = Colour::new(0xFF_00_00);

/// Discord adapter state.
pub struct DiscordAdapter {
    token: String,
    http: Arc<RwLock<Option<Arc<Http>>>>,
    shard_manager: Arc<RwLock<Option<Arc<ShardManager>>>>,
}

impl DiscordAdapter {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            http: Arc::new(RwLock::new(None)),
            shard_manager: Arc::new(RwLock::new(None)),
        }
    }

    async fn http(&self) -> crate::Result<Arc<Http>> {
        self.http
            .read()
            .await
            .clone()
            .ok_or_else(|| MessagingError::NotConnected("discord".into()).into())
    }
}

struct Handler {
    inbound_tx: mpsc::Sender<InboundMessage>,
}

#[serenity::async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(bot = %ready.user.name, guilds = ready.guilds.len(), "discord connected");
    }

    async fn message(&self, ctx: Context, message: Message) {
        // Everything is read from the cache so nothing delays the hand-off.
        let snapshot = GuildSnapshot::capture(&ctx.cache, &message);
        let inbound = to_inbound(&message, snapshot);

        if self.inbound_tx.send(inbound).await.is_err() {
            tracing::debug!("inbound receiver dropped, discarding discord message");
        }
    }

    /// Join new forum posts so their messages are delivered.
    async fn thread_create(&self, ctx: Context, thread: GuildChannel) {
        let Some(parent_id) = thread.parent_id else {
            return;
        };
        let in_forum = ctx
            .cache
            .guild(thread.guild_id)
            .and_then(|guild| guild.channels.get(&parent_id).map(|parent| parent.kind))
            == Some(ChannelType::Forum);
        if !in_forum {
            return;
        }

        if let Err(error) = thread.id.join_thread(&ctx.http).await {
            tracing::warn!(%error, thread_id = %thread.id, "failed to join forum post");
        }
    }
}

/// Guild data resolved from the cache for one message. Empty for DMs and
/// guilds that are not cached yet.
#[derive(Debug, Default)]
struct GuildSnapshot {
    channel_name: Option<String>,
    sender_roles: Vec<String>,
    mentioned_roles: Vec<Vec<String>>,
    starts_forum_post: bool,
}

impl GuildSnapshot {
    fn capture(cache: &Cache, message: &Message) -> Self {
        let Some(guild_id) = message.guild_id else {
            return Self::default();
        };
        let Some(guild) = cache.guild(guild_id) else {
            tracing::debug!(%guild_id, "guild not cached");
            return Self::default();
        };

        let channel = guild.channels.get(&message.channel_id).or_else(|| {
            guild
                .threads
                .iter()
                .find(|thread| thread.id == message.channel_id)
        });
        let in_forum = channel
            .and_then(|channel| channel.parent_id)
            .and_then(|parent_id| guild.channels.get(&parent_id))
            .is_some_and(|parent| parent.kind == ChannelType::Forum);

        let role_names = |ids: &[RoleId]| -> Vec<String> {
            ids.iter()
                .filter_map(|id| guild.roles.get(id).map(|role| role.name.clone()))
                .collect()
        };

        Self {
            channel_name: channel.map(|channel| channel.name.clone()),
            sender_roles: message
                .member
                .as_ref()
                .map(|member| role_names(member.roles.as_slice()))
                .unwrap_or_default(),
            mentioned_roles: message
                .mentions
                .iter()
                .filter_map(|user| user.member.as_ref())
                .map(|member| role_names(member.roles.as_slice()))
                .collect(),
            // A forum post's opening message shares the post's id.
            starts_forum_post: in_forum && message.id.get() == message.channel_id.get(),
        }
    }
}

fn to_inbound(message: &Message, snapshot: GuildSnapshot) -> InboundMessage {
    let embed_fields = message
        .embeds
        .iter()
        .flat_map(|embed| embed.fields.iter().map(|field| field.value.clone()))
        .collect();

    let attachments = message
        .attachments
        .iter()
        .map(|attachment| Attachment {
            filename: attachment.filename.clone(),
            url: attachment.url.clone(),
            content_type: attachment.content_type.clone(),
            size_bytes: Some(u64::from(attachment.size)),
        })
        .collect();

    InboundMessage {
        id: message.id.get().to_string(),
        sequence: message.id.get(),
        channel_id: message.channel_id.get().to_string(),
        sender_id: message.author.id.get().to_string(),
        sender_name: message.author.name.clone(),
        sender_nickname: message.member.as_ref().and_then(|member| member.nick.clone()),
        sender_roles: snapshot.sender_roles,
        mentioned_roles: snapshot.mentioned_roles,
        is_reply: message.message_reference.is_some(),
        starts_forum_post: snapshot.starts_forum_post,
        channel_name: snapshot.channel_name,
        text: message.content.clone(),
        embed_fields,
        attachments,
        is_direct_message: message.guild_id.is_none(),
        is_from_bot: message.author.bot,
        timestamp: chrono::DateTime::from_timestamp(message.timestamp.unix_timestamp(), 0)
            .unwrap_or_else(chrono::Utc::now),
    }
}

fn parse_id(raw: &str) -> Result<u64, MessagingError> {
    raw.parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .ok_or_else(|| MessagingError::InvalidId(raw.to_string()))
}

fn target(message: &InboundMessage) -> Result<(ChannelId, MessageId), MessagingError> {
    Ok((
        ChannelId::new(parse_id(&message.channel_id)?),
        MessageId::new(parse_id(&message.id)?),
    ))
}

fn severity_colour(severity: Severity) -> Colour {
    match severity {
        Severity::Notice => ACCENT,
        Severity::Info => Colour::BLURPLE,
        Severity::Warning => Colour::RED,
        Severity::Error => RED,
    }
}

/// Render a block as an embed, clamping every part to Discord's limits.
pub fn render_embed(block: &InfoBlock) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(truncate_chars(&block.title, MAX_EMBED_TITLE))
        .description(truncate_chars(&block.body, MAX_EMBED_DESCRIPTION))
        .colour(severity_colour(block.severity));

    for (index, tip) in block.tips.iter().enumerate() {
        embed = embed.field(
            format!("Tip #{}", index + 1),
            truncate_chars(tip, MAX_EMBED_FIELD),
            false,
        );
    }

    if let Some(link) = &block.link {
        embed = embed.field("Read More", truncate_chars(link, MAX_EMBED_FIELD), false);
    }

    if let Some(excerpt) = &block.excerpt {
        embed = embed.field("Caused By", code_block(excerpt), false);
    }

    if let Some(thumbnail) = &block.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    if let Some(footer) = &block.footer {
        embed = embed.footer(CreateEmbedFooter::new(truncate_chars(footer, MAX_EMBED_FOOTER)));
    }

    embed
}

/// Wrap text in a code fence. Backticks inside are split with a zero-width
/// space so they cannot close the fence early.
fn code_block(text: &str) -> String {
    let escaped = text.replace('`', "`\u{200b}");
    // Room for the surrounding fence.
    format!("```{}```", truncate_chars(&escaped, MAX_EMBED_FIELD - 6))
}

fn send_failed(error: serenity::Error) -> MessagingError {
    MessagingError::SendFailed(error.to_string())
}

impl Messaging for DiscordAdapter {
    async fn start(&self) -> crate::Result<InboundStream> {
        let (inbound_tx, inbound_rx) = mpsc::channel(256);

        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;

        let mut client = serenity::Client::builder(&self.token, intents)
            .event_handler(Handler { inbound_tx })
            .await
            .context("failed to build discord client")?;

        *self.http.write().await = Some(client.http.clone());
        *self.shard_manager.write().await = Some(client.shard_manager.clone());

        tokio::spawn(async move {
            if let Err(error) = client.start().await {
                tracing::error!(%error, "discord gateway stopped");
            }
        });

        tracing::info!("discord gateway starting");

        let stream = tokio_stream::wrappers::ReceiverStream::new(inbound_rx);
        Ok(Box::pin(stream))
    }

    async fn respond(&self, message: &InboundMessage, response: OutboundResponse) -> crate::Result<()> {
        let http = self.http().await?;
        let (channel_id, message_id) = target(message)?;

        match response {
            OutboundResponse::Text(text) => {
                let builder = CreateMessage::new()
                    .content(truncate_chars(&text, MAX_MESSAGE_LENGTH))
                    .reference_message((channel_id, message_id));
                channel_id
                    .send_message(&*http, builder)
                    .await
                    .map_err(send_failed)?;
            }
            OutboundResponse::Blocks {
                content,
                blocks,
                attachment,
            } => {
                if blocks.len() > MAX_EMBEDS_PER_MESSAGE {
                    tracing::warn!(blocks = blocks.len(), "dropping embeds past the per-message limit");
                }
                let embeds = blocks
                    .iter()
                    .take(MAX_EMBEDS_PER_MESSAGE)
                    .map(render_embed)
                    .collect();

                let mut builder = CreateMessage::new()
                    .embeds(embeds)
                    .reference_message((channel_id, message_id));
                if let Some(content) = content {
                    builder = builder.content(truncate_chars(&content, MAX_MESSAGE_LENGTH));
                }
                if let Some(file) = attachment {
                    builder = builder.add_file(CreateAttachment::bytes(file.data, file.filename));
                }

                channel_id
                    .send_message(&*http, builder)
                    .await
                    .map_err(send_failed)?;
            }
            OutboundResponse::Reaction(emoji) => {
                http.create_reaction(channel_id, message_id, &ReactionType::Unicode(emoji))
                    .await
                    .map_err(send_failed)?;
            }
        }

        Ok(())
    }

    async fn send_status(&self, message: &InboundMessage, status: StatusUpdate) -> crate::Result<()> {
        match status {
            StatusUpdate::Typing => {
                let http = self.http().await?;
                let channel_id = ChannelId::new(parse_id(&message.channel_id)?);
                channel_id.broadcast_typing(&*http).await.map_err(send_failed)?;
            }
        }
        Ok(())
    }

    async fn shutdown(&self) -> crate::Result<()> {
        if let Some(shard_manager) = self.shard_manager.write().await.take() {
            shard_manager.shutdown_all().await;
        }
        self.http.write().await.take();
        tracing::info!("discord adapter shut down");
        Ok(())
    }
}
