//! Steward CLI entry point.

use anyhow::Context as _;
use clap::Parser;
use futures::StreamExt as _;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use steward::chat::{Admission, ChatEngine};
use steward::config::Config;
use steward::fetch::{ContentFetcher, HttpFetcher};
use steward::llm::{KnowledgeBase, OpenAiCompatibleGenerator, UpstashSearch};
use steward::messaging::{DiscordAdapter, MessagingDyn};
use steward::ocr::{OcrEngine, TesseractOcr};
use steward::release::{GithubReleaseFeed, ReleaseCache, ReleaseFeed};
use steward::triage::{
    Classifier, HintTable, PasteService, PasteUploader, RuleTable, Triage, TriageDeps,
};

const USER_AGENT: &str = "SkinsRestorerSteward";

#[derive(Parser)]
#[command(name = "steward")]
#[command(about = "Support assistant that triages logs and answers questions on Discord")]
struct Cli {
    /// Path to config file (optional)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("starting steward");

    let config = if let Some(config_path) = cli.config {
        Config::load_from_path(&config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        Config::load().with_context(|| "failed to load configuration from environment")?
    };

    let token = config
        .discord
        .token
        .clone()
        .context("discord token missing after validation")?;

    let http = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build HTTP client")?;
    let fetch_http = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(config.triage.fetch_timeout_secs))
        .build()
        .context("failed to build fetch HTTP client")?;

    let release = ReleaseCache::new();
    let feed: Arc<dyn ReleaseFeed> = Arc::new(GithubReleaseFeed::new(
        fetch_http.clone(),
        config.release.url.clone(),
    ));
    let refresh_task = release.spawn_refresh(feed, config.release.refresh_interval());

    let messaging: Arc<dyn MessagingDyn> = Arc::new(DiscordAdapter::new(token));

    let fetcher: Arc<dyn ContentFetcher> = Arc::new(HttpFetcher::new(fetch_http.clone()));
    let ocr: Arc<dyn OcrEngine> = Arc::new(TesseractOcr::new(
        fetcher.clone(),
        config.triage.ocr_command.clone(),
        config.triage.ocr_language.clone(),
    ));
    let uploader = config.triage.auto_upload.then(|| {
        Arc::new(PasteUploader::new(
            fetch_http.clone(),
            config.triage.upload_api.clone(),
            config.triage.upload_website.clone(),
        )) as Arc<dyn PasteService>
    });

    let triage = Arc::new(Triage::new(TriageDeps {
        hints: HintTable::new(config.triage.staff_roles.clone()),
        rules: RuleTable::builtin(),
        classifier: Classifier::builtin(release.clone(), config.triage.download_url.clone()),
        fetcher,
        ocr: Some(ocr),
        uploader,
        messaging: messaging.clone(),
    }));

    let chat = if config.chat.enabled {
        let knowledge = config.knowledge.credentials().map(|(url, token)| {
            Arc::new(UpstashSearch::new(
                http.clone(),
                url,
                token,
                config.knowledge.index.clone(),
            )) as Arc<dyn KnowledgeBase>
        });
        if knowledge.is_none() {
            tracing::info!("knowledge base not configured, generating without tools");
        }

        let generator = OpenAiCompatibleGenerator::new(http.clone(), &config.llm, knowledge)
            .context("failed to configure response generator")?;

        tracing::info!(
            model = %config.llm.model,
            channel_prefix = %config.chat.channel_prefix,
            "chat enabled"
        );
        Some(ChatEngine::new(
            config.chat.clone(),
            Arc::new(generator),
            messaging.clone(),
        ))
    } else {
        None
    };

    let mut inbound = messaging
        .start()
        .await
        .context("failed to start discord adapter")?;

    tracing::info!("steward started");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            message = inbound.next() => {
                let Some(message) = message else {
                    tracing::info!("inbound stream ended");
                    break;
                };

                tracing::debug!(
                    message_id = %message.id,
                    sender_id = %message.sender_id,
                    channel = ?message.channel_name,
                    "inbound message"
                );

                let triage = triage.clone();
                let triage_message = message.clone();
                tokio::spawn(async move {
                    triage.handle_message(&triage_message).await;
                });

                // Admission never awaits, so a user's messages are committed
                // in dispatch order.
                if let Some(chat) = &chat
                    && chat.admit(&message) == Admission::Busy
                {
                    let chat = chat.clone();
                    tokio::spawn(async move {
                        chat.notify_busy(&message).await;
                    });
                }
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    tracing::info!("shutting down...");
    refresh_task.abort();
    if let Err(error) = messaging.shutdown().await {
        tracing::warn!(%error, "failed to shut down messaging adapter");
    }

    tracing::info!("steward stopped");
    Ok(())
}
