//! Triage pipeline: canned hints, paste links, screenshots and text attachments.
//!
//! Every guild message goes through four independent stages. A failure in
//! one stage is logged and never stops the others.

pub mod classifier;
pub mod dump;
pub mod hints;
pub mod links;
pub mod signatures;
pub mod upload;
pub mod version;

pub use classifier::{Classification, Classifier};
pub use hints::HintTable;
pub use links::{ResolvedLink, RuleTable};
pub use upload::{PasteService, PasteUploader};

use crate::fetch::ContentFetcher;
use crate::messaging::MessagingDyn;
use crate::ocr::{self, OcrEngine};
use crate::{InboundMessage, InfoBlock, OutboundResponse, Severity};
use std::sync::Arc;

/// Reaction added after the screenshots of a message were read.
pub const SCREENSHOT_REACTION: &str = "👀";

/// Collaborators of the triage pipeline.
pub struct TriageDeps {
    pub hints: HintTable,
    pub rules: RuleTable,
    pub classifier: Classifier,
    pub fetcher: Arc<dyn ContentFetcher>,
    /// `None` disables screenshot reading.
    pub ocr: Option<Arc<dyn OcrEngine>>,
    /// `None` disables attachment re-uploads.
    pub uploader: Option<Arc<dyn PasteService>>,
    pub messaging: Arc<dyn MessagingDyn>,
}

pub struct Triage {
    deps: TriageDeps,
}

impl Triage {
    pub fn new(deps: TriageDeps) -> Self {
        Self { deps }
    }

    /// Run every stage for one inbound message.
    pub async fn handle_message(&self, message: &InboundMessage) {
        if !message.is_processable() {
            return;
        }

        tokio::join!(
            self.send_hints(message),
            self.check_links(message),
            self.check_screenshots(message),
            self.upload_attachments(message),
        );
    }

    async fn send_hints(&self, message: &InboundMessage) {
        for response in self.deps.hints.check(message) {
            self.send(message, response).await;
        }
    }

    /// Resolve the first paste link and diagnose its content.
    async fn check_links(&self, message: &InboundMessage) {
        let Some(link) = self
            .deps
            .rules
            .resolve(&message.text, message.embed_fields.as_slice())
        else {
            return;
        };

        let attribution = format!("{} | Sent by {}", link.matched, message.sender_name);
        tracing::info!(url = %link.raw_url, message_id = %message.id, "fetching paste");

        match self.deps.fetcher.fetch_text(&link.raw_url).await {
            Ok(text) if text.trim().is_empty() => {
                tracing::debug!(url = %link.raw_url, "paste is empty");
            }
            Ok(text) => self.respond_to_text(message, &text, &attribution).await,
            Err(error) if error.is_not_found() => {
                let block = InfoBlock::new(
                    Severity::Error,
                    "Invalid Paste!",
                    "The paste link you sent in is invalid or expired, please check the link or \
                     paste a new one.",
                )
                .with_footer(attribution);
                self.send(message, blocks_response(None, vec![block])).await;
            }
            Err(error) => {
                tracing::warn!(%error, url = %link.raw_url, "failed to fetch paste");
            }
        }
    }

    /// Read every screenshot in order, then acknowledge with a reaction.
    async fn check_screenshots(&self, message: &InboundMessage) {
        let Some(engine) = &self.deps.ocr else {
            return;
        };

        let screenshots: Vec<_> = message
            .attachments
            .iter()
            .filter(|attachment| ocr::is_ocr_candidate(attachment.content_type.as_deref()))
            .collect();
        if screenshots.is_empty() {
            return;
        }

        let attribution = format!("Sent by {}", message.sender_name);
        for attachment in screenshots {
            match engine.recognize(&attachment.url).await {
                Ok(text) if text.trim().is_empty() => {}
                Ok(text) => self.respond_to_text(message, &text, &attribution).await,
                Err(error) => {
                    tracing::warn!(%error, filename = %attachment.filename, "OCR failed");
                }
            }
        }

        self.send(message, OutboundResponse::Reaction(SCREENSHOT_REACTION.into()))
            .await;
    }

    /// Move text attachments to the paste service.
    async fn upload_attachments(&self, message: &InboundMessage) {
        let Some(uploader) = &self.deps.uploader else {
            return;
        };

        for attachment in &message.attachments {
            if !upload::is_uploadable(attachment.content_type.as_deref()) {
                continue;
            }

            let result = async {
                let content = self.deps.fetcher.fetch_text(&attachment.url).await?;
                let content_type = upload::detect_text_format(&content)
                    .or(attachment.content_type.as_deref())
                    .unwrap_or("text/plain")
                    .to_string();
                uploader.upload(content, &content_type).await
            }
            .await;

            let reply = match result {
                Ok(paste_url) => {
                    tracing::info!(filename = %attachment.filename, %paste_url, "uploaded attachment");
                    upload::uploaded_notice(uploader.website(), &attachment.filename, &paste_url)
                }
                Err(error) => {
                    tracing::warn!(%error, filename = %attachment.filename, "failed to upload attachment");
                    upload::failure_notice(uploader.website())
                }
            };
            self.send(message, OutboundResponse::Text(reply)).await;
        }
    }

    /// Classify `text` and reply with one message per signature plus one dump summary.
    async fn respond_to_text(&self, message: &InboundMessage, text: &str, attribution: &str) {
        let Classification { signatures, dump } = self.deps.classifier.classify(text);

        for block in signatures {
            tracing::info!(title = %block.title, message_id = %message.id, "known error detected");
            let block = block.with_footer(attribution);
            self.send(message, blocks_response(None, vec![block])).await;
        }

        if let Some(report) = dump {
            let attachment = report.attachment();
            self.send(
                message,
                OutboundResponse::Blocks {
                    content: Some(format!("Found the following for: `{attribution}`")),
                    blocks: report.blocks,
                    attachment: Some(attachment),
                },
            )
            .await;
        }
    }

    async fn send(&self, message: &InboundMessage, response: OutboundResponse) {
        if let Err(error) = self.deps.messaging.respond(message, response).await {
            tracing::warn!(%error, message_id = %message.id, "failed to send triage reply");
        }
    }
}

fn blocks_response(content: Option<String>, blocks: Vec<InfoBlock>) -> OutboundResponse {
    OutboundResponse::Blocks {
        content,
        blocks,
        attachment: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, OcrError};
    use crate::messaging::traits::testing::RecordingMessaging;
    use crate::release::{ReleaseCache, ReleaseMetadata};
    use crate::testing::message;
    use crate::Attachment;
    use std::collections::HashMap;

    #[derive(Default)]
    struct StubFetcher {
        pages: HashMap<String, String>,
        failing: Vec<String>,
    }

    impl StubFetcher {
        fn with_page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.into(), body.into());
            self
        }

        fn with_failure(mut self, url: &str) -> Self {
            self.failing.push(url.into());
            self
        }
    }

    #[async_trait::async_trait]
    impl ContentFetcher for StubFetcher {
        async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
            if self.failing.iter().any(|failing| failing == url) {
                return Err(FetchError::Failure {
                    url: url.into(),
                    message: "connection reset".into(),
                });
            }
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::NotFound { url: url.into() })
        }

        async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.fetch_text(url).await.map(String::into_bytes)
        }
    }

    /// Records uploads; fails when built with `failing`.
    #[derive(Default)]
    struct StubPaste {
        failing: bool,
        uploads: std::sync::Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl PasteService for StubPaste {
        async fn upload(&self, content: String, content_type: &str) -> Result<String, FetchError> {
            if self.failing {
                return Err(FetchError::Failure {
                    url: "https://api.pastes.dev/post".into(),
                    message: "503".into(),
                });
            }
            self.uploads
                .lock()
                .expect("uploads lock")
                .push((content, content_type.to_string()));
            Ok("https://pastes.dev/aBcD".into())
        }

        fn website(&self) -> &str {
            "https://pastes.dev"
        }
    }

    struct StubOcr(&'static str);

    #[async_trait::async_trait]
    impl OcrEngine for StubOcr {
        async fn recognize(&self, _image_url: &str) -> Result<String, OcrError> {
            Ok(self.0.to_string())
        }
    }

    fn triage(
        fetcher: StubFetcher,
        ocr: Option<&'static str>,
    ) -> (Triage, Arc<RecordingMessaging>) {
        triage_with_uploads(fetcher, ocr, None)
    }

    fn triage_with_uploads(
        fetcher: StubFetcher,
        ocr: Option<&'static str>,
        uploader: Option<Arc<StubPaste>>,
    ) -> (Triage, Arc<RecordingMessaging>) {
        let messaging = Arc::new(RecordingMessaging::default());
        let release = ReleaseCache::with_release(ReleaseMetadata {
            tag_name: "15.0.0".into(),
            html_url: None,
            assets: Vec::new(),
        });
        let triage = Triage::new(TriageDeps {
            hints: HintTable::new(vec!["Staff".into()]),
            rules: RuleTable::builtin(),
            classifier: Classifier::builtin(release, "https://modrinth.com/plugin/skinsrestorer/version"),
            fetcher: Arc::new(fetcher),
            ocr: ocr.map(|text| Arc::new(StubOcr(text)) as Arc<dyn OcrEngine>),
            uploader: uploader.map(|uploader| uploader as Arc<dyn PasteService>),
            messaging: messaging.clone(),
        });
        (triage, messaging)
    }

    fn only_blocks(responses: &[(String, OutboundResponse)]) -> Vec<&InfoBlock> {
        responses
            .iter()
            .flat_map(|(_, response)| match response {
                OutboundResponse::Blocks { blocks, .. } => blocks.iter().collect(),
                _ => Vec::new(),
            })
            .collect()
    }

    #[tokio::test]
    async fn expired_paste_gets_invalid_paste_reply() {
        let (triage, messaging) = triage(StubFetcher::default(), None);
        let inbound = message("1", "42", "support", "look: https://pastebin.com/abc123");

        triage.handle_message(&inbound).await;

        let responses = messaging.responses();
        assert_eq!(responses.len(), 1);
        let blocks = only_blocks(&responses);
        assert_eq!(blocks[0].title, "Invalid Paste!");
        assert_eq!(blocks[0].severity, Severity::Error);
        assert_eq!(
            blocks[0].footer.as_deref(),
            Some("https://pastebin.com/abc123 | Sent by user-42")
        );
    }

    #[tokio::test]
    async fn paste_with_known_error_gets_signature_reply() {
        let fetcher = StubFetcher::default().with_page(
            "https://pastebin.com/raw/abc123",
            "[Server thread/ERROR]: NoMappingException: no mapping for 1.21.9",
        );
        let (triage, messaging) = triage(fetcher, None);
        let inbound = message("1", "42", "support", "https://pastebin.com/abc123");

        triage.handle_message(&inbound).await;

        let responses = messaging.responses();
        assert_eq!(responses.len(), 1);
        let blocks = only_blocks(&responses);
        assert_eq!(blocks[0].title, "Missing mapping in SkinsRestorer");
        assert_eq!(blocks[0].excerpt.as_deref(), Some("NoMappingException"));
        assert!(blocks[0].footer.as_deref().is_some_and(|footer| footer.ends_with("Sent by user-42")));
    }

    #[tokio::test]
    async fn dumped_paste_gets_summary_with_attachment() {
        let fetcher = StubFetcher::default().with_page(
            "https://bytebin.lucko.me/Xy12",
            r#"{"buildInfo": {"version": "14.2.0", "buildTime": "yesterday"}}"#,
        );
        let (triage, messaging) = triage(fetcher, None);
        let inbound = message("1", "42", "support", "dump: https://pastes.dev/Xy12");

        triage.handle_message(&inbound).await;

        let responses = messaging.responses();
        assert_eq!(responses.len(), 1);
        let OutboundResponse::Blocks {
            content,
            blocks,
            attachment,
        } = &responses[0].1
        else {
            panic!("expected a block response, got {:?}", responses[0].1);
        };
        assert_eq!(
            content.as_deref(),
            Some("Found the following for: `https://pastes.dev/Xy12 | Sent by user-42`")
        );
        assert_eq!(blocks.len(), 2);
        assert_eq!(attachment.as_ref().map(|file| file.filename.as_str()), Some("dump.json"));
    }

    #[tokio::test]
    async fn links_inside_embeds_are_checked() {
        let (triage, messaging) = triage(StubFetcher::default(), None);
        let mut inbound = message("1", "42", "support", "see embed");
        inbound.embed_fields = vec!["https://hastebin.com/qwerty.log".into()];

        triage.handle_message(&inbound).await;

        let blocks_sent = only_blocks(&messaging.responses()).len();
        assert_eq!(blocks_sent, 1);
    }

    #[tokio::test]
    async fn network_failures_are_silent() {
        let fetcher = StubFetcher::default().with_failure("https://pastebin.com/raw/abc123");
        let (triage, messaging) = triage(fetcher, None);

        triage
            .handle_message(&message("1", "42", "support", "https://pastebin.com/abc123"))
            .await;

        assert!(messaging.responses().is_empty());
    }

    #[tokio::test]
    async fn screenshots_are_read_and_acknowledged() {
        let (triage, messaging) = triage(
            StubFetcher::default(),
            Some("Caused by: SkinsRestorerAPI is not initialized yet"),
        );
        let mut inbound = message("7", "42", "support", "");
        inbound.attachments = vec![
            Attachment {
                filename: "error.png".into(),
                url: "https://cdn.example/error.png".into(),
                content_type: Some("image/png".into()),
                size_bytes: Some(2_048),
            },
            Attachment {
                filename: "notes.gif".into(),
                url: "https://cdn.example/notes.gif".into(),
                content_type: Some("image/gif".into()),
                size_bytes: None,
            },
        ];

        triage.handle_message(&inbound).await;

        let responses = messaging.responses();
        assert_eq!(responses.len(), 2);
        let blocks = only_blocks(&responses);
        assert_eq!(blocks[0].title, "SkinsRestorerAPI is not initialized yet");
        assert_eq!(blocks[0].footer.as_deref(), Some("Sent by user-42"));
        assert_eq!(responses[1].1, OutboundResponse::Reaction(SCREENSHOT_REACTION.into()));
    }

    #[tokio::test]
    async fn bot_and_direct_messages_are_ignored() {
        let (triage, messaging) = triage(StubFetcher::default(), None);

        let mut from_bot = message("1", "42", "support", "https://pastebin.com/abc123");
        from_bot.is_from_bot = true;
        let mut direct = message("2", "42", "support", "https://pastebin.com/abc123");
        direct.is_direct_message = true;

        triage.handle_message(&from_bot).await;
        triage.handle_message(&direct).await;

        assert!(messaging.responses().is_empty());
    }

    fn attachment(filename: &str, content_type: &str) -> Attachment {
        Attachment {
            filename: filename.into(),
            url: format!("https://cdn.example/{filename}"),
            content_type: Some(content_type.into()),
            size_bytes: Some(512),
        }
    }

    #[tokio::test]
    async fn text_attachments_are_reuploaded() {
        let fetcher = StubFetcher::default()
            .with_page("https://cdn.example/config.json", r#"{"debug": true}"#);
        let paste = Arc::new(StubPaste::default());
        let (triage, messaging) = triage_with_uploads(fetcher, None, Some(paste.clone()));
        let mut inbound = message("1", "42", "support", "");
        inbound.attachments = vec![attachment("config.json", "text/plain; charset=utf-8")];

        triage.handle_message(&inbound).await;

        let uploads = paste.uploads.lock().expect("uploads lock").clone();
        assert_eq!(
            uploads,
            vec![(r#"{"debug": true}"#.to_string(), "text/json".to_string())]
        );
        assert_eq!(
            messaging.texts(),
            vec![upload::uploaded_notice(
                "https://pastes.dev",
                "config.json",
                "https://pastes.dev/aBcD"
            )]
        );
    }

    #[tokio::test]
    async fn failed_uploads_point_at_the_paste_site() {
        let fetcher = StubFetcher::default().with_page("https://cdn.example/latest.log", "[12:00] INFO");
        let paste = Arc::new(StubPaste {
            failing: true,
            ..StubPaste::default()
        });
        let (triage, messaging) = triage_with_uploads(fetcher, None, Some(paste));
        let mut inbound = message("1", "42", "support", "");
        inbound.attachments = vec![attachment("latest.log", "text/plain")];

        triage.handle_message(&inbound).await;

        assert_eq!(messaging.texts(), vec![upload::failure_notice("https://pastes.dev")]);
    }

    #[tokio::test]
    async fn binary_attachments_are_not_uploaded() {
        let paste = Arc::new(StubPaste::default());
        let (triage, messaging) =
            triage_with_uploads(StubFetcher::default(), None, Some(paste.clone()));
        let mut inbound = message("1", "42", "support", "");
        inbound.attachments = vec![
            attachment("skin.png", "image/png"),
            attachment("plugin.jar", "application/java-archive"),
        ];

        triage.handle_message(&inbound).await;

        assert!(paste.uploads.lock().expect("uploads lock").is_empty());
        assert!(messaging.responses().is_empty());
    }

    #[tokio::test]
    async fn hints_are_sent_alongside_other_stages() {
        let (triage, messaging) = triage(StubFetcher::default(), None);

        triage
            .handle_message(&message("1", "42", "support", "skinrestorer: https://pastebin.com/abc123"))
            .await;

        let titles: Vec<_> = only_blocks(&messaging.responses())
            .iter()
            .map(|block| block.title.clone())
            .collect();
        assert_eq!(titles.len(), 2);
        assert!(titles.contains(&"It looks like you're trying to spell SkinsRestorer!".to_string()));
        assert!(titles.contains(&"Invalid Paste!".to_string()));
    }
}
