//! Re-upload of text attachments to a paste service.

use crate::error::FetchError;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

/// Declared content types that are re-uploaded.
pub const UPLOADABLE_CONTENT_TYPES: &[&str] = &[
    "application/json",
    "application/yaml",
    "text/xml",
    "text/plain",
];

/// Whether an attachment with this declared content type is re-uploaded.
pub fn is_uploadable(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|content_type| {
        let content_type = content_type.to_ascii_lowercase();
        UPLOADABLE_CONTENT_TYPES
            .iter()
            .any(|candidate| content_type.contains(candidate))
    })
}

static ROOT_TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<([A-Za-z_][\w.:-]*)[\s/>]").expect("hardcoded root tag regex")
});

/// Content type the paste service should highlight the text as, when it can
/// be told from the text itself.
///
/// JSON is fully parsed. XML is only checked for shape: an `<?xml` prolog, or
/// a root element that is closed by a matching end tag or is self-closing.
/// Nested tags are not validated.
pub fn detect_text_format(text: &str) -> Option<&'static str> {
    let text = text.trim();

    if text.starts_with('{')
        && text.ends_with('}')
        && serde_json::from_str::<serde_json::Value>(text).is_ok()
    {
        return Some("text/json");
    }

    if looks_like_xml(text) {
        return Some("text/xml");
    }

    None
}

fn looks_like_xml(text: &str) -> bool {
    if !text.ends_with('>') {
        return false;
    }
    if text.starts_with("<?xml") {
        return true;
    }

    let Some(root) = ROOT_TAG_REGEX.captures(text).and_then(|captures| captures.get(1)) else {
        return false;
    };
    let closing = format!("</{}>", root.as_str());
    text.ends_with(&closing) || (text.ends_with("/>") && !text[1..].contains('<'))
}

/// A paste site attachments are moved to.
#[async_trait::async_trait]
pub trait PasteService: Send + Sync {
    /// Upload `content` and return the public URL of the new paste.
    async fn upload(&self, content: String, content_type: &str) -> Result<String, FetchError>;

    /// Public site users are pointed to.
    fn website(&self) -> &str;
}

/// Reply sent after a successful re-upload.
pub fn uploaded_notice(website: &str, filename: &str, paste_url: &str) -> String {
    format!(
        "Please use <{website}> to send files in the future. I have automatically uploaded \
         `{filename}` for you: {paste_url}"
    )
}

/// Reply sent when a re-upload failed.
pub fn failure_notice(website: &str) -> String {
    format!("Your file could not be automatically uploaded. Please use {website} to share files.")
}

#[derive(Debug, Deserialize)]
struct PasteCreated {
    key: String,
}

/// pastes.dev style API: `POST {api}/post` with the raw body, answers `{"key": ...}`.
#[derive(Debug, Clone)]
pub struct PasteUploader {
    http: reqwest::Client,
    api: String,
    website: String,
}

impl PasteUploader {
    pub fn new(http: reqwest::Client, api: impl Into<String>, website: impl Into<String>) -> Self {
        Self {
            http,
            api: api.into().trim_end_matches('/').to_string(),
            website: website.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn paste_url(&self, key: &str) -> String {
        format!("{}/{key}", self.website)
    }
}

#[async_trait::async_trait]
impl PasteService for PasteUploader {
    async fn upload(&self, content: String, content_type: &str) -> Result<String, FetchError> {
        let url = format!("{}/post", self.api);
        let failure = |message: String| FetchError::Failure {
            url: url.clone(),
            message,
        };

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(content)
            .send()
            .await
            .map_err(|error| failure(error.to_string()))?;

        crate::fetch::check_status(&url, response.status())?;

        let created: PasteCreated = response
            .json()
            .await
            .map_err(|error| failure(format!("invalid paste response: {error}")))?;

        Ok(self.paste_url(&created.key))
    }

    fn website(&self) -> &str {
        &self.website
    }
}
