//! Latest upstream release, cached and refreshed in the background.
//!
//! The refresh task is the only writer. Readers call [`ReleaseCache::latest`],
//! which never touches the network and never blocks.

use crate::error::FetchError;
use arc_swap::ArcSwapOption;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// The subset of a GitHub release Steward cares about.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseMetadata {
    pub tag_name: String,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

/// Source of the latest release.
#[async_trait::async_trait]
pub trait ReleaseFeed: Send + Sync {
    async fn latest(&self) -> Result<ReleaseMetadata, FetchError>;
}

/// GitHub "latest release" endpoint.
#[derive(Debug, Clone)]
pub struct GithubReleaseFeed {
    http: reqwest::Client,
    url: String,
}

impl GithubReleaseFeed {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait::async_trait]
impl ReleaseFeed for GithubReleaseFeed {
    async fn latest(&self) -> Result<ReleaseMetadata, FetchError> {
        let failure = |message: String| FetchError::Failure {
            url: self.url.clone(),
            message,
        };

        let response = self
            .http
            .get(&self.url)
            .header("accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|error| failure(error.to_string()))?;

        crate::fetch::check_status(&self.url, response.status())?;

        response
            .json::<ReleaseMetadata>()
            .await
            .map_err(|error| failure(format!("invalid release payload: {error}")))
    }
}

/// Shared read-mostly cache of the latest release.
#[derive(Debug, Clone, Default)]
pub struct ReleaseCache {
    current: Arc<ArcSwapOption<ReleaseMetadata>>,
}

impl ReleaseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache pre-populated with a known release.
    pub fn with_release(release: ReleaseMetadata) -> Self {
        let cache = Self::new();
        cache.store(release);
        cache
    }

    /// Last successfully fetched release, if any fetch has succeeded yet.
    pub fn latest(&self) -> Option<Arc<ReleaseMetadata>> {
        self.current.load_full()
    }

    pub fn store(&self, release: ReleaseMetadata) {
        self.current.store(Some(Arc::new(release)));
    }

    /// Fetch once. On failure the previous value is kept.
    pub async fn refresh(&self, feed: &dyn ReleaseFeed) -> Result<(), FetchError> {
        let release = feed.latest().await?;
        let changed = self
            .latest()
            .is_none_or(|previous| previous.tag_name != release.tag_name);
        if changed {
            tracing::info!(tag = %release.tag_name, "latest release updated");
        }
        self.store(release);
        Ok(())
    }

    /// Refresh immediately, then every `interval`, until the handle is aborted.
    pub fn spawn_refresh(
        &self,
        feed: Arc<dyn ReleaseFeed>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(error) = cache.refresh(feed.as_ref()).await {
                    tracing::warn!(%error, "failed to refresh latest release");
                }
            }
        })
    }
}
