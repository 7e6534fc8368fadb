//! Raw content retrieval over HTTP.

use crate::error::FetchError;
use reqwest::StatusCode;

/// Retrieves raw content by URL.
#[async_trait::async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch a URL as text. A 404 is reported as [`FetchError::NotFound`].
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;

    /// Fetch a URL as raw bytes.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Map a response status onto the fetch error taxonomy.
pub fn check_status(url: &str, status: StatusCode) -> Result<(), FetchError> {
    if status == StatusCode::NOT_FOUND {
        return Err(FetchError::NotFound {
            url: url.to_string(),
        });
    }

    if !status.is_success() {
        return Err(FetchError::Failure {
            url: url.to_string(),
            message: format!("unexpected status {status}"),
        });
    }

    Ok(())
}

/// [`ContentFetcher`] backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|error| failure(url, error))?;

        check_status(url, response.status())?;
        Ok(response)
    }
}

#[async_trait::async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.get(url).await?;
        response.text().await.map_err(|error| failure(url, error))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.get(url).await?;
        let bytes = response.bytes().await.map_err(|error| failure(url, error))?;
        Ok(bytes.to_vec())
    }
}

fn failure(url: &str, error: reqwest::Error) -> FetchError {
    FetchError::Failure {
        url: url.to_string(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_distinguished() {
        let error = check_status("https://pastebin.com/raw/abc123", StatusCode::NOT_FOUND)
            .expect_err("404 must fail");

        assert!(error.is_not_found());
        assert!(error.to_string().contains("https://pastebin.com/raw/abc123"));
    }

    #[test]
    fn other_errors_are_generic_failures() {
        for status in [StatusCode::FORBIDDEN, StatusCode::INTERNAL_SERVER_ERROR, StatusCode::GONE] {
            let error = check_status("https://hastebin.com/raw/x", status)
                .expect_err("non-success must fail");
            assert!(!error.is_not_found(), "{status} should not be treated as not found");
        }
    }

    #[test]
    fn success_passes() {
        check_status("https://bytebin.lucko.me/x", StatusCode::OK).expect("200 is fine");
    }
}
