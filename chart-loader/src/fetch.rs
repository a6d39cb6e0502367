//! Retrieval of bundle documents over HTTP or from the local filesystem.

use std::future::Future;

use chart_core::ChartError;

use crate::discovery;

/// Source of bundle documents.
///
/// `fetch` returns the raw text at a location. `list` enumerates the JSON
/// documents under a directory-like location and returns an empty list
/// when nothing can be discovered.
pub trait Fetch: Send + Sync + 'static {
    fn fetch(&self, location: &str) -> impl Future<Output = Result<String, ChartError>> + Send;

    fn list(&self, location: &str) -> impl Future<Output = Vec<String>> + Send;
}

/// HTTP(S) through `reqwest`, everything else through `tokio::fs`.
#[derive(Debug, Clone, Default)]
pub struct SourceFetcher {
    client: reqwest::Client,
}

impl SourceFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get(&self, location: &str) -> Result<String, ChartError> {
        let response = self
            .client
            .get(location)
            .send()
            .await
            .map_err(|err| ChartError::retrieval(location, err))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %location, status = %status, "bundle request failed");
            return Err(ChartError::retrieval(location, format!("HTTP status {status}")));
        }

        response
            .text()
            .await
            .map_err(|err| ChartError::retrieval(location, err))
    }
}

impl Fetch for SourceFetcher {
    fn fetch(&self, location: &str) -> impl Future<Output = Result<String, ChartError>> + Send {
        async move {
            if is_remote(location) {
                self.get(location).await
            } else {
                tokio::fs::read_to_string(location)
                    .await
                    .map_err(|err| ChartError::retrieval(location, err))
            }
        }
    }

    fn list(&self, location: &str) -> impl Future<Output = Vec<String>> + Send {
        async move {
            if !is_remote(location) {
                return discovery::json_files(location).await;
            }

            match self.get(location).await {
                Ok(listing) => discovery::json_links(location, &listing),
                Err(err) => {
                    tracing::debug!(url = %location, error = %err, "directory listing unavailable");
                    Vec::new()
                }
            }
        }
    }
}

pub fn is_remote(location: &str) -> bool {
    let lower = location.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
