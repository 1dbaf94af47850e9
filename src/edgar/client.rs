// src/edgar/client.rs
use std::future::Future;
use std::time::Duration;

use reqwest::{header, StatusCode};

use crate::utils::error::EdgarError;

use super::html;
use super::urls;

// SEC asks for 10 requests/second max. Document fetches get a longer
// timeout than index pages since filings can run to tens of megabytes.
const DOCUMENT_TIMEOUT: Duration = Duration::from_secs(25);
const INDEX_TIMEOUT: Duration = Duration::from_secs(15);

/// Creates a reqwest client configured for EDGAR interaction. The SEC
/// rejects anonymous clients, so the caller must supply a descriptive
/// User-Agent ("Name email@domain.com").
pub fn build_edgar_client(user_agent: &str) -> Result<reqwest::Client, EdgarError> {
    Ok(reqwest::Client::builder()
        .user_agent(user_agent)
        .build()?)
}

/// One fetch attempt's outcome. Failures are carried as a status string,
/// never as an error: individual rows must not abort a batch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub url: Option<String>,
    pub content: Option<String>,
    pub status: String,
}

impl FetchOutcome {
    fn failure(url: Option<String>, status: impl Into<String>) -> Self {
        Self {
            url,
            content: None,
            status: status.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.content.is_some()
    }
}

/// The seam between the scrape loop and the network. The loop only ever
/// sees `FetchOutcome`s, so tests can drive it with a deterministic stub.
pub trait FetchFilings {
    fn fetch(&self, filename: &str) -> impl Future<Output = FetchOutcome>;
}

/// Production fetcher resolving index Filenames against www.sec.gov.
pub struct EdgarFetcher {
    http: reqwest::Client,
}

impl EdgarFetcher {
    pub fn new(user_agent: &str) -> Result<Self, EdgarError> {
        Ok(Self {
            http: build_edgar_client(user_agent)?,
        })
    }

    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, EdgarError> {
        let response = self
            .http
            .get(url)
            // SEC serves various content types; filings are usually text/html
            .header(header::ACCEPT, "application/xml,text/html,text/plain,*/*")
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("HTTP error status: {} for URL: {}", status, url);
            if status == StatusCode::FORBIDDEN {
                tracing::warn!("Received 403 Forbidden - check User-Agent and rate limits.");
                return Err(EdgarError::RateLimited);
            }
            if status == StatusCode::NOT_FOUND {
                return Err(EdgarError::NotFound(url.to_string()));
            }
            return Err(EdgarError::Http(status));
        }

        Ok(response.text().await?)
    }

    /// Fetches a page returning the status code alongside whatever body
    /// arrived; only transport-level failures surface as errors.
    pub async fn get_page(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<(StatusCode, String), EdgarError> {
        let response = self.http.get(url).timeout(timeout).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Ok((status, body))
    }

    async fn fetch_inner(&self, filename: &str) -> FetchOutcome {
        let filename = filename.trim().replace(' ', "");
        if filename.is_empty() {
            return FetchOutcome::failure(None, "Missing or invalid Filename");
        }

        // Direct-document layout: the Filename is itself the document.
        if urls::is_direct_document(&filename) {
            let filing_url = urls::direct_document_url(&filename);
            return match self.get_text(&filing_url, DOCUMENT_TIMEOUT).await {
                Ok(text) => FetchOutcome {
                    url: Some(filing_url),
                    content: Some(text),
                    status: "Success (direct)".to_string(),
                },
                Err(e) => FetchOutcome::failure(
                    Some(filing_url),
                    format!("Filing fetch failed: {e}"),
                ),
            };
        }

        // Accession-folder layout: resolve the document via the folder's
        // index page.
        let Some(index_url) = urls::accession_index_url(&filename) else {
            return FetchOutcome::failure(None, format!("Invalid path: {filename}"));
        };

        let index_html = match self.get_text(&index_url, INDEX_TIMEOUT).await {
            Ok(html) => html,
            Err(e) => {
                return FetchOutcome::failure(
                    Some(index_url),
                    format!("Index fetch failed: {e}"),
                )
            }
        };

        let filing_url = match html::primary_document_link(&index_html) {
            Ok(url) => url,
            Err(e) => return FetchOutcome::failure(Some(index_url), e.to_string()),
        };

        match self.get_text(&filing_url, DOCUMENT_TIMEOUT).await {
            Ok(text) => FetchOutcome {
                url: Some(filing_url),
                content: Some(text),
                status: "Success (index)".to_string(),
            },
            Err(e) => FetchOutcome::failure(
                Some(filing_url),
                format!("Filing fetch failed: {e}"),
            ),
        }
    }
}

impl FetchFilings for EdgarFetcher {
    async fn fetch(&self, filename: &str) -> FetchOutcome {
        self.fetch_inner(filename).await
    }
}
