use std::future::Future;

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    record::DocumentRecord,
};

/// The remote source of truth for the document set.
///
/// The version is an opaque marker compared for equality only.
pub trait DocumentProvider: Send + Sync {
    fn fetch_version(&self) -> impl Future<Output = Result<u64>> + Send;

    fn fetch_documents(
        &self,
    ) -> impl Future<Output = Result<Vec<DocumentRecord>>> + Send;
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: u64,
}

#[derive(Debug, Deserialize)]
struct DocumentsResponse {
    documents: Vec<DocumentRecord>,
}

/// Provider backed by two JSON endpoints:
/// `GET version_url -> {"version": n}` and
/// `GET documents_url -> {"documents": [...]}`.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: reqwest::Client,
    version_url: String,
    documents_url: String,
}

impl HttpProvider {
    pub fn new(
        version_url: impl Into<String>,
        documents_url: impl Into<String>,
    ) -> Result<Self> {
        let version_url = version_url.into();
        let documents_url = documents_url.into();
        for url in [&version_url, &documents_url] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::Config(format!(
                    "endpoint must be an http(s) URL: {url}"
                )));
            }
        }

        Ok(Self {
            client: reqwest::Client::new(),
            version_url,
            documents_url,
        })
    }

    pub fn version_url(&self) -> &str {
        &self.version_url
    }

    pub fn documents_url(&self) -> &str {
        &self.documents_url
    }
}

impl DocumentProvider for HttpProvider {
    async fn fetch_version(&self) -> Result<u64> {
        let response: VersionResponse = self
            .client
            .get(&self.version_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.version)
    }

    async fn fetch_documents(&self) -> Result<Vec<DocumentRecord>> {
        let response: DocumentsResponse = self
            .client
            .get(&self.documents_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        tracing::debug!(
            count = response.documents.len(),
            url = %self.documents_url,
            "fetched remote documents"
        );
        Ok(response.documents)
    }
}
