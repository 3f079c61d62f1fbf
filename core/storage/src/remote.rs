//! Remote document store collaborator.
//!
//! The cloud side is a get/put-by-key document store with
//! last-writer-wins semantics per document key (supplied externally).
//! Field-level merge lets multiple local profiles share one remote
//! document without clobbering each other.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use vaultx_common::{Error, Result};

/// Get/merge access to remote JSON documents.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch a document by key. `None` when the document does not exist.
    async fn fetch_document(&self, key: &str) -> Result<Option<Map<String, Value>>>;

    /// Upsert a single field of a document, preserving sibling fields.
    async fn merge_field(&self, key: &str, field: &str, value: Value) -> Result<()>;
}

/// HTTP-backed remote store speaking plain JSON documents.
///
/// `GET {base}/{key}` returns the document; `PATCH {base}/{key}` with a
/// partial object merges fields server-side.
pub struct HttpRemote {
    client: reqwest::Client,
    base: Url,
}

impl HttpRemote {
    /// Create a client for the given document store root URL.
    pub fn new(base: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
        }
    }

    fn document_url(&self, key: &str) -> Result<Url> {
        self.base
            .join(key)
            .map_err(|e| Error::InvalidInput(format!("Invalid document key: {}", e)))
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn fetch_document(&self, key: &str) -> Result<Option<Map<String, Value>>> {
        let url = self.document_url(key)?;
        debug!(%url, "Fetching remote document");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("Remote fetch failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::Storage(format!(
                "Remote fetch returned {}",
                response.status()
            )));
        }

        let document = response
            .json::<Map<String, Value>>()
            .await
            .map_err(|e| Error::Serialization(format!("Remote document not JSON: {}", e)))?;
        Ok(Some(document))
    }

    async fn merge_field(&self, key: &str, field: &str, value: Value) -> Result<()> {
        let url = self.document_url(key)?;
        debug!(%url, field, "Merging remote document field");

        let mut patch = Map::new();
        patch.insert(field.to_string(), value);

        let response = self
            .client
            .patch(url)
            .json(&patch)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("Remote merge failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Storage(format!(
                "Remote merge returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
