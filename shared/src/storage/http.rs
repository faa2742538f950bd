//! REST-backed store client.
//!
//! Talks to an Elasticsearch-compatible HTTP API with blocking requests.
//! Single-shot: transport failures surface as [`StoreError::Unavailable`]
//! and are never retried here; retry policy belongs to the caller.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use super::{StoreClient, StoreError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Store client backed by the store's REST API.
#[derive(Debug)]
pub struct HttpStore {
    base_url: String,
    client: Client,
}

impl HttpStore {
    /// Creates a client for the store at `base_url` (e.g.
    /// `http://localhost:9200`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the underlying HTTP client
    /// cannot be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { base_url, client })
    }

    /// Returns the base URL this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response, StoreError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%method, %url, "store request");
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        request
            .send()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn read_json(response: Response) -> Result<Value, StoreError> {
        response
            .json()
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))
    }

    fn expect_success(response: Response, context: &str) -> Result<Value, StoreError> {
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::InvalidResponse(format!(
                "{context}: HTTP {status}"
            )));
        }
        Self::read_json(response)
    }
}

impl StoreClient for HttpStore {
    fn get_template(&self, name: &str) -> Result<Value, StoreError> {
        let response = self.request(Method::GET, &format!("/_template/{name}"), None)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::TemplateNotFound {
                name: name.to_string(),
            });
        }
        let body = Self::expect_success(response, "get template")?;
        // The store keys the response body by template name.
        body.get(name)
            .cloned()
            .ok_or_else(|| StoreError::InvalidResponse(format!("template '{name}' missing from response")))
    }

    fn put_template(&self, name: &str, descriptor: &Value) -> Result<(), StoreError> {
        let response = self.request(
            Method::PUT,
            &format!("/_template/{name}"),
            Some(descriptor),
        )?;
        Self::expect_success(response, "put template")?;
        Ok(())
    }

    fn delete_template(&self, pattern: &str) -> Result<(), StoreError> {
        let response = self.request(Method::DELETE, &format!("/_template/{pattern}"), None)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::TemplateNotFound {
                name: pattern.to_string(),
            });
        }
        Self::expect_success(response, "delete template")?;
        Ok(())
    }

    fn get_mapping(&self, index: &str) -> Result<Value, StoreError> {
        let response = self.request(Method::GET, &format!("/{index}/_mapping"), None)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::IndexNotFound {
                index: index.to_string(),
            });
        }
        let body = Self::expect_success(response, "get mapping")?;
        // Response is keyed by concrete index name; take the first entry.
        body.as_object()
            .and_then(|entries| entries.values().next())
            .and_then(|entry| entry.get("mappings"))
            .cloned()
            .ok_or_else(|| StoreError::InvalidResponse("mapping missing from response".to_string()))
    }

    fn save_document(&self, index: &str, document: &Value) -> Result<String, StoreError> {
        let response = self.request(Method::POST, &format!("/{index}/_doc"), Some(document))?;
        let body = Self::expect_success(response, "save document")?;
        body.get("_id")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| StoreError::InvalidResponse("_id missing from response".to_string()))
    }

    fn get_document(&self, index: &str, id: &str) -> Result<Value, StoreError> {
        // A search by id works across pattern-scoped index families, unlike
        // a direct document GET.
        let query = json!({ "query": { "ids": { "values": [id] } }, "size": 1 });
        let response = self.request(Method::POST, &format!("/{index}/_search"), Some(&query))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::IndexNotFound {
                index: index.to_string(),
            });
        }
        let body = Self::expect_success(response, "get document")?;
        body.pointer("/hits/hits/0/_source")
            .cloned()
            .ok_or_else(|| StoreError::DocumentNotFound {
                id: id.to_string(),
                index: index.to_string(),
            })
    }

    fn delete_index(&self, pattern: &str) -> Result<(), StoreError> {
        let response = self.request(Method::DELETE, &format!("/{pattern}"), None)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::IndexNotFound {
                index: pattern.to_string(),
            });
        }
        Self::expect_success(response, "delete index")?;
        Ok(())
    }
}
