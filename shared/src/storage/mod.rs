//! Store clients for the backing document store.
//!
//! The `StoreClient` trait abstracts the search/analytics store's HTTP API
//! (index templates, per-index mappings, and document writes), allowing
//! different implementations (in-memory, REST-backed, etc.). All calls are
//! blocking; callers wanting async wrap each call as its own suspension
//! point.

pub mod http;
pub mod memory;

pub use http::HttpStore;
pub use memory::InMemoryStore;

use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No index template is registered under the given name.
    #[error("Index template '{name}' does not exist")]
    TemplateNotFound {
        /// The template name that was requested.
        name: String,
    },

    /// No index matches the given name or pattern.
    #[error("Index '{index}' does not exist")]
    IndexNotFound {
        /// The index name or pattern that was requested.
        index: String,
    },

    /// No document with the given id exists in the index.
    #[error("Document '{id}' does not exist in index '{index}'")]
    DocumentNotFound {
        /// The document id that was requested.
        id: String,
        /// The index name or pattern that was searched.
        index: String,
    },

    /// No connection is registered under the given name.
    #[error("Unknown store connection '{name}'")]
    UnknownConnection {
        /// The connection name that was requested.
        name: String,
    },

    /// The store could not be reached. Propagated unchanged, never retried.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store returned a response the client could not interpret.
    #[error("Unexpected store response: {0}")]
    InvalidResponse(String),

    /// Failed to acquire a lock on an in-memory store.
    #[error("Failed to acquire lock on store")]
    Lock,
}

/// Blocking client for the backing document store.
///
/// Implementations must be thread-safe (Send + Sync). Template descriptors
/// and documents are exchanged as raw JSON values; the higher layers own
/// their shape.
pub trait StoreClient: Send + Sync {
    /// Fetches the index template registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TemplateNotFound`] if no such template exists,
    /// or [`StoreError::Unavailable`] if the store cannot be reached.
    fn get_template(&self, name: &str) -> Result<Value, StoreError>;

    /// Creates or overwrites the index template registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the descriptor or cannot be
    /// reached.
    fn put_template(&self, name: &str, descriptor: &Value) -> Result<(), StoreError>;

    /// Deletes index templates matching `pattern` (a name, optionally with a
    /// trailing `*` wildcard).
    ///
    /// # Errors
    ///
    /// Returns an error if no template matches or the store cannot be
    /// reached.
    fn delete_template(&self, pattern: &str) -> Result<(), StoreError>;

    /// Fetches the mapping currently applied to `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the index does not exist or the store cannot be
    /// reached.
    fn get_mapping(&self, index: &str) -> Result<Value, StoreError>;

    /// Saves a document into `index`, returning the store-assigned id.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is rejected or the store cannot be
    /// reached.
    fn save_document(&self, index: &str, document: &Value) -> Result<String, StoreError>;

    /// Fetches the document with the given id from `index` (which may be a
    /// pattern spanning several dated indices).
    ///
    /// # Errors
    ///
    /// Returns an error if no such document exists or the store cannot be
    /// reached.
    fn get_document(&self, index: &str, id: &str) -> Result<Value, StoreError>;

    /// Deletes all indices matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn delete_index(&self, pattern: &str) -> Result<(), StoreError>;
}

/// Returns true if `name` matches `pattern`, where `*` matches any run of
/// characters. Used by the in-memory store to emulate the store's glob
/// semantics for index and template patterns.
#[must_use]
pub fn pattern_matches(pattern: &str, name: &str) -> bool {
    let (pattern, name) = (pattern.as_bytes(), name.as_bytes());
    let (mut p, mut n) = (0, 0);
    // Position to resume from when a literal run after a `*` fails.
    let mut star: Option<(usize, usize)> = None;
    while n < name.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, n));
            p += 1;
        } else if p < pattern.len() && pattern[p] == name[n] {
            p += 1;
            n += 1;
        } else if let Some((star_p, star_n)) = star {
            p = star_p + 1;
            n = star_n + 1;
            star = Some((star_p, star_n + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}
