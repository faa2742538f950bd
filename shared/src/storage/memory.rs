//! In-memory store implementation for development and testing.
//!
//! Emulates the backing store's observable behavior closely enough for the
//! synchronizer's drift checks to round-trip: stored template settings are
//! nested under a `settings.index` block and the numeric shard/replica
//! settings are canonicalized to strings, exactly as the real store does.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::{json, Map, Value};

use super::{pattern_matches, StoreClient, StoreError};

/// Index settings the store canonicalizes to strings on write.
const STRING_COERCED_SETTINGS: [&str; 2] = ["number_of_shards", "number_of_replicas"];

/// In-memory store client.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    templates: RwLock<Vec<(String, Value)>>,
    documents: RwLock<HashMap<String, Vec<(String, Value)>>>,
    next_id: AtomicU64,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory store wrapped in an Arc.
    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns the names of all registered templates, in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock is poisoned.
    pub fn template_names(&self) -> Result<Vec<String>, StoreError> {
        let templates = self.templates.read().map_err(|_| StoreError::Lock)?;
        Ok(templates.iter().map(|(name, _)| name.clone()).collect())
    }

    /// Returns the documents stored in indices matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock is poisoned.
    pub fn documents_in(&self, pattern: &str) -> Result<Vec<Value>, StoreError> {
        let documents = self.documents.read().map_err(|_| StoreError::Lock)?;
        let mut result = Vec::new();
        for (index, docs) in documents.iter() {
            if pattern_matches(pattern, index) {
                result.extend(docs.iter().map(|(_, doc)| doc.clone()));
            }
        }
        Ok(result)
    }

    /// Removes all templates and documents.
    ///
    /// # Errors
    ///
    /// Returns an error if an internal lock is poisoned.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.templates.write().map_err(|_| StoreError::Lock)?.clear();
        self.documents.write().map_err(|_| StoreError::Lock)?.clear();
        Ok(())
    }

    /// Rewrites a template descriptor the way the store persists it:
    /// settings move under a `settings.index` block and shard/replica
    /// counts become strings.
    fn canonicalize(descriptor: &Value) -> Value {
        let mut stored = Map::new();
        if let Some(patterns) = descriptor.get("index_patterns") {
            stored.insert("index_patterns".to_string(), patterns.clone());
        }
        if let Some(mappings) = descriptor.get("mappings") {
            stored.insert("mappings".to_string(), mappings.clone());
        }
        if let Some(Value::Object(settings)) = descriptor.get("settings") {
            let mut index_settings = Map::new();
            for (key, value) in settings {
                let value = if STRING_COERCED_SETTINGS.contains(&key.as_str()) {
                    coerce_to_string(value)
                } else {
                    value.clone()
                };
                index_settings.insert(key.clone(), value);
            }
            stored.insert("settings".to_string(), json!({ "index": index_settings }));
        }
        Value::Object(stored)
    }
}

fn coerce_to_string(value: &Value) -> Value {
    match value {
        Value::Number(n) => Value::String(n.to_string()),
        other => other.clone(),
    }
}

impl StoreClient for InMemoryStore {
    fn get_template(&self, name: &str) -> Result<Value, StoreError> {
        let templates = self.templates.read().map_err(|_| StoreError::Lock)?;
        templates
            .iter()
            .find(|(template_name, _)| template_name == name)
            .map(|(_, descriptor)| descriptor.clone())
            .ok_or_else(|| StoreError::TemplateNotFound {
                name: name.to_string(),
            })
    }

    fn put_template(&self, name: &str, descriptor: &Value) -> Result<(), StoreError> {
        let stored = Self::canonicalize(descriptor);
        let mut templates = self.templates.write().map_err(|_| StoreError::Lock)?;
        if let Some(entry) = templates
            .iter_mut()
            .find(|(template_name, _)| template_name == name)
        {
            entry.1 = stored;
        } else {
            templates.push((name.to_string(), stored));
        }
        Ok(())
    }

    fn delete_template(&self, pattern: &str) -> Result<(), StoreError> {
        let mut templates = self.templates.write().map_err(|_| StoreError::Lock)?;
        let before = templates.len();
        templates.retain(|(name, _)| !pattern_matches(pattern, name));
        if templates.len() == before {
            return Err(StoreError::TemplateNotFound {
                name: pattern.to_string(),
            });
        }
        Ok(())
    }

    fn get_mapping(&self, index: &str) -> Result<Value, StoreError> {
        let templates = self.templates.read().map_err(|_| StoreError::Lock)?;
        for (_, descriptor) in templates.iter() {
            let matches = descriptor
                .get("index_patterns")
                .and_then(Value::as_array)
                .is_some_and(|patterns| {
                    patterns
                        .iter()
                        .filter_map(Value::as_str)
                        .any(|pattern| pattern_matches(pattern, index))
                });
            if matches {
                return Ok(descriptor.get("mappings").cloned().unwrap_or(Value::Null));
            }
        }
        Err(StoreError::IndexNotFound {
            index: index.to_string(),
        })
    }

    fn save_document(&self, index: &str, document: &Value) -> Result<String, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = id.to_string();
        let mut documents = self.documents.write().map_err(|_| StoreError::Lock)?;
        documents
            .entry(index.to_string())
            .or_default()
            .push((id.clone(), document.clone()));
        Ok(id)
    }

    fn get_document(&self, index: &str, id: &str) -> Result<Value, StoreError> {
        let documents = self.documents.read().map_err(|_| StoreError::Lock)?;
        for (index_name, docs) in documents.iter() {
            if !pattern_matches(index, index_name) {
                continue;
            }
            if let Some((_, doc)) = docs.iter().find(|(doc_id, _)| doc_id == id) {
                return Ok(doc.clone());
            }
        }
        Err(StoreError::DocumentNotFound {
            id: id.to_string(),
            index: index.to_string(),
        })
    }

    fn delete_index(&self, pattern: &str) -> Result<(), StoreError> {
        let mut documents = self.documents.write().map_err(|_| StoreError::Lock)?;
        documents.retain(|index, _| !pattern_matches(pattern, index));
        Ok(())
    }
}
