//! Index template construction and synchronization.
//!
//! An [`IndexTemplate`] is derived on demand from a metric type's resolved
//! fields and settings; it is never stored on our side, so construction is
//! a pure function of the type. The sync operations push the descriptor to
//! the store and detect drift between the declared schema and whatever the
//! store currently holds.

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::config::{get_connection, DEFAULT_CONNECTION};
use crate::models::MetricType;
use crate::signals::{TemplateEvent, POST_INDEX_TEMPLATE_CREATE, PRE_INDEX_TEMPLATE_CREATE};
use crate::storage::StoreError;

/// Index settings the store canonicalizes to strings, which we therefore
/// coerce before comparing.
const STRING_COERCED_SETTINGS: [&str; 2] = ["number_of_shards", "number_of_replicas"];

/// Errors raised by [`MetricType::check_index_template`].
///
/// These are per-item outcomes, not fatal conditions: batch tooling catches
/// them, reports per metric type, and keeps going.
#[derive(Debug, Error)]
pub enum CheckError {
    /// The store holds no template under the metric's template name.
    #[error("{template_name} does not exist for {metric_name}")]
    TemplateNotFound {
        /// The missing template name.
        template_name: String,
        /// Name of the metric type being checked.
        metric_name: String,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },

    /// The stored template differs from the declared schema.
    #[error("{template_name} is out of sync with {metric_name} ({out_of_sync})")]
    OutOfSync {
        /// The drifted template name.
        template_name: String,
        /// Name of the metric type being checked.
        metric_name: String,
        /// Comma-separated list of the drifted aspects.
        out_of_sync: String,
        /// Whether the stored mappings match the declared fields.
        mappings_in_sync: bool,
        /// Whether the stored pattern list matches.
        patterns_in_sync: bool,
        /// Whether the stored settings match.
        settings_in_sync: bool,
    },

    /// The store could not be queried at all.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An index template descriptor, computed on demand from a [`MetricType`]
/// and sent to the store. Never persisted locally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexTemplate {
    /// The template identifier (carried in the request path, not the body).
    pub name: String,
    /// Glob patterns for the indices the template governs.
    pub index_patterns: Vec<String>,
    /// The wire mapping derived from the declared fields.
    pub mappings: Value,
    /// Backend index settings.
    pub settings: Map<String, Value>,
}

impl IndexTemplate {
    /// Renders the descriptor body sent to the store. An empty settings
    /// block is omitted entirely.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut body = Map::new();
        body.insert(
            "index_patterns".to_string(),
            json!(self.index_patterns),
        );
        body.insert("mappings".to_string(), self.mappings.clone());
        if !self.settings.is_empty() {
            body.insert("settings".to_string(), Value::Object(self.settings.clone()));
        }
        Value::Object(body)
    }
}

/// Coerces the settings the store stringifies, leaving everything else as
/// declared.
fn coerced_settings(metric: &MetricType) -> Map<String, Value> {
    let mut settings = Map::new();
    for (key, value) in metric.index_settings() {
        let value = if STRING_COERCED_SETTINGS.contains(&key.as_str()) {
            match value {
                Value::Number(n) => Value::String(n.to_string()),
                other => other.clone(),
            }
        } else {
            value.clone()
        };
        settings.insert(key.clone(), value);
    }
    settings
}

impl MetricType {
    /// Builds the index template descriptor for this type.
    ///
    /// Pure and deterministic: the same declared fields and settings always
    /// yield an identical descriptor.
    #[must_use]
    pub fn index_template(&self) -> IndexTemplate {
        let mut properties = Map::new();
        for (name, spec) in self.fields() {
            properties.insert(name.clone(), spec.to_mapping());
        }
        let mappings = json!({
            "_source": { "enabled": self.source_enabled() },
            "properties": properties,
        });
        let mut settings = Map::new();
        for (key, value) in self.index_settings() {
            settings.insert(key.clone(), value.clone());
        }
        IndexTemplate {
            name: self.template_name().to_string(),
            index_patterns: vec![self.template_pattern().to_string()],
            mappings,
            settings,
        }
    }

    /// Creates or overwrites this type's index template in the store.
    ///
    /// Fires `pre_index_template_create` before the upsert and
    /// `post_index_template_create` after it. Store failures propagate
    /// unchanged and are not retried.
    ///
    /// # Errors
    ///
    /// Returns the store error if the connection is unknown or the upsert
    /// fails.
    pub fn sync_index_template(&self, using: Option<&str>) -> Result<IndexTemplate, StoreError> {
        let connection = using.unwrap_or(DEFAULT_CONNECTION);
        let client = get_connection(Some(connection))?;
        let template = self.index_template();

        let event = TemplateEvent {
            metric_name: self.name().to_string(),
            template: template.clone(),
            using: connection.to_string(),
        };
        PRE_INDEX_TEMPLATE_CREATE.send(&event);
        client.put_template(&template.name, &template.to_value())?;
        tracing::info!(
            metric = self.name(),
            template = %template.name,
            connection,
            "synced index template"
        );
        POST_INDEX_TEMPLATE_CREATE.send(&event);
        Ok(template)
    }

    /// Checks whether the stored template matches this type's declared
    /// schema.
    ///
    /// Compares three aspects independently: structural mapping equality,
    /// pattern-list equality, and settings equality (with shard/replica
    /// counts coerced to strings, matching the store's canonicalization of
    /// numeric settings). A stored template without a `settings.index`
    /// block has its settings considered trivially in sync.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::TemplateNotFound`] if the store holds no
    /// template yet, [`CheckError::OutOfSync`] if any aspect differs, or
    /// [`CheckError::Store`] if the store cannot be queried.
    pub fn check_index_template(&self, using: Option<&str>) -> Result<(), CheckError> {
        let client = get_connection(using)?;
        let current = match client.get_template(self.template_name()) {
            Ok(current) => current,
            Err(source @ StoreError::TemplateNotFound { .. }) => {
                return Err(CheckError::TemplateNotFound {
                    template_name: self.template_name().to_string(),
                    metric_name: self.name().to_string(),
                    source,
                });
            }
            Err(other) => return Err(CheckError::Store(other)),
        };
        let declared = self.index_template();

        let mappings_in_sync = current.get("mappings") == Some(&declared.mappings);
        let patterns_in_sync =
            current.get("index_patterns") == Some(&json!(declared.index_patterns));
        let settings_in_sync = match current.pointer("/settings/index") {
            Some(current_settings) => {
                *current_settings == Value::Object(coerced_settings(self))
            }
            None => true,
        };

        if mappings_in_sync && patterns_in_sync && settings_in_sync {
            return Ok(());
        }
        let aspects = [
            ("mappings", mappings_in_sync),
            ("patterns", patterns_in_sync),
            ("settings", settings_in_sync),
        ];
        let out_of_sync = aspects
            .iter()
            .filter(|(_, in_sync)| !in_sync)
            .map(|(aspect, _)| *aspect)
            .collect::<Vec<_>>()
            .join(", ");
        Err(CheckError::OutOfSync {
            template_name: self.template_name().to_string(),
            metric_name: self.name().to_string(),
            out_of_sync,
            mappings_in_sync,
            patterns_in_sync,
            settings_in_sync,
        })
    }

    /// Probes whether any template exists under this type's template name,
    /// without comparing contents.
    ///
    /// # Errors
    ///
    /// Returns the store error if the store cannot be queried.
    pub fn index_template_exists(&self, using: Option<&str>) -> Result<bool, StoreError> {
        let client = get_connection(using)?;
        match client.get_template(self.template_name()) {
            Ok(_) => Ok(true),
            Err(StoreError::TemplateNotFound { .. }) => Ok(false),
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{add_connection, remove_connection};
    use crate::models::FieldSpec;
    use crate::registry::Registry;
    use crate::signals::{POST_INDEX_TEMPLATE_CREATE, PRE_INDEX_TEMPLATE_CREATE};
    use crate::storage::{InMemoryStore, StoreClient};
    use std::sync::{Arc, Mutex};

    fn page_view(registry: &Registry) -> Arc<MetricType> {
        MetricType::builder("PageView")
            .namespace("osf")
            .field("user_id", FieldSpec::integer())
            .index_setting("number_of_shards", 2)
            .index_setting("refresh_interval", "5s")
            .declare(registry)
            .unwrap()
    }

    #[test]
    fn test_index_template_shape() {
        let registry = Registry::new();
        let metric = page_view(&registry);
        let template = metric.index_template();

        assert_eq!(template.name, "osf_pageview");
        assert_eq!(template.index_patterns, vec!["osf_pageview-*".to_string()]);
        assert_eq!(template.mappings["_source"]["enabled"], json!(false));
        assert_eq!(
            template.mappings["properties"]["user_id"],
            json!({"type": "integer"})
        );
        assert_eq!(
            template.mappings["properties"]["timestamp"],
            json!({"type": "date", "doc_values": true})
        );
        assert_eq!(template.settings.get("number_of_shards"), Some(&json!(2)));
    }

    #[test]
    fn test_index_template_is_deterministic() {
        let registry = Registry::new();
        let metric = page_view(&registry);
        assert_eq!(
            metric.index_template().to_value(),
            metric.index_template().to_value()
        );
    }

    #[test]
    fn test_empty_settings_omitted_from_descriptor() {
        let registry = Registry::new();
        let metric = MetricType::builder("Bare")
            .namespace("osf")
            .declare(&registry)
            .unwrap();
        let body = metric.index_template().to_value();
        assert!(body.get("settings").is_none());
        assert!(body.get("index_patterns").is_some());
    }

    #[test]
    fn test_index_template_serializes() {
        let registry = Registry::new();
        let template = page_view(&registry).index_template();
        let serialized = serde_json::to_value(&template).unwrap();
        assert_eq!(serialized["name"], "osf_pageview");
        assert_eq!(serialized["index_patterns"], json!(["osf_pageview-*"]));
        assert_eq!(serialized["mappings"], template.mappings);
    }

    #[test]
    fn test_inherited_field_appears_in_mapping() {
        let registry = Registry::new();
        let base = MetricType::builder("UserEvent")
            .abstract_base()
            .field("user_id", FieldSpec::integer())
            .declare(&registry)
            .unwrap();
        let concrete = MetricType::builder("PreprintView")
            .namespace("osf")
            .inherit(&base)
            .declare(&registry)
            .unwrap();

        let template = concrete.index_template();
        assert_eq!(
            template.mappings["properties"]["user_id"],
            json!({"type": "integer"})
        );
    }

    #[test]
    fn test_sync_then_check_in_sync() {
        let connection = "test-template-sync-check";
        add_connection(connection, InMemoryStore::new_shared());
        let registry = Registry::new();
        let metric = page_view(&registry);

        let missing = metric.check_index_template(Some(connection)).unwrap_err();
        assert!(matches!(missing, CheckError::TemplateNotFound { .. }));
        assert_eq!(missing.to_string(), "osf_pageview does not exist for PageView");
        assert!(!metric.index_template_exists(Some(connection)).unwrap());

        metric.sync_index_template(Some(connection)).unwrap();
        assert!(metric.index_template_exists(Some(connection)).unwrap());
        metric.check_index_template(Some(connection)).unwrap();

        remove_connection(connection);
    }

    #[test]
    fn test_check_reports_settings_drift() {
        let connection = "test-template-settings-drift";
        add_connection(connection, InMemoryStore::new_shared());
        let registry = Registry::new();
        let metric = page_view(&registry);
        metric.sync_index_template(Some(connection)).unwrap();

        // Same schema, different settings, same template identity.
        let drifted = MetricType::builder("PageView")
            .namespace("drifted")
            .template_name("osf_pageview")
            .template_pattern("osf_pageview-*")
            .field("user_id", FieldSpec::integer())
            .index_setting("number_of_shards", 4)
            .index_setting("refresh_interval", "5s")
            .declare(&registry)
            .unwrap();

        let err = drifted.check_index_template(Some(connection)).unwrap_err();
        match err {
            CheckError::OutOfSync {
                mappings_in_sync,
                patterns_in_sync,
                settings_in_sync,
                ref out_of_sync,
                ..
            } => {
                assert!(mappings_in_sync);
                assert!(patterns_in_sync);
                assert!(!settings_in_sync);
                assert_eq!(out_of_sync, "settings");
            }
            other => panic!("expected OutOfSync, got {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "osf_pageview is out of sync with PageView (settings)"
        );

        remove_connection(connection);
    }

    #[test]
    fn test_check_reports_mapping_and_pattern_drift() {
        let connection = "test-template-mapping-drift";
        add_connection(connection, InMemoryStore::new_shared());
        let registry = Registry::new();
        let metric = page_view(&registry);
        metric.sync_index_template(Some(connection)).unwrap();

        let drifted = MetricType::builder("PageView")
            .namespace("drifted")
            .template_name("osf_pageview")
            .template_pattern("osf_pageview-v2-*")
            .field("user_id", FieldSpec::long())
            .index_setting("number_of_shards", 2)
            .index_setting("refresh_interval", "5s")
            .declare(&registry)
            .unwrap();

        let err = drifted.check_index_template(Some(connection)).unwrap_err();
        match err {
            CheckError::OutOfSync {
                mappings_in_sync,
                patterns_in_sync,
                settings_in_sync,
                ref out_of_sync,
                ..
            } => {
                assert!(!mappings_in_sync);
                assert!(!patterns_in_sync);
                assert!(settings_in_sync);
                assert_eq!(out_of_sync, "mappings, patterns");
            }
            other => panic!("expected OutOfSync, got {other:?}"),
        }

        remove_connection(connection);
    }

    #[test]
    fn test_sync_is_idempotent() {
        let connection = "test-template-idempotent";
        let store = InMemoryStore::new_shared();
        add_connection(connection, Arc::clone(&store) as _);
        let registry = Registry::new();
        let metric = page_view(&registry);

        metric.sync_index_template(Some(connection)).unwrap();
        metric.sync_index_template(Some(connection)).unwrap();

        assert_eq!(store.template_names().unwrap(), vec!["osf_pageview".to_string()]);
        metric.check_index_template(Some(connection)).unwrap();

        remove_connection(connection);
    }

    #[test]
    fn test_sync_fires_signals_around_upsert() {
        let connection = "test-template-signals";
        let store = InMemoryStore::new_shared();
        add_connection(connection, Arc::clone(&store) as _);
        let registry = Registry::new();
        let metric = page_view(&registry);

        let events: Arc<Mutex<Vec<(String, bool)>>> = Arc::new(Mutex::new(Vec::new()));

        let store_pre = Arc::clone(&store);
        let events_pre = Arc::clone(&events);
        let pre_id = PRE_INDEX_TEMPLATE_CREATE.connect(move |event: &TemplateEvent| {
            if event.using != "test-template-signals" {
                return;
            }
            let exists = store_pre.get_template(&event.template.name).is_ok();
            events_pre.lock().unwrap().push(("pre".to_string(), exists));
        });
        let store_post = Arc::clone(&store);
        let events_post = Arc::clone(&events);
        let post_id = POST_INDEX_TEMPLATE_CREATE.connect(move |event: &TemplateEvent| {
            if event.using != "test-template-signals" {
                return;
            }
            let exists = store_post.get_template(&event.template.name).is_ok();
            events_post.lock().unwrap().push(("post".to_string(), exists));
        });

        metric.sync_index_template(Some(connection)).unwrap();

        let seen = events.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![("pre".to_string(), false), ("post".to_string(), true)]
        );

        PRE_INDEX_TEMPLATE_CREATE.disconnect(pre_id);
        POST_INDEX_TEMPLATE_CREATE.disconnect(post_id);
        remove_connection(connection);
    }

    #[test]
    fn test_unknown_connection_propagates() {
        let registry = Registry::new();
        let metric = page_view(&registry);
        let result = metric.sync_index_template(Some("test-template-no-such-connection"));
        assert!(matches!(
            result,
            Err(StoreError::UnknownConnection { .. })
        ));
    }
}
