//! Metric record persistence.
//!
//! A [`MetricRecord`] is a runtime instance of a metric type: field values
//! plus a timestamp. Records are append-only; each one lands in the dated
//! index derived from its timestamp and the owning type's template name.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::{self, get_connection, DEFAULT_CONNECTION};
use crate::models::MetricType;
use crate::signals::{SaveEvent, POST_SAVE, PRE_SAVE};
use crate::storage::StoreError;

/// Errors raised while building or saving a metric record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Abstract types are mixins and cannot be instantiated.
    #[error("Cannot create a record of abstract metric type '{name}'")]
    AbstractType {
        /// Name of the abstract metric type.
        name: String,
    },

    /// A field declared as required was not given a value.
    #[error("Metric type '{metric}' requires a value for field '{field}'")]
    MissingField {
        /// Name of the metric type being saved.
        metric: String,
        /// Name of the missing required field.
        field: String,
    },

    /// The store rejected the write or could not be reached.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MetricType {
    /// Computes the dated index name for this type:
    /// `{template_name}-{date}` with the date rendered in the process-wide
    /// configured format (default `%Y.%m.%d`). `None` means today (UTC).
    #[must_use]
    pub fn index_name(&self, date: Option<NaiveDate>) -> String {
        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        let date_format = config::settings().date_format;
        format!("{}-{}", self.template_name(), date.format(&date_format))
    }

    /// Fetches a previously saved document by id, searching the whole
    /// rolling index family (the template pattern), not just today's index.
    ///
    /// # Errors
    ///
    /// Returns the store error if the document is missing or the store
    /// cannot be reached.
    pub fn get_document(&self, id: &str, using: Option<&str>) -> Result<Value, StoreError> {
        let client = get_connection(using)?;
        client.get_document(self.default_index(), id)
    }
}

/// A single metric record awaiting or following persistence.
#[derive(Debug, Clone)]
pub struct MetricRecord {
    metric: Arc<MetricType>,
    /// The record's timestamp. `None` until defaulted at save time.
    pub timestamp: Option<DateTime<Utc>>,
    values: Map<String, Value>,
    id: Option<String>,
    index: Option<String>,
}

impl MetricRecord {
    /// Creates an empty record of the given metric type.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::AbstractType`] if the type is abstract.
    pub fn new(metric: Arc<MetricType>) -> Result<Self, RecordError> {
        if metric.is_abstract() {
            return Err(RecordError::AbstractType {
                name: metric.name().to_string(),
            });
        }
        Ok(Self {
            metric,
            timestamp: None,
            values: Map::new(),
            id: None,
            index: None,
        })
    }

    /// Constructs a record with the given values and saves it immediately,
    /// targeting the index derived from `timestamp` (defaulted to now).
    ///
    /// # Errors
    ///
    /// Same as [`MetricRecord::new`] and [`MetricRecord::save`].
    pub fn record(
        metric: &Arc<MetricType>,
        timestamp: Option<DateTime<Utc>>,
        values: Map<String, Value>,
        using: Option<&str>,
    ) -> Result<Self, RecordError> {
        let mut instance = Self::new(Arc::clone(metric))?;
        instance.timestamp = timestamp;
        instance.values = values;
        let index = metric.index_name(timestamp.map(|ts| ts.date_naive()));
        instance.save(using, Some(&index))?;
        Ok(instance)
    }

    /// Sets the record's timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets a field value.
    #[must_use]
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// The owning metric type.
    #[must_use]
    pub fn metric(&self) -> &Arc<MetricType> {
        &self.metric
    }

    /// The store-assigned id, once saved.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The index the record was saved into, once saved.
    #[must_use]
    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    /// Returns the named field value, if set.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Renders the document written to the store: the field values plus a
    /// `timestamp` key in RFC 3339 form (when resolved).
    #[must_use]
    pub fn to_document(&self) -> Value {
        let mut document = self.values.clone();
        if let Some(timestamp) = self.timestamp {
            document.insert(
                "timestamp".to_string(),
                Value::String(timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        }
        Value::Object(document)
    }

    /// Saves the record.
    ///
    /// Defaults the timestamp to now (writing it back to the record) and
    /// the target index to the one derived from that timestamp; an explicit
    /// `index` bypasses the computation entirely. Fires `pre_save` before
    /// the store write and `post_save` after it.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MissingField`] if a required field has no
    /// value, or propagates the store error on write failure.
    pub fn save(&mut self, using: Option<&str>, index: Option<&str>) -> Result<(), RecordError> {
        let timestamp = self.timestamp.unwrap_or_else(Utc::now);
        self.timestamp = Some(timestamp);

        let index = match index {
            Some(index) => index.to_string(),
            None => self.metric.index_name(Some(timestamp.date_naive())),
        };

        for (name, spec) in self.metric.fields() {
            if spec.is_required() && name != "timestamp" && !self.values.contains_key(name) {
                return Err(RecordError::MissingField {
                    metric: self.metric.name().to_string(),
                    field: name.clone(),
                });
            }
        }

        let connection = using.unwrap_or(DEFAULT_CONNECTION);
        let client = get_connection(Some(connection))?;
        let document = self.to_document();

        let event = SaveEvent {
            metric: Arc::clone(&self.metric),
            document: document.clone(),
            using: connection.to_string(),
            index: index.clone(),
        };
        PRE_SAVE.send(&event);
        let id = client.save_document(&index, &document)?;
        tracing::debug!(
            metric = self.metric.name(),
            index = %index,
            id = %id,
            "saved metric record"
        );
        POST_SAVE.send(&event);

        self.id = Some(id);
        self.index = Some(index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{add_connection, remove_connection, test_support, Settings};
    use crate::models::FieldSpec;
    use crate::registry::Registry;
    use crate::storage::InMemoryStore;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Mutex;

    fn preprint_views(registry: &Registry) -> Arc<MetricType> {
        MetricType::builder("PreprintViews")
            .namespace("osf_metrics")
            .declare(registry)
            .unwrap()
    }

    #[test]
    fn test_index_name_uses_configured_date_format() {
        let _guard = test_support::settings_guard();
        config::reset_settings();

        let registry = Registry::new();
        let metric = preprint_views(&registry);
        assert_eq!(metric.template_name(), "osf_metrics_preprintviews");

        let date = NaiveDate::from_ymd_opt(2020, 2, 14).unwrap();
        assert_eq!(
            metric.index_name(Some(date)),
            "osf_metrics_preprintviews-2020.02.14"
        );

        config::configure(Settings {
            date_format: "%Y-%m-%d".to_string(),
            ..Settings::default()
        });
        assert_eq!(
            metric.index_name(Some(date)),
            "osf_metrics_preprintviews-2020-02-14"
        );
        config::reset_settings();
    }

    #[test]
    fn test_index_name_defaults_to_today() {
        let _guard = test_support::settings_guard();
        config::reset_settings();

        let registry = Registry::new();
        let metric = preprint_views(&registry);
        let today = Utc::now().date_naive();
        assert_eq!(metric.index_name(None), metric.index_name(Some(today)));
    }

    #[test]
    fn test_abstract_type_cannot_be_instantiated() {
        let registry = Registry::new();
        let base = MetricType::builder("UserEvent")
            .abstract_base()
            .declare(&registry)
            .unwrap();
        let result = MetricRecord::new(base);
        assert!(matches!(result, Err(RecordError::AbstractType { .. })));
    }

    #[test]
    fn test_save_defaults_timestamp_and_index() {
        let _guard = test_support::settings_guard();
        config::reset_settings();

        let connection = "test-record-default-index";
        let store = InMemoryStore::new_shared();
        add_connection(connection, Arc::clone(&store) as _);

        let registry = Registry::new();
        let metric = preprint_views(&registry);
        let mut record = MetricRecord::new(Arc::clone(&metric)).unwrap();
        assert!(record.timestamp.is_none());

        record.save(Some(connection), None).unwrap();

        let timestamp = record.timestamp.expect("timestamp defaulted at save");
        let expected_index = metric.index_name(Some(timestamp.date_naive()));
        assert_eq!(record.index(), Some(expected_index.as_str()));
        assert!(record.id().is_some());
        assert_eq!(store.documents_in(&expected_index).unwrap().len(), 1);

        remove_connection(connection);
    }

    #[test]
    fn test_explicit_index_bypasses_computation() {
        let connection = "test-record-explicit-index";
        let store = InMemoryStore::new_shared();
        add_connection(connection, Arc::clone(&store) as _);

        let registry = Registry::new();
        let metric = preprint_views(&registry);
        let mut record = MetricRecord::new(metric).unwrap();
        record.save(Some(connection), Some("somewhere-else")).unwrap();

        assert_eq!(record.index(), Some("somewhere-else"));
        assert_eq!(store.documents_in("somewhere-else").unwrap().len(), 1);

        remove_connection(connection);
    }

    #[test]
    fn test_save_targets_index_from_explicit_timestamp() {
        let _guard = test_support::settings_guard();
        config::reset_settings();

        let connection = "test-record-ts-index";
        add_connection(connection, InMemoryStore::new_shared());

        let registry = Registry::new();
        let metric = preprint_views(&registry);
        let timestamp = Utc.with_ymd_and_hms(2020, 2, 14, 9, 30, 0).unwrap();
        let mut record = MetricRecord::new(metric).unwrap().with_timestamp(timestamp);
        record.save(Some(connection), None).unwrap();

        assert_eq!(
            record.index(),
            Some("osf_metrics_preprintviews-2020.02.14")
        );

        remove_connection(connection);
    }

    #[test]
    fn test_required_field_validated_at_save() {
        let connection = "test-record-required";
        add_connection(connection, InMemoryStore::new_shared());

        let registry = Registry::new();
        let metric = MetricType::builder("PageView")
            .namespace("osf")
            .field("user_id", FieldSpec::integer().required())
            .declare(&registry)
            .unwrap();

        let mut incomplete = MetricRecord::new(Arc::clone(&metric)).unwrap();
        let err = incomplete.save(Some(connection), None).unwrap_err();
        assert!(matches!(
            err,
            RecordError::MissingField { ref field, .. } if field == "user_id"
        ));

        let mut complete = MetricRecord::new(metric).unwrap().with_value("user_id", 42);
        complete.save(Some(connection), None).unwrap();

        remove_connection(connection);
    }

    #[test]
    fn test_record_convenience_saves_immediately() {
        let _guard = test_support::settings_guard();
        config::reset_settings();

        let connection = "test-record-convenience";
        let store = InMemoryStore::new_shared();
        add_connection(connection, Arc::clone(&store) as _);

        let registry = Registry::new();
        let metric = MetricType::builder("PageView")
            .namespace("osf")
            .field("user_id", FieldSpec::integer())
            .declare(&registry)
            .unwrap();

        let timestamp = Utc.with_ymd_and_hms(2020, 2, 14, 9, 30, 0).unwrap();
        let mut values = Map::new();
        values.insert("user_id".to_string(), json!(42));
        let record =
            MetricRecord::record(&metric, Some(timestamp), values, Some(connection)).unwrap();

        assert_eq!(record.index(), Some("osf_pageview-2020.02.14"));
        let documents = store.documents_in("osf_pageview-*").unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0]["user_id"], json!(42));
        assert_eq!(
            documents[0]["timestamp"],
            json!("2020-02-14T09:30:00.000Z")
        );

        // The saved document is reachable through the pattern-wide scope.
        let id = record.id().unwrap();
        let fetched = record.metric().get_document(id, Some(connection)).unwrap();
        assert_eq!(fetched["user_id"], json!(42));

        remove_connection(connection);
    }

    #[test]
    fn test_save_signal_ordering() {
        let connection = "test-record-signals";
        let store = InMemoryStore::new_shared();
        add_connection(connection, Arc::clone(&store) as _);

        let registry = Registry::new();
        let metric = preprint_views(&registry);

        let events: Arc<Mutex<Vec<(String, usize)>>> = Arc::new(Mutex::new(Vec::new()));

        let store_pre = Arc::clone(&store);
        let events_pre = Arc::clone(&events);
        let pre_id = PRE_SAVE.connect(move |event: &SaveEvent| {
            if event.using != "test-record-signals" {
                return;
            }
            let count = store_pre.documents_in(&event.index).unwrap().len();
            events_pre.lock().unwrap().push(("pre".to_string(), count));
        });
        let store_post = Arc::clone(&store);
        let events_post = Arc::clone(&events);
        let post_id = POST_SAVE.connect(move |event: &SaveEvent| {
            if event.using != "test-record-signals" {
                return;
            }
            let count = store_post.documents_in(&event.index).unwrap().len();
            events_post.lock().unwrap().push(("post".to_string(), count));
        });

        let mut record = MetricRecord::new(metric).unwrap();
        record.save(Some(connection), None).unwrap();

        // pre_save fires strictly before the write, post_save strictly
        // after.
        let seen = events.lock().unwrap().clone();
        assert_eq!(seen, vec![("pre".to_string(), 0), ("post".to_string(), 1)]);

        PRE_SAVE.disconnect(pre_id);
        POST_SAVE.disconnect(post_id);
        remove_connection(connection);
    }
}
