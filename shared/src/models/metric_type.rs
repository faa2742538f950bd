//! Metric type declaration.
//!
//! A [`MetricType`] is the static, immutable descriptor of a time-series
//! record schema. Declaration runs once, at process startup, through
//! [`MetricTypeBuilder::declare`], which resolves the namespace, synthesizes
//! the template identifiers, merges inherited fields and settings, and
//! registers the type in the catalog.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::config;
use crate::models::FieldSpec;
use crate::registry::{Registry, RegistryError};

/// Errors raised while declaring a metric type. Both variants are meant to
/// fail process startup loudly.
#[derive(Debug, Error)]
pub enum DeclarationError {
    /// A non-abstract metric type resolved no namespace.
    #[error(
        "Metric type '{name}' doesn't declare an explicit namespace \
         and no default namespace is configured."
    )]
    MissingNamespace {
        /// Name of the offending metric type.
        name: String,
    },

    /// Registration failed, typically a duplicate `(namespace, name)` key.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Immutable descriptor of a declared metric type.
///
/// Constructed once via [`MetricType::builder`] and shared behind an `Arc`;
/// never mutated afterwards.
#[derive(Debug)]
pub struct MetricType {
    name: String,
    type_name: String,
    namespace: Option<String>,
    template_name: String,
    template_pattern: String,
    is_abstract: bool,
    source_enabled: bool,
    fields: Vec<(String, FieldSpec)>,
    index_settings: Vec<(String, Value)>,
}

impl MetricType {
    /// Starts declaring a metric type with the given (CamelCase) name.
    ///
    /// Every metric type starts with a required `timestamp` date field.
    ///
    /// # Example
    ///
    /// ```
    /// use shared::models::{FieldSpec, MetricType};
    /// use shared::registry::Registry;
    ///
    /// let registry = Registry::new();
    /// let page_view = MetricType::builder("PageView")
    ///     .namespace("osf")
    ///     .field("user_id", FieldSpec::integer())
    ///     .index_setting("refresh_interval", "5s")
    ///     .declare(&registry)
    ///     .unwrap();
    /// assert_eq!(page_view.template_name(), "osf_pageview");
    /// ```
    #[must_use]
    pub fn builder(name: impl Into<String>) -> MetricTypeBuilder {
        MetricTypeBuilder::new(name)
    }

    /// The declared name, in its original casing.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The lowercased short name used as the registry key.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The owning namespace. `None` only for abstract types declared
    /// without one.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// The index template identifier.
    #[must_use]
    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    /// The glob pattern matching all of this type's dated indices.
    #[must_use]
    pub fn template_pattern(&self) -> &str {
        &self.template_pattern
    }

    /// True for mixin types that are never registered or instantiated.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Whether the store keeps the raw `_source` document.
    #[must_use]
    pub fn source_enabled(&self) -> bool {
        self.source_enabled
    }

    /// The resolved fields, in declaration order (inherited first).
    #[must_use]
    pub fn fields(&self) -> &[(String, FieldSpec)] {
        &self.fields
    }

    /// Returns the spec of the named field, if declared.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, spec)| spec)
    }

    /// The resolved index settings, in declaration order.
    #[must_use]
    pub fn index_settings(&self) -> &[(String, Value)] {
        &self.index_settings
    }

    /// The default read scope: the template pattern, spanning the whole
    /// rolling family of dated indices rather than a single day.
    #[must_use]
    pub fn default_index(&self) -> &str {
        &self.template_pattern
    }
}

/// Inserts or replaces `(name, value)` in an ordered pair list, keeping the
/// original position on replacement (dict-update semantics).
fn overlay<T>(entries: &mut Vec<(String, T)>, name: String, value: T) {
    if let Some(entry) = entries.iter_mut().find(|(n, _)| *n == name) {
        entry.1 = value;
    } else {
        entries.push((name, value));
    }
}

/// Builder for [`MetricType`]; see [`MetricType::builder`].
#[derive(Debug)]
pub struct MetricTypeBuilder {
    name: String,
    namespace: Option<String>,
    template_name: Option<String>,
    template_pattern: Option<String>,
    is_abstract: bool,
    source_enabled: Option<bool>,
    inherited_source_enabled: Option<bool>,
    fields: Vec<(String, FieldSpec)>,
    index_settings: Vec<(String, Value)>,
}

impl MetricTypeBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            template_name: None,
            template_pattern: None,
            is_abstract: false,
            source_enabled: None,
            inherited_source_enabled: None,
            fields: vec![(
                "timestamp".to_string(),
                FieldSpec::date().doc_values(true).required(),
            )],
            index_settings: Vec::new(),
        }
    }

    /// Sets the owning namespace explicitly.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets an explicit template name instead of the synthesized
    /// `{namespace}_{name}`.
    #[must_use]
    pub fn template_name(mut self, template_name: impl Into<String>) -> Self {
        self.template_name = Some(template_name.into());
        self
    }

    /// Sets an explicit template pattern instead of the synthesized
    /// `{namespace}_{name}-*`.
    #[must_use]
    pub fn template_pattern(mut self, template_pattern: impl Into<String>) -> Self {
        self.template_pattern = Some(template_pattern.into());
        self
    }

    /// Marks the type as an abstract mixin: never registered, usable only
    /// through [`MetricTypeBuilder::inherit`].
    #[must_use]
    pub fn abstract_base(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Sets whether the store keeps the raw `_source` document
    /// (default: disabled, as metric records are append-only aggregates).
    #[must_use]
    pub fn source_enabled(mut self, enabled: bool) -> Self {
        self.source_enabled = Some(enabled);
        self
    }

    /// Merges the resolved fields, index settings, and source toggle of a
    /// parent type (typically an abstract base). Call before declaring
    /// local fields so that local declarations win on name collisions.
    #[must_use]
    pub fn inherit(mut self, parent: &MetricType) -> Self {
        for (name, spec) in &parent.fields {
            overlay(&mut self.fields, name.clone(), spec.clone());
        }
        for (key, value) in &parent.index_settings {
            overlay(&mut self.index_settings, key.clone(), value.clone());
        }
        self.inherited_source_enabled = Some(parent.source_enabled);
        self
    }

    /// Declares a field. Re-declaring a name replaces the inherited spec in
    /// place.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        overlay(&mut self.fields, name.into(), spec);
        self
    }

    /// Declares a backend index setting (shard count, refresh interval,
    /// etc.). Local keys win over inherited ones.
    #[must_use]
    pub fn index_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        overlay(&mut self.index_settings, key.into(), value.into());
        self
    }

    /// Finalizes the declaration against the given registry.
    ///
    /// Resolves the namespace (explicit, else the configured default),
    /// synthesizes missing template identifiers from `{namespace}_{name}`,
    /// and registers the type unless it is abstract.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::MissingNamespace`] if a non-abstract type
    /// resolves no namespace, or propagates [`RegistryError::Conflict`] for
    /// a duplicate `(namespace, name)` key.
    pub fn declare(self, registry: &Registry) -> Result<Arc<MetricType>, DeclarationError> {
        let type_name = self.name.to_lowercase();

        let namespace = self
            .namespace
            .or_else(|| config::settings().default_namespace);
        if namespace.is_none() && !self.is_abstract {
            return Err(DeclarationError::MissingNamespace { name: self.name });
        }

        // Missing template identifiers are always synthesized from
        // namespace + name; an explicit sibling value is never borrowed.
        // That asymmetry is long-standing observed behavior, so a type with
        // only an explicit template_name still gets the synthesized
        // pattern.
        let synthesized = |suffix: &str| match &namespace {
            Some(ns) => format!("{ns}_{type_name}{suffix}"),
            None => format!("{type_name}{suffix}"),
        };
        let template_name = self.template_name.unwrap_or_else(|| synthesized(""));
        let template_pattern = self.template_pattern.unwrap_or_else(|| synthesized("-*"));

        let metric = Arc::new(MetricType {
            name: self.name,
            type_name,
            namespace,
            template_name,
            template_pattern,
            is_abstract: self.is_abstract,
            source_enabled: self
                .source_enabled
                .or(self.inherited_source_enabled)
                .unwrap_or(false),
            fields: self.fields,
            index_settings: self.index_settings,
        });

        if !metric.is_abstract {
            let namespace = metric.namespace.clone().unwrap_or_default();
            registry.register(&namespace, Arc::clone(&metric))?;
        }
        Ok(metric)
    }

    /// Declares against the process-wide registry; see
    /// [`MetricTypeBuilder::declare`].
    ///
    /// # Errors
    ///
    /// Same as [`MetricTypeBuilder::declare`].
    pub fn declare_global(self) -> Result<Arc<MetricType>, DeclarationError> {
        self.declare(Registry::global())
    }
}
