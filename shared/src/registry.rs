//! Process-wide catalog of declared metric types.
//!
//! The registry keeps track of metric types per namespace, in declaration
//! order, the same way an application framework tracks model classes.
//! Registration happens exactly once per non-abstract metric type, during
//! declaration; afterwards the catalog is read-mostly.

use std::sync::{Arc, LazyLock, RwLock};

use thiserror::Error;

use crate::models::MetricType;

/// Errors raised by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two metric types were declared under the same `(namespace, name)`
    /// key.
    #[error(
        "Conflicting '{type_name}' metrics in namespace '{namespace}': {existing} and {new}."
    )]
    Conflict {
        /// Lowercased type name under which the conflict occurred.
        type_name: String,
        /// Namespace under which the conflict occurred.
        namespace: String,
        /// Name of the already registered metric type.
        existing: String,
        /// Name of the metric type that was being registered.
        new: String,
    },

    /// No metrics are registered under the requested namespace.
    #[error("No metrics found in namespace '{namespace}'.")]
    UnknownNamespace {
        /// The namespace that was requested.
        namespace: String,
    },

    /// The namespace exists but holds no metric with the requested name.
    #[error("Namespace '{namespace}' doesn't have a '{name}' metric.")]
    UnknownMetric {
        /// The namespace that was searched.
        namespace: String,
        /// The metric name that was requested.
        name: String,
    },

    /// A dotted reference did not contain exactly one dot.
    #[error("Metric reference '{reference}' must be in the form 'namespace.Name'.")]
    InvalidReference {
        /// The malformed reference.
        reference: String,
    },

    /// Failed to acquire the catalog lock.
    #[error("Failed to acquire lock on metric registry")]
    Lock,
}

struct NamespaceEntry {
    label: String,
    metrics: Vec<Arc<MetricType>>,
}

/// Catalog of metric types, keyed by namespace and lowercased type name.
///
/// A process-wide instance is available via [`Registry::global`]; tests
/// typically construct their own for isolation.
#[derive(Default)]
pub struct Registry {
    namespaces: RwLock<Vec<NamespaceEntry>>,
}

static GLOBAL: LazyLock<Registry> = LazyLock::new(Registry::new);

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry, populated as a side effect of
    /// metric type declaration.
    #[must_use]
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Adds a metric type to the catalog under `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Conflict`] if a metric with the same
    /// lowercased name is already registered in that namespace.
    pub fn register(
        &self,
        namespace: &str,
        metric: Arc<MetricType>,
    ) -> Result<(), RegistryError> {
        let mut namespaces = self.namespaces.write().map_err(|_| RegistryError::Lock)?;
        let position = match namespaces.iter().position(|e| e.label == namespace) {
            Some(position) => position,
            None => {
                namespaces.push(NamespaceEntry {
                    label: namespace.to_string(),
                    metrics: Vec::new(),
                });
                namespaces.len() - 1
            }
        };
        let entry = &mut namespaces[position];
        if let Some(existing) = entry
            .metrics
            .iter()
            .find(|m| m.type_name() == metric.type_name())
        {
            return Err(RegistryError::Conflict {
                type_name: metric.type_name().to_string(),
                namespace: namespace.to_string(),
                existing: existing.name().to_string(),
                new: metric.name().to_string(),
            });
        }
        tracing::debug!(namespace, metric = metric.name(), "registered metric type");
        entry.metrics.push(metric);
        Ok(())
    }

    /// Returns the metric registered under `namespace` with the given name.
    ///
    /// `name` is case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownNamespace`] if no metrics exist for
    /// the namespace, or [`RegistryError::UnknownMetric`] if the namespace
    /// exists but holds no metric with that name.
    pub fn get(&self, namespace: &str, name: &str) -> Result<Arc<MetricType>, RegistryError> {
        let namespaces = self.namespaces.read().map_err(|_| RegistryError::Lock)?;
        let entry = namespaces
            .iter()
            .find(|e| e.label == namespace)
            .ok_or_else(|| RegistryError::UnknownNamespace {
                namespace: namespace.to_string(),
            })?;
        let lowered = name.to_lowercase();
        entry
            .metrics
            .iter()
            .find(|m| m.type_name() == lowered)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownMetric {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    /// Returns the metric for a dotted `namespace.Name` reference.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidReference`] if the reference does not
    /// contain exactly one dot, otherwise the same errors as [`Registry::get`].
    pub fn get_ref(&self, reference: &str) -> Result<Arc<MetricType>, RegistryError> {
        let mut parts = reference.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(namespace), Some(name), None) if !namespace.is_empty() && !name.is_empty() => {
                self.get(namespace, name)
            }
            _ => Err(RegistryError::InvalidReference {
                reference: reference.to_string(),
            }),
        }
    }

    /// Returns all registered metric types in declaration order, optionally
    /// filtered to one namespace.
    ///
    /// Abstract types are never registered and so never appear here.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownNamespace`] if an explicit namespace
    /// filter does not exist in the catalog.
    pub fn metrics(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<Arc<MetricType>>, RegistryError> {
        let namespaces = self.namespaces.read().map_err(|_| RegistryError::Lock)?;
        match namespace {
            Some(label) => {
                let entry = namespaces
                    .iter()
                    .find(|e| e.label == label)
                    .ok_or_else(|| RegistryError::UnknownNamespace {
                        namespace: label.to_string(),
                    })?;
                Ok(entry.metrics.clone())
            }
            None => Ok(namespaces
                .iter()
                .flat_map(|e| e.metrics.iter().cloned())
                .collect()),
        }
    }

    /// Returns the namespace labels in first-registration order.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog lock is poisoned.
    pub fn namespaces(&self) -> Result<Vec<String>, RegistryError> {
        let namespaces = self.namespaces.read().map_err(|_| RegistryError::Lock)?;
        Ok(namespaces.iter().map(|e| e.label.clone()).collect())
    }

    /// Returns true if any metric is registered under `namespace`.
    #[must_use]
    pub fn contains_namespace(&self, namespace: &str) -> bool {
        self.namespaces
            .read()
            .map(|namespaces| namespaces.iter().any(|e| e.label == namespace))
            .unwrap_or(false)
    }

    /// Returns the total number of registered metric types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.namespaces
            .read()
            .map(|namespaces| namespaces.iter().map(|e| e.metrics.len()).sum())
            .unwrap_or(0)
    }

    /// Returns true if no metric types are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every registered metric type. Intended for tests.
    pub fn clear(&self) {
        if let Ok(mut namespaces) = self.namespaces.write() {
            namespaces.clear();
        }
    }
}
