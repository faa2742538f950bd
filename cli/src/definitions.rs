//! Metric definitions file.
//!
//! The library declares metric types in code at startup; the standalone CLI
//! instead loads them from a TOML definitions file, which plays the role of
//! module discovery for a binary that cannot link the owning application.
//!
//! ```toml
//! namespace = "osf"
//!
//! [connections]
//! default = "http://localhost:9200"
//!
//! [[metric]]
//! name = "UserEvent"
//! abstract = true
//! fields = { user_id = "integer" }
//!
//! [[metric]]
//! name = "PageView"
//! inherit = "UserEvent"
//! fields = { path = "keyword" }
//! settings = { number_of_shards = 2 }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use shared::config::add_connection;
use shared::models::{FieldSpec, MetricType};
use shared::registry::Registry;
use shared::storage::HttpStore;

/// Top-level shape of the definitions file.
#[derive(Debug, Deserialize)]
pub struct DefinitionsFile {
    /// Default namespace for metrics that do not declare one.
    pub namespace: Option<String>,
    /// Store connections, name -> base URL.
    #[serde(default)]
    pub connections: HashMap<String, String>,
    /// Declared metric types, in file order.
    #[serde(default, rename = "metric")]
    pub metrics: Vec<MetricDef>,
}

/// One `[[metric]]` entry.
#[derive(Debug, Deserialize)]
pub struct MetricDef {
    /// Declared type name (CamelCase by convention).
    pub name: String,
    /// Owning namespace; falls back to the file-level default.
    pub namespace: Option<String>,
    /// Explicit template name override.
    pub template_name: Option<String>,
    /// Explicit template pattern override.
    pub template_pattern: Option<String>,
    /// Abstract mixin types are inherited from but never registered.
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    /// Name of a previously declared abstract type to merge fields from.
    pub inherit: Option<String>,
    /// Whether the store keeps the raw source document.
    pub source_enabled: Option<bool>,
    /// Declared fields, name -> type or detailed spec.
    #[serde(default)]
    pub fields: toml::Table,
    /// Backend index settings.
    #[serde(default)]
    pub settings: toml::Table,
}

/// Detailed field table: `{ type = "date", required = true, ... }`.
#[derive(Debug, Deserialize)]
struct FieldDef {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    required: bool,
    doc_values: Option<bool>,
    index: Option<bool>,
    format: Option<String>,
}

fn parse_field(name: &str, value: &toml::Value) -> Result<FieldSpec> {
    let def: FieldDef = match value {
        toml::Value::String(kind) => FieldDef {
            kind: kind.clone(),
            required: false,
            doc_values: None,
            index: None,
            format: None,
        },
        other => other
            .clone()
            .try_into()
            .with_context(|| format!("invalid spec for field '{name}'"))?,
    };
    let mut spec = FieldSpec::of_kind(&def.kind)
        .map_err(|e| anyhow!("field '{name}': {e}"))?;
    if def.required {
        spec = spec.required();
    }
    if let Some(doc_values) = def.doc_values {
        spec = spec.doc_values(doc_values);
    }
    if let Some(index) = def.index {
        spec = spec.index(index);
    }
    if let Some(format) = def.format {
        spec = spec.format(format);
    }
    Ok(spec)
}

fn toml_to_json(value: &toml::Value) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

impl DefinitionsFile {
    /// Parses a definitions file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading definitions file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("parsing definitions file {}", path.display()))
    }

    /// Declares every metric in file order into `registry` and registers
    /// the configured store connections.
    ///
    /// Declaration errors (missing namespace, conflicting names) abort:
    /// the process should not start with an invalid definitions file.
    ///
    /// # Errors
    ///
    /// Returns the first declaration or parse error encountered.
    pub fn apply(&self, registry: &Registry) -> Result<()> {
        for (name, url) in &self.connections {
            let store = HttpStore::new(url.clone())
                .map_err(|e| anyhow!("connection '{name}': {e}"))?;
            add_connection(name.clone(), Arc::new(store));
        }

        // Abstract types are kept aside for later `inherit` references.
        let mut abstract_types: HashMap<String, Arc<MetricType>> = HashMap::new();
        for def in &self.metrics {
            let mut builder = MetricType::builder(def.name.as_str());
            if let Some(namespace) = def.namespace.as_deref().or(self.namespace.as_deref()) {
                builder = builder.namespace(namespace);
            }
            if let Some(template_name) = def.template_name.as_deref() {
                builder = builder.template_name(template_name);
            }
            if let Some(template_pattern) = def.template_pattern.as_deref() {
                builder = builder.template_pattern(template_pattern);
            }
            if def.is_abstract {
                builder = builder.abstract_base();
            }
            if let Some(parent_name) = &def.inherit {
                let parent = abstract_types.get(parent_name).ok_or_else(|| {
                    anyhow!(
                        "metric '{}' inherits unknown abstract type '{parent_name}'",
                        def.name
                    )
                })?;
                builder = builder.inherit(parent);
            }
            if let Some(source_enabled) = def.source_enabled {
                builder = builder.source_enabled(source_enabled);
            }
            for (field_name, value) in &def.fields {
                builder = builder.field(field_name.as_str(), parse_field(field_name, value)?);
            }
            for (key, value) in &def.settings {
                builder = builder.index_setting(key.as_str(), toml_to_json(value));
            }

            let metric = builder
                .declare(registry)
                .with_context(|| format!("declaring metric '{}'", def.name))?;
            if metric.is_abstract() {
                abstract_types.insert(def.name.clone(), metric);
            }
        }

        if !self.metrics.is_empty() && registry.is_empty() {
            bail!("definitions file declares only abstract metric types");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_definitions(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_and_apply() {
        let file = write_definitions(
            r#"
            namespace = "osf"

            [[metric]]
            name = "UserEvent"
            abstract = true
            fields = { user_id = "integer" }

            [[metric]]
            name = "PageView"
            inherit = "UserEvent"
            fields = { path = "keyword", duration = { type = "double", required = true } }
            settings = { number_of_shards = 2, refresh_interval = "5s" }

            [[metric]]
            name = "Download"
            namespace = "files"
            template_name = "files_downloads"
            "#,
        );

        let definitions = DefinitionsFile::load(file.path()).unwrap();
        let registry = Registry::new();
        definitions.apply(&registry).unwrap();

        // Abstract base is not registered; the two concrete types are.
        assert_eq!(registry.len(), 2);

        let page_view = registry.get("osf", "PageView").unwrap();
        assert!(page_view.field("user_id").is_some());
        assert!(page_view.field("path").is_some());
        assert!(page_view.field("duration").unwrap().is_required());
        assert_eq!(
            page_view.index_settings()[0],
            ("number_of_shards".to_string(), serde_json::json!(2))
        );

        let download = registry.get("files", "Download").unwrap();
        assert_eq!(download.template_name(), "files_downloads");
        // Asymmetric fallback: pattern is synthesized, not borrowed.
        assert_eq!(download.template_pattern(), "files_download-*");
    }

    #[test]
    fn test_unknown_inherit_reference() {
        let file = write_definitions(
            r#"
            namespace = "osf"

            [[metric]]
            name = "PageView"
            inherit = "Nope"
            "#,
        );
        let definitions = DefinitionsFile::load(file.path()).unwrap();
        let registry = Registry::new();
        let err = definitions.apply(&registry).unwrap_err();
        assert!(err.to_string().contains("unknown abstract type 'Nope'"));
    }

    #[test]
    fn test_unknown_field_type() {
        let file = write_definitions(
            r#"
            namespace = "osf"

            [[metric]]
            name = "PageView"
            fields = { loc = "geoshape" }
            "#,
        );
        let definitions = DefinitionsFile::load(file.path()).unwrap();
        let registry = Registry::new();
        let err = definitions.apply(&registry).unwrap_err();
        assert!(err.to_string().contains("unknown field type 'geoshape'"));
    }

    #[test]
    fn test_missing_namespace_aborts() {
        let file = write_definitions(
            r#"
            [[metric]]
            name = "PageView"
            "#,
        );
        let definitions = DefinitionsFile::load(file.path()).unwrap();
        let registry = Registry::new();
        assert!(definitions.apply(&registry).is_err());
    }

    #[test]
    fn test_only_abstract_types_rejected() {
        let file = write_definitions(
            r#"
            namespace = "osf"

            [[metric]]
            name = "UserEvent"
            abstract = true
            "#,
        );
        let definitions = DefinitionsFile::load(file.path()).unwrap();
        let registry = Registry::new();
        let err = definitions.apply(&registry).unwrap_err();
        assert!(err.to_string().contains("only abstract"));
    }
}
