//! Field specifications for metric type schemas.
//!
//! A [`FieldSpec`] describes one declared field and knows how to render
//! itself into the store's wire mapping. The date constructor defaults its
//! timezone from the process-wide settings; everything else passes through
//! to the store unchanged.

use serde_json::{Map, Value};

use crate::config;

/// Store-side type of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Exact-match string.
    Keyword,
    /// Analyzed full-text string.
    Text,
    /// Boolean flag.
    Boolean,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Date/time value.
    Date,
    /// IP address.
    Ip,
    /// Nested object with its own properties.
    Object,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Keyword => "keyword",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Date => "date",
            Self::Ip => "ip",
            Self::Object => "object",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for FieldKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keyword" => Ok(Self::Keyword),
            "text" => Ok(Self::Text),
            "boolean" => Ok(Self::Boolean),
            "integer" => Ok(Self::Integer),
            "long" => Ok(Self::Long),
            "float" => Ok(Self::Float),
            "double" => Ok(Self::Double),
            "date" => Ok(Self::Date),
            "ip" => Ok(Self::Ip),
            "object" => Ok(Self::Object),
            other => Err(format!("unknown field type '{other}'")),
        }
    }
}

/// Specification of a single declared field.
///
/// # Example
///
/// ```
/// use shared::models::FieldSpec;
///
/// let field = FieldSpec::integer().required();
/// assert_eq!(field.to_mapping()["type"], "integer");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    kind: FieldKind,
    required: bool,
    doc_values: Option<bool>,
    index: Option<bool>,
    format: Option<String>,
    default_timezone: Option<String>,
    properties: Vec<(String, FieldSpec)>,
}

impl FieldSpec {
    fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            doc_values: None,
            index: None,
            format: None,
            default_timezone: None,
            properties: Vec::new(),
        }
    }

    /// Creates a keyword field.
    #[must_use]
    pub fn keyword() -> Self {
        Self::new(FieldKind::Keyword)
    }

    /// Creates a full-text field.
    #[must_use]
    pub fn text() -> Self {
        Self::new(FieldKind::Text)
    }

    /// Creates a boolean field.
    #[must_use]
    pub fn boolean() -> Self {
        Self::new(FieldKind::Boolean)
    }

    /// Creates an integer field.
    #[must_use]
    pub fn integer() -> Self {
        Self::new(FieldKind::Integer)
    }

    /// Creates a long field.
    #[must_use]
    pub fn long() -> Self {
        Self::new(FieldKind::Long)
    }

    /// Creates a float field.
    #[must_use]
    pub fn float() -> Self {
        Self::new(FieldKind::Float)
    }

    /// Creates a double field.
    #[must_use]
    pub fn double() -> Self {
        Self::new(FieldKind::Double)
    }

    /// Creates a date field.
    ///
    /// Unlike the other constructors, the default timezone is taken from
    /// the process-wide settings at construction time.
    #[must_use]
    pub fn date() -> Self {
        let mut spec = Self::new(FieldKind::Date);
        spec.default_timezone = config::settings().timezone;
        spec
    }

    /// Creates an IP address field.
    #[must_use]
    pub fn ip() -> Self {
        Self::new(FieldKind::Ip)
    }

    /// Creates an object field; add nested fields with
    /// [`FieldSpec::property`].
    #[must_use]
    pub fn object() -> Self {
        Self::new(FieldKind::Object)
    }

    /// Creates a field from the store's lowercase type name.
    ///
    /// # Errors
    ///
    /// Returns an error naming the type if it is not recognized.
    pub fn of_kind(kind: &str) -> Result<Self, String> {
        let kind: FieldKind = kind.parse()?;
        if kind == FieldKind::Date {
            Ok(Self::date())
        } else {
            Ok(Self::new(kind))
        }
    }

    /// Marks the field as required when records are validated at save time.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets whether the store keeps columnar doc values for the field.
    #[must_use]
    pub fn doc_values(mut self, enabled: bool) -> Self {
        self.doc_values = Some(enabled);
        self
    }

    /// Sets whether the field is indexed for search.
    #[must_use]
    pub fn index(mut self, enabled: bool) -> Self {
        self.index = Some(enabled);
        self
    }

    /// Sets the store-side value format (e.g. a date format).
    #[must_use]
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Overrides the default timezone for a date field.
    #[must_use]
    pub fn default_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.default_timezone = Some(timezone.into());
        self
    }

    /// Adds a nested field to an object field.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.properties.push((name.into(), spec));
        self
    }

    /// Returns the field's kind.
    #[must_use]
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Returns true if the field must be present when a record is saved.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Returns the timezone assumed when parsing naive date values, if any.
    #[must_use]
    pub fn timezone(&self) -> Option<&str> {
        self.default_timezone.as_deref()
    }

    /// Renders the field into its wire mapping.
    ///
    /// `required` and `default_timezone` are client-side concerns and are
    /// deliberately not emitted. Deterministic for a given spec.
    #[must_use]
    pub fn to_mapping(&self) -> Value {
        let mut mapping = Map::new();
        mapping.insert("type".to_string(), Value::String(self.kind.to_string()));
        if let Some(doc_values) = self.doc_values {
            mapping.insert("doc_values".to_string(), Value::Bool(doc_values));
        }
        if let Some(index) = self.index {
            mapping.insert("index".to_string(), Value::Bool(index));
        }
        if let Some(format) = &self.format {
            mapping.insert("format".to_string(), Value::String(format.clone()));
        }
        if !self.properties.is_empty() {
            let mut properties = Map::new();
            for (name, spec) in &self.properties {
                properties.insert(name.clone(), spec.to_mapping());
            }
            mapping.insert("properties".to_string(), Value::Object(properties));
        }
        Value::Object(mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{self, test_support, Settings};
    use serde_json::json;

    #[test]
    fn test_simple_field_mapping() {
        let field = FieldSpec::keyword().index(false);
        assert_eq!(field.to_mapping(), json!({"type": "keyword", "index": false}));
    }

    #[test]
    fn test_required_not_emitted_in_mapping() {
        let field = FieldSpec::integer().required();
        assert!(field.is_required());
        assert_eq!(field.to_mapping(), json!({"type": "integer"}));
    }

    #[test]
    fn test_date_field_defaults_timezone_from_settings() {
        let _guard = test_support::settings_guard();
        config::configure(Settings {
            timezone: Some("America/Chicago".to_string()),
            ..Settings::default()
        });

        let field = FieldSpec::date();
        assert_eq!(field.timezone(), Some("America/Chicago"));
        // Timezone is a parsing hint, never part of the wire mapping.
        assert_eq!(field.to_mapping(), json!({"type": "date"}));

        let overridden = FieldSpec::date().default_timezone("Europe/Berlin");
        assert_eq!(overridden.timezone(), Some("Europe/Berlin"));

        config::reset_settings();
        let field = FieldSpec::date();
        assert_eq!(field.timezone(), None);
    }

    #[test]
    fn test_object_field_mapping() {
        let field = FieldSpec::object()
            .property("country", FieldSpec::keyword())
            .property("latency_ms", FieldSpec::double());
        assert_eq!(
            field.to_mapping(),
            json!({
                "type": "object",
                "properties": {
                    "country": {"type": "keyword"},
                    "latency_ms": {"type": "double"},
                },
            })
        );
    }

    #[test]
    fn test_of_kind() {
        assert_eq!(FieldSpec::of_kind("long").unwrap().kind(), FieldKind::Long);
        assert!(FieldSpec::of_kind("geoshape").is_err());
    }

    #[test]
    fn test_kind_display_roundtrip() {
        for kind in [
            FieldKind::Keyword,
            FieldKind::Text,
            FieldKind::Boolean,
            FieldKind::Integer,
            FieldKind::Long,
            FieldKind::Float,
            FieldKind::Double,
            FieldKind::Date,
            FieldKind::Ip,
            FieldKind::Object,
        ] {
            let parsed: FieldKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }
}
