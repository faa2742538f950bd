//! Data models for metric types and records.

pub mod field;
pub mod metric_type;
pub mod record;

pub use field::{FieldKind, FieldSpec};
pub use metric_type::{DeclarationError, MetricType, MetricTypeBuilder};
pub use record::{MetricRecord, RecordError};
