//! Tidemark Shared Library
//!
//! This crate contains the metric type registry, index template
//! synchronizer, and store clients used across Tidemark.
//!
//! # Modules
//!
//! - [`models`] - Metric type declaration, fields, and record persistence
//! - [`registry`] - Process-wide catalog of declared metric types
//! - [`template`] - Index template construction and drift checking
//! - [`storage`] - Store client trait and implementations
//! - [`signals`] - Lifecycle notifications
//! - [`config`] - Process-wide settings and named connections
//!
//! # Example
//!
//! ```
//! use shared::models::{FieldSpec, MetricType};
//! use shared::registry::Registry;
//!
//! let registry = Registry::new();
//! let page_view = MetricType::builder("PageView")
//!     .namespace("osf")
//!     .field("user_id", FieldSpec::integer())
//!     .declare(&registry)
//!     .unwrap();
//!
//! assert_eq!(page_view.template_name(), "osf_pageview");
//! assert_eq!(page_view.template_pattern(), "osf_pageview-*");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod models;
pub mod registry;
pub mod signals;
pub mod storage;
pub mod template;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde;
pub use serde_json;
