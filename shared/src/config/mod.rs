//! Configuration module for Tidemark.
//!
//! Process-wide settings (index date format, timezone, default namespace)
//! and the named store-connection map live here. Settings are read at each
//! call site rather than cached by callers, so reconfiguring takes effect
//! immediately.

pub mod connections;

pub use connections::{
    add_connection, get_connection, remove_connection, reset_connections, DEFAULT_CONNECTION,
};

use std::sync::{LazyLock, RwLock};

/// Date format used to derive dated index names when none is configured.
pub const DEFAULT_DATE_FORMAT: &str = "%Y.%m.%d";

/// Process-wide Tidemark settings.
///
/// Configuration values can be set via environment variables:
/// - `TIDEMARK_DATE_FORMAT`: strftime format for dated index suffixes
///   (default: `%Y.%m.%d`)
/// - `TIDEMARK_TIMEZONE`: default timezone applied to date fields
/// - `TIDEMARK_NAMESPACE`: fallback namespace for metric types that do not
///   declare one explicitly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// strftime format appended to a template name to form an index name.
    pub date_format: String,
    /// Default timezone for date fields, as the store understands it
    /// (e.g. "Europe/Berlin"). `None` leaves timezone handling to the store.
    pub timezone: Option<String>,
    /// Namespace assumed for metric types declared without one.
    pub default_namespace: Option<String>,
}

impl Settings {
    /// Creates settings from environment variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            date_format: std::env::var("TIDEMARK_DATE_FORMAT")
                .unwrap_or_else(|_| DEFAULT_DATE_FORMAT.to_string()),
            timezone: std::env::var("TIDEMARK_TIMEZONE").ok(),
            default_namespace: std::env::var("TIDEMARK_NAMESPACE").ok(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            timezone: None,
            default_namespace: None,
        }
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

/// Replaces the process-wide settings.
pub fn configure(settings: Settings) {
    let mut guard = SETTINGS.write().unwrap_or_else(std::sync::PoisonError::into_inner);
    *guard = settings;
}

/// Returns a snapshot of the current process-wide settings.
#[must_use]
pub fn settings() -> Settings {
    SETTINGS
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clone()
}

/// Restores the default settings. Intended for tests.
pub fn reset_settings() {
    configure(Settings::default());
}
