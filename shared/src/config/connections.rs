//! Named store connections.
//!
//! A process-wide map from connection name to a [`StoreClient`], mirroring
//! the store-connection map in application configuration. The registry of
//! connections is looked up at each call site; callers never hold a stale
//! snapshot.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use crate::storage::{StoreClient, StoreError};

/// Name of the connection used when none is given.
pub const DEFAULT_CONNECTION: &str = "default";

static CONNECTIONS: LazyLock<RwLock<HashMap<String, Arc<dyn StoreClient>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Registers (or replaces) a store connection under `name`.
pub fn add_connection(name: impl Into<String>, client: Arc<dyn StoreClient>) {
    let mut connections = CONNECTIONS
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    connections.insert(name.into(), client);
}

/// Returns the connection registered under `name`, defaulting to
/// [`DEFAULT_CONNECTION`] when `None`.
///
/// # Errors
///
/// Returns [`StoreError::UnknownConnection`] if no connection is registered
/// under that name.
pub fn get_connection(name: Option<&str>) -> Result<Arc<dyn StoreClient>, StoreError> {
    let name = name.unwrap_or(DEFAULT_CONNECTION);
    let connections = CONNECTIONS
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    connections
        .get(name)
        .cloned()
        .ok_or_else(|| StoreError::UnknownConnection {
            name: name.to_string(),
        })
}

/// Removes the connection registered under `name`, if any.
pub fn remove_connection(name: &str) {
    let mut connections = CONNECTIONS
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    connections.remove(name);
}

/// Removes all registered connections. Intended for tests.
pub fn reset_connections() {
    let mut connections = CONNECTIONS
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    connections.clear();
}
