//! Lifecycle notifications.
//!
//! Explicit observer lists fired around template creation and record
//! persistence. Listeners run synchronously, in registration order, and
//! panics are not caught; a misbehaving listener fails the operation it
//! observes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, RwLock};

use serde_json::Value;

use crate::models::MetricType;
use crate::template::IndexTemplate;

type Listener<P> = Arc<dyn Fn(&P) + Send + Sync>;

/// Handle returned by [`Signal::connect`], used to disconnect the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

/// A synchronous fan-out notification channel.
pub struct Signal<P> {
    listeners: RwLock<Vec<(ListenerId, Listener<P>)>>,
    next_id: AtomicU64,
}

impl<P> Default for Signal<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Signal<P> {
    /// Creates a signal with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Registers a listener; listeners fire in registration order.
    pub fn connect(&self, listener: impl Fn(&P) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        listeners.push((id, Arc::new(listener)));
        id
    }

    /// Removes a previously connected listener.
    pub fn disconnect(&self, id: ListenerId) {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        listeners.retain(|(listener_id, _)| *listener_id != id);
    }

    /// Removes all listeners. Intended for tests.
    pub fn disconnect_all(&self) {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        listeners.clear();
    }

    /// Fires the signal, invoking every listener with `payload`.
    ///
    /// The listener list is snapshotted before dispatch so a listener may
    /// connect or disconnect others without deadlocking.
    pub fn send(&self, payload: &P) {
        let snapshot: Vec<Listener<P>> = {
            let listeners = self
                .listeners
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in snapshot {
            listener(payload);
        }
    }
}

/// Payload for template lifecycle signals.
#[derive(Clone)]
pub struct TemplateEvent {
    /// Name of the metric type whose template is being created.
    pub metric_name: String,
    /// The index template descriptor being sent to the store.
    pub template: IndexTemplate,
    /// Name of the store connection in use.
    pub using: String,
}

/// Payload for record persistence signals.
#[derive(Clone)]
pub struct SaveEvent {
    /// The metric type the record belongs to.
    pub metric: Arc<MetricType>,
    /// The document being written, including the resolved timestamp.
    pub document: Value,
    /// Name of the store connection in use.
    pub using: String,
    /// The resolved target index.
    pub index: String,
}

/// Sent before an index template is created in the store.
pub static PRE_INDEX_TEMPLATE_CREATE: LazyLock<Signal<TemplateEvent>> =
    LazyLock::new(Signal::new);

/// Sent after an index template has been created in the store.
pub static POST_INDEX_TEMPLATE_CREATE: LazyLock<Signal<TemplateEvent>> =
    LazyLock::new(Signal::new);

/// Sent before a metric record is written to the store.
pub static PRE_SAVE: LazyLock<Signal<SaveEvent>> = LazyLock::new(Signal::new);

/// Sent after a metric record has been written to the store.
pub static POST_SAVE: LazyLock<Signal<SaveEvent>> = LazyLock::new(Signal::new);
