//! Event bus for document-originated requests.
//!
//! The engine decodes `status.handshake`, `form.submitted` and `ui.done` into
//! typed events and fans them out to every registered [`MessageListener`].
//! Listeners run synchronously on the thread that called
//! `handle_inbound_message`, in registration order.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{BoxError, Error, Result, panic_message};

/// Outcome of a single listener callback.
pub type ListenerResult = std::result::Result<(), BoxError>;

/// The document completed its handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeReceived {
    pub message_id: String,
    pub payload: Value,
}

/// The document submitted a questionnaire response.
#[derive(Debug, Clone, PartialEq)]
pub struct FormSubmitted<R> {
    pub message_id: String,
    pub response: R,
    pub outcome: Option<R>,
}

/// The document asked to be closed (`ui.done`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseApplication {
    pub message_id: String,
}

/// Receives typed events from the engine.
///
/// All methods default to doing nothing. Returning an error (or panicking)
/// turns the triggering request's reply into an error response; the other
/// listeners still run.
pub trait MessageListener<R>: Send + Sync {
    fn on_handshake_received(&self, _event: &HandshakeReceived) -> ListenerResult {
        Ok(())
    }

    fn on_form_submitted(&self, _event: &FormSubmitted<R>) -> ListenerResult {
        Ok(())
    }

    fn on_close_application(&self, _event: &CloseApplication) -> ListenerResult {
        Ok(())
    }
}

/// Handle returned when registering a listener; pass it back to remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered, removable set of listeners.
///
/// Dispatch iterates over a snapshot, so listeners may add or remove
/// listeners (including themselves) while being called.
pub(crate) struct ListenerSet<L: ?Sized> {
    next_id: AtomicU64,
    entries: RwLock<Vec<(ListenerId, Arc<L>)>>,
}

impl<L: ?Sized> ListenerSet<L> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, listener: Arc<L>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<L>> {
        self.entries
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fan-out of engine events to [`MessageListener`]s.
pub struct EventBus<R> {
    listeners: ListenerSet<dyn MessageListener<R>>,
}

impl<R> Default for EventBus<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> EventBus<R> {
    pub fn new() -> Self {
        Self {
            listeners: ListenerSet::new(),
        }
    }

    pub fn subscribe(&self, listener: Arc<dyn MessageListener<R>>) -> ListenerId {
        self.listeners.add(listener)
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn emit_handshake(&self, event: &HandshakeReceived) -> Result<()> {
        self.dispatch("handshake", |listener| listener.on_handshake_received(event))
    }

    pub fn emit_form_submitted(&self, event: &FormSubmitted<R>) -> Result<()> {
        self.dispatch("form_submitted", |listener| listener.on_form_submitted(event))
    }

    pub fn emit_close_application(&self, event: &CloseApplication) -> Result<()> {
        self.dispatch("close_application", |listener| {
            listener.on_close_application(event)
        })
    }

    /// Calls every listener; the first failure is returned once all have run.
    fn dispatch<F>(&self, event: &'static str, mut call: F) -> Result<()>
    where
        F: FnMut(&dyn MessageListener<R>) -> ListenerResult,
    {
        let listeners = self.listeners.snapshot();
        debug!(target = "swm::events", event, listeners = listeners.len(), "dispatching");

        let mut first_failure = None;
        for listener in listeners {
            let outcome = match catch_unwind(AssertUnwindSafe(|| call(listener.as_ref()))) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(panic) => panic_message(panic),
            };
            error!(target = "swm::events", event, error = %outcome, "listener failed");
            first_failure.get_or_insert(outcome);
        }

        match first_failure {
            Some(message) => Err(Error::HandlerFailure(message)),
            None => Ok(()),
        }
    }
}
