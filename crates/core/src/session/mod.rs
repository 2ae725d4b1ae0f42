//! Session controller: one embedded document driven by one engine.
//!
//! A [`Session`] wires a [`MessageHandler`] to an [`EmbeddedBrowser`] and
//! adds what the engine leaves out:
//!
//! * outbound messages wait behind a handshake gate that resets on every
//!   navigation
//! * [`Session::wait_for_handshake`] bounds the wait for the document with a
//!   timeout
//! * engine events are re-published to [`SessionListener`]s from a separate
//!   task, so slow listeners never stall message processing

mod gate;

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use self::gate::HandshakeGate;
use crate::codec::ResourceCodec;
use crate::config::SessionConfig;
use crate::error::{Error, Result, panic_message};
use crate::events::{
    CloseApplication, FormSubmitted, HandshakeReceived, ListenerId, ListenerResult, ListenerSet,
    MessageListener,
};
use crate::handler::{Dispatch, MessageHandler};
use crate::scan::{message_id_from_json, message_type_from_json};
use crate::transport::EmbeddedBrowser;

/// Receives session-level notifications.
///
/// Called from a Tokio task, never from inside message handling. Panics are
/// caught and logged.
pub trait SessionListener<R>: Send + Sync {
    fn on_handshake_received(&self) {}

    fn on_form_submitted(&self, _response: &R, _outcome: Option<&R>) {}

    fn on_close_requested(&self) {}
}

enum SessionEvent<R> {
    Handshake,
    FormSubmitted { response: R, outcome: Option<R> },
    CloseRequested,
}

impl<R> SessionEvent<R> {
    fn name(&self) -> &'static str {
        match self {
            SessionEvent::Handshake => "handshake_received",
            SessionEvent::FormSubmitted { .. } => "form_submitted",
            SessionEvent::CloseRequested => "close_requested",
        }
    }

    fn deliver(&self, listener: &dyn SessionListener<R>) {
        match self {
            SessionEvent::Handshake => listener.on_handshake_received(),
            SessionEvent::FormSubmitted { response, outcome } => {
                listener.on_form_submitted(response, outcome.as_ref())
            }
            SessionEvent::CloseRequested => listener.on_close_requested(),
        }
    }
}

/// Engine listener that opens the gate and forwards events to the notifier.
struct EngineBridge<R> {
    gate: Arc<HandshakeGate>,
    events: mpsc::UnboundedSender<SessionEvent<R>>,
}

impl<R: Clone + Send + Sync> MessageListener<R> for EngineBridge<R> {
    fn on_handshake_received(&self, event: &HandshakeReceived) -> ListenerResult {
        info!(target = "swm::session", message_id = %event.message_id, "handshake received");
        if !self.gate.open() {
            debug!(target = "swm::session", "gate already open");
        }
        let _ = self.events.send(SessionEvent::Handshake);
        Ok(())
    }

    fn on_form_submitted(&self, event: &FormSubmitted<R>) -> ListenerResult {
        info!(target = "swm::session", message_id = %event.message_id, "form submitted");
        let _ = self.events.send(SessionEvent::FormSubmitted {
            response: event.response.clone(),
            outcome: event.outcome.clone(),
        });
        Ok(())
    }

    fn on_close_application(&self, event: &CloseApplication) -> ListenerResult {
        info!(target = "swm::session", message_id = %event.message_id, "close requested");
        let _ = self.events.send(SessionEvent::CloseRequested);
        Ok(())
    }
}

/// A running form session.
///
/// Must be created inside a Tokio runtime. Closing is idempotent and also
/// happens on drop.
pub struct Session<C: ResourceCodec> {
    config: SessionConfig,
    target_url: String,
    browser: Arc<dyn EmbeddedBrowser>,
    handler: Arc<MessageHandler<C>>,
    gate: Arc<HandshakeGate>,
    listeners: Arc<ListenerSet<dyn SessionListener<C::Resource>>>,
    engine_listener: ListenerId,
    notifier: JoinHandle<()>,
    closed: AtomicBool,
}

impl<C: ResourceCodec> Session<C> {
    /// Wires the engine to the browser and loads the configured URL.
    ///
    /// Fails with [`Error::NoRuntime`] outside a Tokio runtime. If the load
    /// fails, the wiring is undone and the handler is left without a sender.
    pub fn new(
        config: SessionConfig,
        browser: Arc<dyn EmbeddedBrowser>,
        handler: Arc<MessageHandler<C>>,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current()?;
        let target_url = config.resolve_target_url()?;
        info!(
            target = "swm::session",
            url = %target_url,
            adapter = browser.name(),
            "session started"
        );

        let engine = Arc::downgrade(&handler);
        browser.set_incoming_handler(Arc::new(move |raw: &str| {
            debug!(
                target = "swm::session",
                message_type = message_type_from_json(raw),
                message_id = message_id_from_json(raw).unwrap_or_default(),
                "message received"
            );
            let handler = Weak::upgrade(&engine)?;
            handler.handle_inbound_message(raw)
        }));

        let gate = Arc::new(HandshakeGate::new(&runtime, Arc::clone(&browser)));
        handler.set_message_sender(Arc::new(gate.sender()));

        browser.add_page_load_listener(Arc::new(|| {
            debug!(target = "swm::session", "page loaded; bridge injected");
        }));

        let listeners = Arc::new(ListenerSet::new());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let engine_listener = handler.add_listener(Arc::new(EngineBridge {
            gate: Arc::clone(&gate),
            events: events_tx,
        }));
        let notifier = runtime.spawn(notify(events_rx, Arc::clone(&listeners)));

        if let Err(err) = browser.load_url(&target_url) {
            error!(target = "swm::session", url = %target_url, error = %err, "initial load failed");
            handler.remove_listener(engine_listener);
            handler.clear_message_sender();
            browser.set_incoming_handler(Arc::new(|_: &str| None));
            gate.close();
            notifier.abort();
            return Err(err);
        }

        Ok(Self {
            config,
            target_url,
            browser,
            handler,
            gate,
            listeners,
            engine_listener,
            notifier,
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// URL loaded when the session started.
    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub fn handler(&self) -> &Arc<MessageHandler<C>> {
        &self.handler
    }

    pub fn browser(&self) -> &Arc<dyn EmbeddedBrowser> {
        &self.browser
    }

    pub fn add_listener(&self, listener: Arc<dyn SessionListener<C::Resource>>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Whether the current document has completed its handshake.
    pub fn is_handshake_complete(&self) -> bool {
        self.gate.is_open()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves once the document's handshake has been received.
    ///
    /// Fails with [`Error::HandshakeTimeout`] after the configured timeout
    /// and with [`Error::SessionClosed`] if the session closes first. The
    /// session stays usable after a timeout.
    pub fn wait_for_handshake(&self) -> impl Future<Output = Result<()>> + Send + use<C> {
        let opened = self.gate.opened();
        let timeout = self.config.handshake_timeout();
        async move {
            match tokio::time::timeout(timeout, opened).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(target = "swm::session", ?timeout, "handshake timed out");
                    Err(Error::HandshakeTimeout(timeout))
                }
            }
        }
    }

    /// Loads a new document.
    ///
    /// The gate shuts until the new document's handshake, pending response
    /// callbacks are dropped, and messages still waiting for the old
    /// handshake fail with [`Error::Discarded`].
    pub fn navigate(&self, url: &str) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        info!(target = "swm::session", %url, "navigating");
        self.gate.reset();
        self.handler.clear_all_response_listeners();
        self.browser.load_url(url)
    }

    /// Asks the document to submit its form (`ui.form.requestSubmit`).
    pub fn request_submit(&self) -> Result<Dispatch> {
        info!(target = "swm::session", "requesting form submit");
        self.handler.send_form_request_submit(None)
    }

    /// Ends the session and disposes the browser on a blocking thread.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(target = "swm::session", "session closed");

        self.handler.remove_listener(self.engine_listener);
        self.gate.close();
        self.notifier.abort();

        let browser = Arc::clone(&self.browser);
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(move || browser.close());
            }
            Err(_) => {
                let spawned = std::thread::Builder::new()
                    .name("swm-dispose".into())
                    .spawn(move || browser.close());
                if let Err(err) = spawned {
                    error!(target = "swm::session", error = %err, "failed to dispose browser");
                }
            }
        }
    }
}

impl<C: ResourceCodec> Drop for Session<C> {
    fn drop(&mut self) {
        self.close();
    }
}

async fn notify<R>(
    mut events: mpsc::UnboundedReceiver<SessionEvent<R>>,
    listeners: Arc<ListenerSet<dyn SessionListener<R>>>,
) {
    while let Some(event) = events.recv().await {
        for listener in listeners.snapshot() {
            let delivered = catch_unwind(AssertUnwindSafe(|| event.deliver(listener.as_ref())));
            if let Err(panic) = delivered {
                error!(
                    target = "swm::session",
                    event = event.name(),
                    error = %panic_message(panic),
                    "session listener failed"
                );
            }
        }
    }
}
