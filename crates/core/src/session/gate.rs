//! Handshake gate: holds outbound messages until the document is ready.
//!
//! Gate state lives in a `watch` channel so waiters observe every change.
//! Outbound messages go through a single FIFO queue drained by one pump
//! task, which delivers them strictly in the order they were sent.
//!
//! Each message is stamped with the navigation it was sent under. If the
//! document navigates before that navigation's handshake, the message fails
//! with [`Error::Discarded`] rather than reaching the new document.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::scan::{message_id_from_json, message_type_from_json};
use crate::transport::{Acknowledgment, EmbeddedBrowser, MessageSender, SendFuture};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct GateState {
    navigation: u64,
    open: bool,
    closed: bool,
}

struct Queued {
    message: String,
    navigation: u64,
    done: oneshot::Sender<Result<Acknowledgment>>,
}

pub(crate) struct HandshakeGate {
    state: watch::Sender<GateState>,
    queue: mpsc::UnboundedSender<Queued>,
    pump: JoinHandle<()>,
}

impl HandshakeGate {
    /// Creates a closed gate and spawns its pump on `runtime`.
    pub(crate) fn new(runtime: &Handle, browser: Arc<dyn EmbeddedBrowser>) -> Self {
        let (state, state_rx) = watch::channel(GateState::default());
        let (queue, queue_rx) = mpsc::unbounded_channel();
        let pump = runtime.spawn(pump(queue_rx, state_rx, browser));
        Self { state, queue, pump }
    }

    /// Opens the gate for the current navigation. Returns `true` if it was
    /// closed before.
    pub(crate) fn open(&self) -> bool {
        self.state.send_if_modified(|state| {
            let opened = !state.open && !state.closed;
            state.open |= opened;
            opened
        })
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state.borrow().open
    }

    /// Starts a new navigation with the gate shut.
    pub(crate) fn reset(&self) {
        self.state.send_modify(|state| {
            state.navigation += 1;
            state.open = false;
        });
    }

    /// Shuts the gate for good. Queued and future sends fail with
    /// [`Error::SessionClosed`].
    pub(crate) fn close(&self) {
        self.state.send_modify(|state| state.closed = true);
    }

    /// Resolves once the gate opens, or fails if it closes first.
    pub(crate) fn opened(&self) -> impl Future<Output = Result<()>> + Send + use<> {
        let mut state = self.state.subscribe();
        async move {
            loop {
                let current = *state.borrow_and_update();
                if current.closed {
                    return Err(Error::SessionClosed);
                }
                if current.open {
                    return Ok(());
                }
                state.changed().await.map_err(|_| Error::SessionClosed)?;
            }
        }
    }

    pub(crate) fn sender(&self) -> GatedSender {
        GatedSender {
            state: self.state.subscribe(),
            queue: self.queue.clone(),
        }
    }
}

impl Drop for HandshakeGate {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// [`MessageSender`] that queues behind the handshake gate.
pub(crate) struct GatedSender {
    state: watch::Receiver<GateState>,
    queue: mpsc::UnboundedSender<Queued>,
}

impl MessageSender for GatedSender {
    fn send(&self, message: String) -> SendFuture {
        let current = *self.state.borrow();
        debug!(
            target = "swm::session",
            message_type = message_type_from_json(&message),
            message_id = message_id_from_json(&message).unwrap_or_default(),
            queued = !current.open,
            "message sent"
        );
        if current.closed {
            return Box::pin(std::future::ready(Err(Error::SessionClosed)));
        }

        let (done, result) = oneshot::channel();
        let queued = Queued {
            message,
            navigation: current.navigation,
            done,
        };
        if self.queue.send(queued).is_err() {
            return Box::pin(std::future::ready(Err(Error::SessionClosed)));
        }

        Box::pin(async move { result.await.unwrap_or(Err(Error::SessionClosed)) })
    }
}

async fn pump(
    mut queue: mpsc::UnboundedReceiver<Queued>,
    mut state: watch::Receiver<GateState>,
    browser: Arc<dyn EmbeddedBrowser>,
) {
    loop {
        let queued = tokio::select! {
            queued = queue.recv() => match queued {
                Some(queued) => queued,
                None => break,
            },
            () = wait_closed(state.clone()) => break,
        };

        let result = match await_turn(&mut state, queued.navigation).await {
            Ok(()) => browser.send_message(&queued.message).await,
            Err(err) => {
                warn!(
                    target = "swm::session",
                    message_id = message_id_from_json(&queued.message).unwrap_or_default(),
                    error = %err,
                    "queued message not delivered"
                );
                Err(err)
            }
        };
        let _ = queued.done.send(result);
    }
    debug!(target = "swm::session", "outbound pump stopped");
}

async fn wait_closed(mut state: watch::Receiver<GateState>) {
    loop {
        if state.borrow_and_update().closed {
            return;
        }
        if state.changed().await.is_err() {
            return;
        }
    }
}

/// Waits until a message stamped with `navigation` may be delivered.
async fn await_turn(state: &mut watch::Receiver<GateState>, navigation: u64) -> Result<()> {
    loop {
        let current = *state.borrow_and_update();
        if current.closed {
            return Err(Error::SessionClosed);
        }
        if current.navigation != navigation {
            return Err(Error::Discarded);
        }
        if current.open {
            return Ok(());
        }
        state.changed().await.map_err(|_| Error::SessionClosed)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::FakeBrowserBuilder;

    #[tokio::test]
    async fn queued_messages_flow_in_order_after_open() {
        let (browser, controller) = FakeBrowserBuilder::new().build();
        let gate = HandshakeGate::new(&Handle::current(), Arc::new(browser));
        let sender = gate.sender();

        let first = sender.send("one".into());
        let second = sender.send("two".into());
        tokio::task::yield_now().await;
        assert_eq!(controller.sent_count(), 0);

        assert!(gate.open());
        assert!(!gate.open());
        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(controller.sent(), ["one", "two"]);
    }

    #[tokio::test]
    async fn reset_discards_messages_from_the_previous_navigation() {
        let (browser, controller) = FakeBrowserBuilder::new().build();
        let gate = HandshakeGate::new(&Handle::current(), Arc::new(browser));
        let sender = gate.sender();

        let stale = sender.send("stale".into());
        gate.reset();
        let fresh = sender.send("fresh".into());
        gate.open();

        assert!(matches!(stale.await, Err(Error::Discarded)));
        fresh.await.unwrap();
        assert_eq!(controller.sent(), ["fresh"]);
    }

    #[tokio::test]
    async fn close_fails_pending_and_future_sends() {
        let (browser, _controller) = FakeBrowserBuilder::new().build();
        let gate = HandshakeGate::new(&Handle::current(), Arc::new(browser));
        let sender = gate.sender();
        let opened = gate.opened();

        let pending = sender.send("pending".into());
        gate.close();

        assert!(matches!(pending.await, Err(Error::SessionClosed)));
        assert!(matches!(sender.send("late".into()).await, Err(Error::SessionClosed)));
        assert!(matches!(opened.await, Err(Error::SessionClosed)));
    }
}
