//! In-memory browser for exercising sessions without a real web view.
//!
//! # Example
//!
//! ```ignore
//! let (browser, controller) = FakeBrowserBuilder::new().build();
//! let session = Session::new(config, Arc::new(browser), handler)?;
//!
//! let reply = controller.deliver_handshake("hs-1");
//! session.wait_for_handshake().await?;
//! let sent = controller.next_sent().await;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::json;
use swm_protocol::MESSAGING_HANDLE;
use swm_protocol::message_type::STATUS_HANDSHAKE;
use tokio::sync::mpsc;
use tracing::warn;

use super::{EmbeddedBrowser, IncomingHandler, PageLoadListener, SendFuture};
use crate::error::{Error, Result};

/// Builder for [`FakeBrowser`] instances.
pub struct FakeBrowserBuilder {
    name: String,
}

impl FakeBrowserBuilder {
    pub fn new() -> Self {
        Self {
            name: "FakeBrowser".to_string(),
        }
    }

    /// Adapter name reported to the session.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builds the browser and a controller that drives and inspects it.
    pub fn build(self) -> (FakeBrowser, FakeBrowserController) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let state = Arc::new(FakeState {
            name: self.name,
            handler: Mutex::new(None),
            page_load_listeners: Mutex::new(Vec::new()),
            loaded_urls: Mutex::new(Vec::new()),
            scripts: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            sent_tx,
            fail_sends: AtomicBool::new(false),
            fail_loads: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        let controller = FakeBrowserController {
            state: Arc::clone(&state),
            sent_rx: tokio::sync::Mutex::new(sent_rx),
        };

        (FakeBrowser { state }, controller)
    }
}

impl Default for FakeBrowserBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct FakeState {
    name: String,
    handler: Mutex<Option<IncomingHandler>>,
    page_load_listeners: Mutex<Vec<PageLoadListener>>,
    loaded_urls: Mutex<Vec<String>>,
    scripts: Mutex<Vec<String>>,
    sent: Mutex<Vec<String>>,
    sent_tx: mpsc::UnboundedSender<String>,
    fail_sends: AtomicBool,
    fail_loads: AtomicBool,
    closed: AtomicBool,
}

/// Browser half handed to a session.
#[derive(Clone)]
pub struct FakeBrowser {
    state: Arc<FakeState>,
}

impl EmbeddedBrowser for FakeBrowser {
    fn name(&self) -> &str {
        &self.state.name
    }

    fn load_url(&self, url: &str) -> Result<()> {
        if self.state.fail_loads.load(Ordering::SeqCst) {
            return Err(Error::Transport(format!("fake browser could not load {url}")));
        }
        self.state.loaded_urls.lock().push(url.to_string());
        Ok(())
    }

    fn execute_script(&self, script: &str) -> Result<()> {
        self.state.scripts.lock().push(script.to_string());
        Ok(())
    }

    fn set_incoming_handler(&self, handler: IncomingHandler) {
        *self.state.handler.lock() = Some(handler);
    }

    fn send_message(&self, message: &str) -> SendFuture {
        let result = if self.state.fail_sends.load(Ordering::SeqCst) {
            Err(Error::Transport("fake browser rejected the message".into()))
        } else {
            self.state.sent.lock().push(message.to_string());
            let _ = self.state.sent_tx.send(message.to_string());
            Ok(None)
        };
        Box::pin(std::future::ready(result))
    }

    fn add_page_load_listener(&self, listener: PageLoadListener) {
        self.state.page_load_listeners.lock().push(listener);
    }

    fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

/// Test-side handle: plays the document and inspects host output.
pub struct FakeBrowserController {
    state: Arc<FakeState>,
    sent_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
}

impl FakeBrowserController {
    /// Delivers a raw document message to the registered handler and returns
    /// its reply.
    pub fn deliver(&self, raw: &str) -> Option<String> {
        let handler = self.state.handler.lock().clone();
        match handler {
            Some(handler) => handler(raw),
            None => {
                warn!(target = "swm::fake", "no incoming handler registered; message dropped");
                None
            }
        }
    }

    /// Delivers a `status.handshake` request with the given id.
    pub fn deliver_handshake(&self, message_id: &str) -> Option<String> {
        let raw = json!({
            "messageId": message_id,
            "messagingHandle": MESSAGING_HANDLE,
            "messageType": STATUS_HANDSHAKE,
            "payload": {}
        });
        self.deliver(&raw.to_string())
    }

    /// Everything the host pushed into the document so far.
    pub fn sent(&self) -> Vec<String> {
        self.state.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.state.sent.lock().len()
    }

    /// Waits for the next message the host pushes into the document.
    pub async fn next_sent(&self) -> Option<String> {
        self.sent_rx.lock().await.recv().await
    }

    pub fn loaded_urls(&self) -> Vec<String> {
        self.state.loaded_urls.lock().clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.state.scripts.lock().clone()
    }

    /// Simulates the main frame finishing a load.
    pub fn fire_page_load(&self) {
        let listeners = self.state.page_load_listeners.lock().clone();
        for listener in listeners {
            listener();
        }
    }

    /// Makes subsequent sends fail with a transport error.
    pub fn fail_sends(&self, fail: bool) {
        self.state.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent `load_url` calls fail.
    pub fn fail_loads(&self, fail: bool) {
        self.state.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn has_handler(&self) -> bool {
        self.state.handler.lock().is_some()
    }
}
