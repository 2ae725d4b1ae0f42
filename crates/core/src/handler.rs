//! The protocol engine: inbound dispatch and outbound correlation.
//!
//! # Inbound
//!
//! 1. The transport hands raw text to [`MessageHandler::handle_inbound_message`]
//! 2. The text is parsed into a request or a response envelope
//! 3. Responses resolve the matching entry in the correlation table and never
//!    produce a reply
//! 4. Requests are dispatched by `messageType`, listeners are notified, and a
//!    reply is always produced, even for malformed input
//!
//! # Outbound
//!
//! 1. [`MessageHandler::send_async`] generates a UUID `messageId`
//! 2. The optional response callback is stored under that id
//! 3. The envelope is serialized and handed to the configured
//!    [`MessageSender`]; the returned [`Dispatch`] resolves with its
//!    acknowledgment
//! 4. When a response with `responseToMessageId == messageId` arrives, the
//!    callback runs; it stays registered only while
//!    `additionalResponsesExpected` is `true`

use std::collections::HashMap;
use std::future::IntoFuture;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::{self, BoxFuture};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use swm_protocol::message_type::{
    SDC_CONFIGURE, SDC_CONFIGURE_CONTEXT, SDC_DISPLAY_QUESTIONNAIRE, UI_FORM_PERSIST,
    UI_FORM_REQUEST_SUBMIT,
};
use swm_protocol::{
    Envelope, InboundMessageType, MESSAGING_HANDLE, Request, RequestPayload, Response,
};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::codec::{FormContext, PayloadCodec, QuestionnaireRef, ResourceCodec};
use crate::error::{Error, Result, panic_message};
use crate::events::{
    CloseApplication, EventBus, FormSubmitted, HandshakeReceived, ListenerId, MessageListener,
};
use crate::scan::{message_id_from_json, message_type_from_json};
use crate::transport::{Acknowledgment, MessageSender};

/// Callback stored in the correlation table.
pub type ResponseCallback = Arc<dyn Fn(&Response) + Send + Sync>;

/// An outbound message that has been handed to the transport.
///
/// Await it (or call [`Dispatch::acknowledged`]) for the transport's
/// acknowledgment. Dropping it does not cancel the send.
#[must_use = "a Dispatch carries the transport acknowledgment; await it or drop it explicitly"]
pub struct Dispatch {
    message_id: String,
    ack: BoxFuture<'static, Result<Acknowledgment>>,
}

impl Dispatch {
    /// The generated `messageId` of the outbound request.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub async fn acknowledged(self) -> Result<Acknowledgment> {
        self.ack.await
    }
}

impl IntoFuture for Dispatch {
    type Output = Result<Acknowledgment>;
    type IntoFuture = BoxFuture<'static, Result<Acknowledgment>>;

    fn into_future(self) -> Self::IntoFuture {
        self.ack
    }
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatch")
            .field("message_id", &self.message_id)
            .finish_non_exhaustive()
    }
}

/// SMART Web Messaging engine for one embedded document.
///
/// All methods take `&self`; the handler is meant to be shared behind an
/// `Arc` between the transport callback and application code.
pub struct MessageHandler<C: ResourceCodec> {
    codec: PayloadCodec<C>,
    events: EventBus<C::Resource>,
    response_listeners: Mutex<HashMap<String, ResponseCallback>>,
    sender: RwLock<Option<Arc<dyn MessageSender>>>,
    sent: AtomicU64,
}

impl<C: ResourceCodec + Default> Default for MessageHandler<C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}

impl<C: ResourceCodec> MessageHandler<C> {
    pub fn new(resources: C) -> Self {
        debug!(target = "swm::handler", "message handler initialized");
        Self {
            codec: PayloadCodec::new(resources),
            events: EventBus::new(),
            response_listeners: Mutex::new(HashMap::new()),
            sender: RwLock::new(None),
            sent: AtomicU64::new(0),
        }
    }

    pub fn codec(&self) -> &PayloadCodec<C> {
        &self.codec
    }

    pub fn events(&self) -> &EventBus<C::Resource> {
        &self.events
    }

    /// Wires the outbound transport. Replaces any previous sender.
    pub fn set_message_sender(&self, sender: Arc<dyn MessageSender>) {
        *self.sender.write() = Some(sender);
    }

    /// Removes the outbound transport; later sends fail with
    /// [`Error::TransportNotConfigured`].
    pub fn clear_message_sender(&self) {
        *self.sender.write() = None;
    }

    pub fn has_message_sender(&self) -> bool {
        self.sender.read().is_some()
    }

    pub fn add_listener(&self, listener: Arc<dyn MessageListener<C::Resource>>) -> ListenerId {
        self.events.subscribe(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Number of requests handed to the transport so far.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    // ── Inbound ──────────────────────────────────────────────────────────────

    /// Processes one message from the document.
    ///
    /// Returns the serialized reply for requests (an error response when the
    /// request is malformed, unknown or its handling failed) and `None` for
    /// responses. Never panics on behalf of listeners or resource codecs.
    pub fn handle_inbound_message(&self, raw: &str) -> Option<String> {
        debug!(
            target = "swm::handler",
            message_type = message_type_from_json(raw),
            len = raw.len(),
            "inbound message"
        );

        match Envelope::parse(raw) {
            Ok(Envelope::Response(response)) => {
                self.handle_response(response);
                None
            }
            Ok(Envelope::Request(request)) => encode_reply(&self.handle_request(request)),
            Err(err) => {
                let recovered = message_id_from_json(raw).map(str::to_string);
                error!(
                    target = "swm::handler",
                    error = %err,
                    message_id = recovered.as_deref().unwrap_or("<none>"),
                    "failed to parse inbound message"
                );
                let err = Error::from(err);
                encode_reply(&Response::error(
                    new_message_id(),
                    recovered,
                    err.to_error_response(),
                ))
            }
        }
    }

    fn handle_request(&self, request: Request) -> Response {
        info!(
            target = "swm::handler",
            message_id = %request.message_id,
            message_type = %request.message_type,
            "handling request"
        );

        let outcome = catch_unwind(AssertUnwindSafe(|| self.dispatch_request(&request)))
            .unwrap_or_else(|panic| Err(Error::HandlerFailure(panic_message(panic))));

        match outcome {
            Ok(()) => Response::empty_success(new_message_id(), request.message_id),
            Err(err) => {
                if matches!(err, Error::UnknownMessageType(_)) {
                    warn!(
                        target = "swm::handler",
                        message_id = %request.message_id,
                        message_type = %request.message_type,
                        "unknown message type"
                    );
                } else {
                    error!(
                        target = "swm::handler",
                        message_id = %request.message_id,
                        message_type = %request.message_type,
                        error = %err,
                        "request handling failed"
                    );
                }
                Response::error(
                    new_message_id(),
                    Some(request.message_id),
                    err.to_error_response(),
                )
            }
        }
    }

    fn dispatch_request(&self, request: &Request) -> Result<()> {
        let Some(kind) = InboundMessageType::from_wire(&request.message_type) else {
            return Err(Error::UnknownMessageType(request.message_type.clone()));
        };

        match kind {
            InboundMessageType::Handshake => self.events.emit_handshake(&HandshakeReceived {
                message_id: request.message_id.clone(),
                payload: request.payload.clone(),
            }),
            InboundMessageType::FormSubmitted => {
                let (response, outcome) = self.codec.decode_form_submit(&request.payload)?;
                self.events.emit_form_submitted(&FormSubmitted {
                    message_id: request.message_id.clone(),
                    response,
                    outcome,
                })
            }
            InboundMessageType::UiDone => self.events.emit_close_application(&CloseApplication {
                message_id: request.message_id.clone(),
            }),
        }
    }

    fn handle_response(&self, response: Response) {
        let Some(response_to) = response.response_to_message_id.as_deref() else {
            warn!(
                target = "swm::handler",
                message_id = %response.message_id,
                "response without responseToMessageId dropped"
            );
            return;
        };

        info!(
            target = "swm::handler",
            response_to,
            additional = response.additional_responses_expected,
            "handling response"
        );

        // Resolve under the lock, run the callback outside it.
        let callback = {
            let mut table = self.response_listeners.lock();
            if response.additional_responses_expected {
                table.get(response_to).cloned()
            } else {
                table.remove(response_to)
            }
        };

        let Some(callback) = callback else {
            warn!(
                target = "swm::handler",
                response_to,
                "no listener for response; dropping"
            );
            return;
        };

        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(&response))) {
            error!(
                target = "swm::handler",
                response_to,
                error = %panic_message(panic),
                "response listener failed"
            );
        }
    }

    // ── Outbound ─────────────────────────────────────────────────────────────

    /// Sends a request to the document.
    ///
    /// Fails synchronously with [`Error::TransportNotConfigured`] when no
    /// sender has been set. Serialization and transport failures surface
    /// through the returned [`Dispatch`].
    pub fn send_async(
        &self,
        message_type: &str,
        payload: RequestPayload,
        on_response: Option<ResponseCallback>,
    ) -> Result<Dispatch> {
        let sender = self
            .sender
            .read()
            .clone()
            .ok_or(Error::TransportNotConfigured)?;

        let message_id = new_message_id();
        info!(target = "swm::handler", %message_id, message_type, "sending message");

        let encoded = encode_request(&message_id, message_type, &payload);
        let ack: BoxFuture<'static, Result<Acknowledgment>> = match encoded {
            Ok(json) => {
                if let Some(callback) = on_response {
                    self.register_response_listener(message_id.clone(), callback);
                }
                self.sent.fetch_add(1, Ordering::Relaxed);
                debug!(target = "swm::handler", %message_id, %json, "outbound message");
                sender.send(json)
            }
            Err(err) => {
                error!(
                    target = "swm::handler",
                    %message_id,
                    error = %err,
                    "failed to serialize request"
                );
                Box::pin(future::ready(Err(err)))
            }
        };

        Ok(Dispatch { message_id, ack })
    }

    /// Sends a request and waits for its first response.
    ///
    /// Fails with [`Error::ChannelClosed`] if the correlation entry is
    /// cleared before a response arrives.
    pub async fn request(&self, message_type: &str, payload: RequestPayload) -> Result<Response> {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let callback: ResponseCallback = Arc::new(move |response: &Response| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(response.clone());
            }
        });

        let dispatch = self.send_async(message_type, payload, Some(callback))?;
        let message_id = dispatch.message_id().to_string();
        if let Err(err) = dispatch.await {
            self.unregister_response_listener(&message_id);
            return Err(err);
        }

        rx.await.map_err(|_| Error::ChannelClosed)
    }

    pub fn send_form_request_submit(
        &self,
        on_response: Option<ResponseCallback>,
    ) -> Result<Dispatch> {
        self.send_async(UI_FORM_REQUEST_SUBMIT, RequestPayload::Empty, on_response)
    }

    pub fn send_form_persist(&self, on_response: Option<ResponseCallback>) -> Result<Dispatch> {
        self.send_async(UI_FORM_PERSIST, RequestPayload::Empty, on_response)
    }

    pub fn send_sdc_configure(
        &self,
        terminology_server: Option<&str>,
        data_server: Option<&str>,
        configuration: Option<Value>,
        on_response: Option<ResponseCallback>,
    ) -> Result<Dispatch> {
        let payload = self
            .codec
            .encode_configure(terminology_server, data_server, configuration);
        self.send_async(SDC_CONFIGURE, payload, on_response)
    }

    pub fn send_sdc_configure_context(
        &self,
        context: &FormContext<C::Resource>,
        on_response: Option<ResponseCallback>,
    ) -> Result<Dispatch> {
        let payload = self.codec.encode_configure_context(context)?;
        self.send_async(SDC_CONFIGURE_CONTEXT, payload, on_response)
    }

    pub fn send_sdc_display_questionnaire(
        &self,
        questionnaire: &QuestionnaireRef<C::Resource>,
        questionnaire_response: Option<&C::Resource>,
        context: &FormContext<C::Resource>,
        on_response: Option<ResponseCallback>,
    ) -> Result<Dispatch> {
        let payload =
            self.codec
                .encode_display_questionnaire(questionnaire, questionnaire_response, context)?;
        self.send_async(SDC_DISPLAY_QUESTIONNAIRE, payload, on_response)
    }

    // ── Correlation table ────────────────────────────────────────────────────

    /// Registers a callback for responses to `message_id`, replacing any
    /// existing one.
    pub fn register_response_listener(
        &self,
        message_id: impl Into<String>,
        callback: ResponseCallback,
    ) {
        let message_id = message_id.into();
        debug!(target = "swm::handler", %message_id, "registered response listener");
        self.response_listeners.lock().insert(message_id, callback);
    }

    pub fn unregister_response_listener(&self, message_id: &str) -> bool {
        self.response_listeners.lock().remove(message_id).is_some()
    }

    pub fn has_pending_response_listener(&self, message_id: &str) -> bool {
        self.response_listeners.lock().contains_key(message_id)
    }

    pub fn pending_response_listeners(&self) -> usize {
        self.response_listeners.lock().len()
    }

    /// Drops every pending callback without invoking it.
    pub fn clear_all_response_listeners(&self) {
        let cleared = std::mem::take(&mut *self.response_listeners.lock());
        if !cleared.is_empty() {
            info!(
                target = "swm::handler",
                count = cleared.len(),
                "cleared pending response listeners"
            );
        }
    }
}

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

fn encode_request(
    message_id: &str,
    message_type: &str,
    payload: &RequestPayload,
) -> Result<String> {
    let request = Request {
        message_id: message_id.to_string(),
        messaging_handle: MESSAGING_HANDLE.to_string(),
        message_type: message_type.to_string(),
        payload: payload.to_value()?,
    };
    Ok(serde_json::to_string(&request)?)
}

fn encode_reply(response: &Response) -> Option<String> {
    match serde_json::to_string(response) {
        Ok(json) => {
            debug!(target = "swm::handler", %json, "reply");
            Some(json)
        }
        Err(err) => {
            error!(target = "swm::handler", error = %err, "failed to serialize reply");
            None
        }
    }
}
