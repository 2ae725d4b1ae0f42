//! Session behaviour against the in-memory browser.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use swm::protocol::{MESSAGING_HANDLE, Response};
use swm::transport::fake::{FakeBrowserBuilder, FakeBrowserController};
use swm::{
    Error, JsonResource, JsonResourceCodec, MessageHandler, Session, SessionConfig,
    SessionListener,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

fn init_tracing() {
    tracing_subscriber::fmt().with_test_writer().try_init().ok();
}

fn start(config: SessionConfig) -> (Session<JsonResourceCodec>, Arc<FakeBrowserController>) {
    init_tracing();
    let (browser, controller) = FakeBrowserBuilder::new().name("TestBrowser").build();
    let handler = Arc::new(MessageHandler::new(JsonResourceCodec));
    let session = Session::new(config, Arc::new(browser), handler).unwrap();
    (session, Arc::new(controller))
}

fn config() -> SessionConfig {
    SessionConfig::builder()
        .target_url("https://forms.example/launch")
        .build()
        .unwrap()
}

fn message_type(raw: &str) -> String {
    let value: Value = serde_json::from_str(raw).unwrap();
    value["messageType"].as_str().unwrap().to_string()
}

struct Recorder {
    events: mpsc::UnboundedSender<String>,
}

impl SessionListener<JsonResource> for Recorder {
    fn on_handshake_received(&self) {
        let _ = self.events.send("handshake".into());
    }

    fn on_form_submitted(&self, response: &JsonResource, outcome: Option<&JsonResource>) {
        let _ = self.events.send(format!(
            "form:{}:{}",
            response.id().unwrap_or_default(),
            outcome.is_some()
        ));
    }

    fn on_close_requested(&self) {
        let _ = self.events.send("close".into());
    }
}

struct Exploding;

impl SessionListener<JsonResource> for Exploding {
    fn on_handshake_received(&self) {
        panic!("listener exploded");
    }
}

#[tokio::test]
async fn loads_target_url_and_wires_the_browser() {
    let (session, controller) = start(config());

    assert_eq!(controller.loaded_urls(), ["https://forms.example/launch"]);
    assert!(controller.has_handler());
    assert_eq!(session.target_url(), "https://forms.example/launch");
    assert!(!session.is_handshake_complete());
}

#[tokio::test]
async fn failed_initial_load_unwinds_the_wiring() {
    init_tracing();
    let (browser, controller) = FakeBrowserBuilder::new().build();
    controller.fail_loads(true);
    let handler = Arc::new(MessageHandler::new(JsonResourceCodec));

    let err = Session::new(config(), Arc::new(browser), Arc::clone(&handler))
        .err()
        .expect("load failure should fail the session");

    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(handler.events().listener_count(), 0);
    assert!(!handler.has_message_sender());
    assert!(matches!(
        handler.send_form_persist(None),
        Err(Error::TransportNotConfigured)
    ));
    assert_eq!(controller.deliver_handshake("hs-1"), None);
}

#[test]
fn session_requires_a_runtime() {
    let (browser, controller) = FakeBrowserBuilder::new().build();
    let handler = Arc::new(MessageHandler::new(JsonResourceCodec));

    let err = Session::new(config(), Arc::new(browser), Arc::clone(&handler))
        .err()
        .expect("no runtime should fail the session");

    assert!(matches!(err, Error::NoRuntime(_)));
    assert!(!handler.has_message_sender());
    assert!(controller.loaded_urls().is_empty());
}

#[tokio::test]
async fn sdc_endpoint_only_loads_generated_page() {
    let config = SessionConfig::builder()
        .sdc_endpoint_address("https://sdc.example/fhir")
        .build()
        .unwrap();
    let (session, controller) = start(config);

    assert!(session.target_url().starts_with("file://"));
    assert_eq!(controller.loaded_urls(), [session.target_url()]);
}

#[tokio::test(start_paused = true)]
async fn wait_for_handshake_times_out() {
    let (session, _controller) = start(config());
    let started = Instant::now();

    let err = session.wait_for_handshake().await.unwrap_err();

    assert!(matches!(err, Error::HandshakeTimeout(timeout) if timeout == Duration::from_secs(30)));
    assert_eq!(err.error_type(), "TimeoutException");
    assert!(started.elapsed() >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn wait_for_handshake_resolves_when_handshake_arrives() {
    let (session, controller) = start(config());
    let started = Instant::now();

    let document = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            controller.deliver_handshake("hs-1")
        }
    });

    session.wait_for_handshake().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(30));
    assert!(session.is_handshake_complete());

    let reply: Value = serde_json::from_str(&document.await.unwrap().unwrap()).unwrap();
    assert_eq!(reply["responseToMessageId"], "hs-1");
}

#[tokio::test(start_paused = true)]
async fn session_remains_usable_after_a_timeout() {
    let (session, controller) = start(config());

    assert!(session.wait_for_handshake().await.is_err());
    controller.deliver_handshake("late-hs");
    session.wait_for_handshake().await.unwrap();
}

#[tokio::test]
async fn sends_wait_for_the_handshake() {
    let (session, controller) = start(config());

    let dispatch = session.request_submit().unwrap();
    tokio::task::yield_now().await;
    assert_eq!(controller.sent_count(), 0);

    controller.deliver_handshake("hs-1");
    dispatch.await.unwrap();

    assert_eq!(controller.sent_count(), 1);
    assert_eq!(message_type(&controller.sent()[0]), "ui.form.requestSubmit");
}

#[tokio::test]
async fn queued_sends_are_delivered_in_call_order() {
    let (session, controller) = start(config());
    let handler = session.handler();

    let persist = handler.send_form_persist(None).unwrap();
    let submit = session.request_submit().unwrap();
    let configure = handler
        .send_sdc_configure(
            Some("https://tx.example/fhir"),
            None,
            Some(json!({ "debug": true })),
            None,
        )
        .unwrap();

    controller.deliver_handshake("hs-1");
    persist.await.unwrap();
    submit.await.unwrap();
    configure.await.unwrap();

    let order: Vec<String> = controller.sent().iter().map(|raw| message_type(raw)).collect();
    assert_eq!(order, ["ui.form.persist", "ui.form.requestSubmit", "sdc.configure"]);
}

#[tokio::test]
async fn sends_after_the_handshake_go_straight_through() {
    let (session, controller) = start(config());
    controller.deliver_handshake("hs-1");
    session.wait_for_handshake().await.unwrap();

    session.request_submit().unwrap().await.unwrap();
    let raw = controller.next_sent().await.unwrap();
    let envelope: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(envelope["messagingHandle"], MESSAGING_HANDLE);
}

#[tokio::test]
async fn navigate_resets_gate_and_correlation_table() {
    let (session, controller) = start(config());
    let handler = session.handler();
    controller.deliver_handshake("hs-1");
    session.wait_for_handshake().await.unwrap();

    let answered = handler
        .send_form_persist(Some(Arc::new(|_: &Response| {})))
        .unwrap();
    let pending_id = answered.message_id().to_string();
    answered.await.unwrap();
    assert!(handler.has_pending_response_listener(&pending_id));

    session.navigate("https://forms.example/next").unwrap();

    assert!(!session.is_handshake_complete());
    assert!(!handler.has_pending_response_listener(&pending_id));
    assert_eq!(
        controller.loaded_urls(),
        ["https://forms.example/launch", "https://forms.example/next"]
    );

    let queued = session.request_submit().unwrap();
    tokio::task::yield_now().await;
    assert_eq!(controller.sent_count(), 1);

    controller.deliver_handshake("hs-2");
    queued.await.unwrap();
    assert_eq!(controller.sent_count(), 2);
}

#[tokio::test]
async fn messages_queued_before_navigation_are_discarded() {
    let (session, controller) = start(config());

    let stale = session.request_submit().unwrap();
    session.navigate("https://forms.example/next").unwrap();
    controller.deliver_handshake("hs-2");

    assert!(matches!(stale.await, Err(Error::Discarded)));
    assert_eq!(controller.sent_count(), 0);
}

#[tokio::test]
async fn listeners_are_notified_outside_message_handling() {
    let (session, controller) = start(config());
    let (tx, mut rx) = mpsc::unbounded_channel();
    session.add_listener(Arc::new(Exploding));
    session.add_listener(Arc::new(Recorder { events: tx }));

    controller.deliver_handshake("hs-1");
    controller.deliver(
        &json!({
            "messageId": "f-1",
            "messagingHandle": MESSAGING_HANDLE,
            "messageType": "form.submitted",
            "payload": { "response": { "resourceType": "QuestionnaireResponse", "id": "qr-9" } }
        })
        .to_string(),
    );
    controller.deliver(
        &json!({
            "messageId": "d-1",
            "messagingHandle": MESSAGING_HANDLE,
            "messageType": "ui.done",
            "payload": {}
        })
        .to_string(),
    );

    assert_eq!(rx.recv().await.as_deref(), Some("handshake"));
    assert_eq!(rx.recv().await.as_deref(), Some("form:qr-9:false"));
    assert_eq!(rx.recv().await.as_deref(), Some("close"));
}

#[tokio::test]
async fn removed_listeners_are_not_notified() {
    let (session, controller) = start(config());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (keep_tx, mut keep_rx) = mpsc::unbounded_channel();
    let removed = session.add_listener(Arc::new(Recorder { events: tx }));
    session.add_listener(Arc::new(Recorder { events: keep_tx }));

    assert!(session.remove_listener(removed));
    controller.deliver_handshake("hs-1");

    assert_eq!(keep_rx.recv().await.as_deref(), Some("handshake"));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn close_is_idempotent_and_disposes_the_browser() {
    let (session, controller) = start(config());
    let waiting = session.wait_for_handshake();
    let queued = session.request_submit().unwrap();

    session.close();
    session.close();

    assert!(session.is_closed());
    assert!(matches!(waiting.await, Err(Error::SessionClosed)));
    assert!(matches!(queued.await, Err(Error::SessionClosed)));
    assert!(matches!(session.navigate("https://forms.example/"), Err(Error::SessionClosed)));

    for _ in 0..100 {
        if controller.is_closed() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(controller.is_closed());
}
