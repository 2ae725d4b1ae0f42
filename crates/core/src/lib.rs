//! swm: host-side SMART Web Messaging engine.
//!
//! The host embeds an untrusted document (a form filler running in a web
//! view) and talks to it in JSON envelopes. This crate provides:
//!
//! * [`MessageHandler`]: parses and dispatches inbound messages, replies to
//!   requests, and correlates responses with the requests the host sent
//! * [`EventBus`] and [`MessageListener`]: typed events for handshake, form
//!   submission and close requests
//! * [`Session`]: ties a handler to an [`EmbeddedBrowser`], holding outbound
//!   traffic until the document's handshake and bounding the wait for it
//! * [`ResourceCodec`]: the seam where a FHIR model plugs in; the bundled
//!   [`JsonResourceCodec`] keeps resources as JSON
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use swm::{JsonResourceCodec, MessageHandler, Session, SessionConfig};
//!
//! let handler = Arc::new(MessageHandler::new(JsonResourceCodec));
//! let config = SessionConfig::builder()
//!     .sdc_endpoint_address("https://sdc.example/fhir")
//!     .build()?;
//! let session = Session::new(config, browser, Arc::clone(&handler))?;
//!
//! session.wait_for_handshake().await?;
//! session.request_submit()?.await?;
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod handler;
pub mod page;
pub mod scan;
pub mod session;
pub mod transport;

pub use swm_protocol as protocol;

pub use codec::{
    FormContext, JsonResource, JsonResourceCodec, LaunchContextEntry, PayloadCodec,
    QuestionnaireRef, ResourceCodec, ResourceKind, standard_launch_context,
};
pub use config::{
    DEFAULT_HANDSHAKE_TIMEOUT_SECS, DEFAULT_SDK_URL, SessionConfig, SessionConfigBuilder,
};
pub use error::{BoxError, Error, Result};
pub use events::{
    CloseApplication, EventBus, FormSubmitted, HandshakeReceived, ListenerId, ListenerResult,
    MessageListener,
};
pub use handler::{Dispatch, MessageHandler, ResponseCallback};
pub use scan::{message_id_from_json, message_type_from_json};
pub use session::{Session, SessionListener};
pub use transport::{Acknowledgment, EmbeddedBrowser, MessageSender, SendFuture};
