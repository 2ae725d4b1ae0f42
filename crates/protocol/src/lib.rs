//! Wire types for the SMART Web Messaging protocol.
//!
//! Serde types for the JSON envelopes a host and its embedded document
//! exchange, exactly as they appear on the wire.
//!
//! Nothing here dispatches or correlates messages. The types only
//! (de)serialize and check envelope structure. Embedded clinical resources
//! stay raw JSON subtrees; `swm-rs` decodes them and builds the engine on
//! top.

pub mod envelope;
pub mod error;
pub mod message_type;
pub mod payload;

pub use envelope::*;
pub use error::EnvelopeError;
pub use message_type::{InboundMessageType, MESSAGING_HANDLE};
pub use payload::*;
