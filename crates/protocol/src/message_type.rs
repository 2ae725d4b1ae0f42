//! Message type vocabulary.

/// Channel identifier carried by every request the host sends.
pub const MESSAGING_HANDLE: &str = "smart-web-messaging";

/// Document signals it is ready to receive instructions.
pub const STATUS_HANDSHAKE: &str = "status.handshake";
/// Document delivers a completed questionnaire response.
pub const FORM_SUBMITTED: &str = "form.submitted";
/// Document asks the host to close it.
pub const UI_DONE: &str = "ui.done";

pub const UI_FORM_REQUEST_SUBMIT: &str = "ui.form.requestSubmit";
pub const UI_FORM_PERSIST: &str = "ui.form.persist";
pub const SDC_CONFIGURE: &str = "sdc.configure";
pub const SDC_CONFIGURE_CONTEXT: &str = "sdc.configureContext";
pub const SDC_DISPLAY_QUESTIONNAIRE: &str = "sdc.displayQuestionnaire";

/// Request types the host knows how to service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundMessageType {
    Handshake,
    FormSubmitted,
    UiDone,
}

impl InboundMessageType {
    /// Looks up a wire `messageType`; `None` for anything outside the vocabulary.
    pub fn from_wire(message_type: &str) -> Option<Self> {
        match message_type {
            STATUS_HANDSHAKE => Some(Self::Handshake),
            FORM_SUBMITTED => Some(Self::FormSubmitted),
            UI_DONE => Some(Self::UiDone),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Handshake => STATUS_HANDSHAKE,
            Self::FormSubmitted => FORM_SUBMITTED,
            Self::UiDone => UI_DONE,
        }
    }
}

impl std::fmt::Display for InboundMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_vocabulary_round_trips() {
        for kind in [
            InboundMessageType::Handshake,
            InboundMessageType::FormSubmitted,
            InboundMessageType::UiDone,
        ] {
            assert_eq!(InboundMessageType::from_wire(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn outbound_types_are_not_inbound() {
        assert_eq!(InboundMessageType::from_wire(UI_FORM_REQUEST_SUBMIT), None);
        assert_eq!(InboundMessageType::from_wire("Status.Handshake"), None);
    }
}
