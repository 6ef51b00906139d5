//! Messages exchanged by the sessions

use std::fmt;

/// Position of an outbound message in the send sequence, starting at 1
pub type SequenceId = u64;

/// Tag identifying an outbound delivery until its outcome is known
///
/// Deliveries are tagged with the sequence id of the message they carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeliveryTag(pub SequenceId);

impl From<SequenceId> for DeliveryTag {
    fn from(value: SequenceId) -> Self {
        Self(value)
    }
}

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message about to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Sequence id, also used as the AMQP message-id
    pub id: SequenceId,

    /// Message body
    pub payload: String,

    /// If `true`, the broker must persist the message before acknowledging it
    pub durable: bool,
}

impl OutboundMessage {
    /// Tag under which the delivery of this message is tracked
    pub fn tag(&self) -> DeliveryTag {
        DeliveryTag(self.id)
    }
}

/// A message handed over by a receiver link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Monotonic message identifier. `None` if the message carries no usable id,
    /// in which case no duplicate check is possible.
    pub id: Option<SequenceId>,

    /// Message body
    pub payload: String,
}

impl InboundMessage {
    /// Creates a message that carries an identifier
    pub fn with_id(id: SequenceId, payload: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            payload: payload.into(),
        }
    }

    /// Creates a message without an identifier
    pub fn without_id(payload: impl Into<String>) -> Self {
        Self {
            id: None,
            payload: payload.into(),
        }
    }
}
