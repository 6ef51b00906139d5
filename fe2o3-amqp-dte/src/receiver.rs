//! Delivers inbound messages to the application
//!
//! Message ids grow monotonically. A message is dropped as a duplicate when its
//! id is below the number of messages already received, or when it does not
//! go past the last id that was delivered.

use crate::message::InboundMessage;

/// Application side consumer of inbound messages
pub trait MessageSink {
    /// Takes a message that passed the duplicate check
    fn deliver(&mut self, message: &InboundMessage);
}

impl<F> MessageSink for F
where
    F: FnMut(&InboundMessage),
{
    fn deliver(&mut self, message: &InboundMessage) {
        (self)(message)
    }
}

impl MessageSink for Vec<InboundMessage> {
    fn deliver(&mut self, message: &InboundMessage) {
        self.push(message.clone());
    }
}

/// Result of dispatching one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The message was delivered
    Delivered,

    /// The message was delivered and it was the last one expected. The link
    /// and the connection must be closed now. This is returned exactly once.
    Complete,

    /// The message repeats an already processed position and was dropped
    Duplicate,

    /// The expected number of messages was already received
    Ignored,
}

/// Enforces the expected message count and drops duplicates
#[derive(Debug)]
pub struct ReceiveDispatcher {
    received: u64,
    expected: u64,
    last_id: Option<u64>,
}

impl ReceiveDispatcher {
    /// Creates a dispatcher expecting `expected` messages, `0` meaning no limit
    pub fn new(expected: u64) -> Self {
        Self {
            received: 0,
            expected,
            last_id: None,
        }
    }

    /// Handles an inbound message
    pub fn on_message<K: MessageSink>(&mut self, message: &InboundMessage, sink: &mut K) -> Dispatch {
        if let Some(id) = message.id {
            if self.is_duplicate(id) {
                #[cfg(feature = "tracing")]
                tracing::debug!(id, received = self.received, "Dropping duplicate");
                #[cfg(feature = "log")]
                log::debug!("Dropping duplicate {} (received {})", id, self.received);
                return Dispatch::Duplicate;
            }
        }

        if !self.is_unbounded() && self.received >= self.expected {
            return Dispatch::Ignored;
        }

        sink.deliver(message);
        self.received += 1;
        if message.id.is_some() {
            self.last_id = message.id;
        }

        if !self.is_unbounded() && self.received == self.expected {
            Dispatch::Complete
        } else {
            Dispatch::Delivered
        }
    }

    fn is_duplicate(&self, id: u64) -> bool {
        id < self.received || self.last_id.is_some_and(|last| id <= last)
    }

    /// Number of delivered messages
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Number of expected messages, `0` meaning no limit
    pub fn expected(&self) -> u64 {
        self.expected
    }

    /// Whether the session receives until it is stopped from outside
    pub fn is_unbounded(&self) -> bool {
        self.expected == 0
    }

    /// Whether the expected number of messages was received
    pub fn is_complete(&self) -> bool {
        !self.is_unbounded() && self.received >= self.expected
    }
}

#[cfg(test)]
mod tests {
    use crate::message::InboundMessage;

    use super::{Dispatch, ReceiveDispatcher};

    #[test]
    fn test_duplicate_is_dropped() {
        let mut sink = Vec::new();
        let mut dispatcher = ReceiveDispatcher::new(5);

        let results: Vec<_> = [1, 2, 2, 3, 4, 5]
            .into_iter()
            .map(|id| {
                let message = InboundMessage::with_id(id, format!("sequence{}", id));
                dispatcher.on_message(&message, &mut sink)
            })
            .collect();

        assert_eq!(
            results,
            [
                Dispatch::Delivered,
                Dispatch::Delivered,
                Dispatch::Duplicate,
                Dispatch::Delivered,
                Dispatch::Delivered,
                Dispatch::Complete,
            ]
        );
        assert_eq!(dispatcher.received(), 5);
        assert_eq!(sink.len(), 5);
    }

    #[test]
    fn test_ids_below_received_never_count() {
        let mut sink = Vec::new();
        let mut dispatcher = ReceiveDispatcher::new(0);
        for id in 1..=10 {
            dispatcher.on_message(&InboundMessage::with_id(id, "m"), &mut sink);
        }

        for id in 0..10 {
            let result = dispatcher.on_message(&InboundMessage::with_id(id, "dup"), &mut sink);
            assert_eq!(result, Dispatch::Duplicate);
            assert_eq!(dispatcher.received(), 10);
        }
    }

    #[test]
    fn test_first_message_with_id_zero_is_delivered() {
        let mut sink = Vec::new();
        let mut dispatcher = ReceiveDispatcher::new(3);

        let results: Vec<_> = [0, 0, 1, 2]
            .into_iter()
            .map(|id| dispatcher.on_message(&InboundMessage::with_id(id, "m"), &mut sink))
            .collect();

        assert_eq!(
            results,
            [
                Dispatch::Delivered,
                Dispatch::Duplicate,
                Dispatch::Delivered,
                Dispatch::Complete,
            ]
        );
        assert_eq!(sink[0].id, Some(0));
    }

    #[test]
    fn test_ids_below_received_count_without_earlier_ids() {
        let mut sink = Vec::new();
        let mut dispatcher = ReceiveDispatcher::new(0);
        for _ in 0..4 {
            dispatcher.on_message(&InboundMessage::without_id("m"), &mut sink);
        }

        let result = dispatcher.on_message(&InboundMessage::with_id(3, "late"), &mut sink);
        assert_eq!(result, Dispatch::Duplicate);
        let result = dispatcher.on_message(&InboundMessage::with_id(4, "next"), &mut sink);
        assert_eq!(result, Dispatch::Delivered);
        assert_eq!(dispatcher.received(), 5);
    }

    #[test]
    fn test_message_without_id_is_not_checked() {
        let mut sink = Vec::new();
        let mut dispatcher = ReceiveDispatcher::new(3);
        dispatcher.on_message(&InboundMessage::with_id(2, "a"), &mut sink);
        dispatcher.on_message(&InboundMessage::with_id(3, "b"), &mut sink);

        let result = dispatcher.on_message(&InboundMessage::without_id("c"), &mut sink);
        assert_eq!(result, Dispatch::Complete);
        assert_eq!(sink.last().map(|m| m.payload.as_str()), Some("c"));
    }

    #[test]
    fn test_unbounded_never_completes() {
        let mut count = 0;
        let mut sink = |_: &InboundMessage| count += 1;
        let mut dispatcher = ReceiveDispatcher::new(0);
        for _ in 0..1_000 {
            let result = dispatcher.on_message(&InboundMessage::without_id("m"), &mut sink);
            assert_eq!(result, Dispatch::Delivered);
        }
        assert!(!dispatcher.is_complete());
        assert_eq!(count, 1_000);
    }

    #[test]
    fn test_messages_past_expected_are_ignored() {
        let mut sink = Vec::new();
        let mut dispatcher = ReceiveDispatcher::new(1);
        assert_eq!(
            dispatcher.on_message(&InboundMessage::without_id("a"), &mut sink),
            Dispatch::Complete
        );
        assert_eq!(
            dispatcher.on_message(&InboundMessage::without_id("b"), &mut sink),
            Dispatch::Ignored
        );
        assert_eq!(sink.len(), 1);
    }
}
