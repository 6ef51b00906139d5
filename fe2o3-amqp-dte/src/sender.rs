//! Credit driven send flow control
//!
//! There is no local send queue. The controller only knows how many messages
//! remain to be sent and sends at most as many as the peer allowed.

use crate::{
    config::Qos,
    error::LinkError,
    message::{DeliveryTag, OutboundMessage, SequenceId},
    outcome::{DeliveryOutcomeTracker, Resolution},
    transport::SenderLink,
};

/// Builds the body of the message with the given sequence id
pub type PayloadFn = fn(SequenceId) -> String;

/// Default body, `sequence<id>`
pub fn sequence_payload(id: SequenceId) -> String {
    format!("sequence{}", id)
}

/// What the session has to do after an event was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep processing events
    Continue,

    /// Close the link and the connection
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Active,
    Closed,
    Disconnected,
}

/// Converts credit into sends and outcomes into completion
#[derive(Debug)]
pub struct SendFlowController {
    total: u64,
    sent: u64,
    durable: bool,
    payload: PayloadFn,
    tracker: DeliveryOutcomeTracker,
    state: State,
}

impl SendFlowController {
    /// Creates a controller that sends `total` messages with the given QoS
    pub fn new(total: u64, qos: Qos) -> Self {
        Self {
            total,
            sent: 0,
            durable: qos.is_durable(),
            payload: sequence_payload,
            tracker: DeliveryOutcomeTracker::new(total),
            state: State::Active,
        }
    }

    /// Replaces the payload builder
    pub fn with_payload(mut self, payload: PayloadFn) -> Self {
        self.payload = payload;
        self
    }

    /// Handles a credit grant
    ///
    /// Sends at most `credit` messages and never more than what remains. Sequence
    /// ids continue where the previous grant stopped, so repeated grants never
    /// resend a position. Returns the number of messages sent.
    pub fn on_credit<L: SenderLink>(&mut self, link: &mut L, credit: u32) -> Result<u32, LinkError> {
        if self.state != State::Active {
            return Ok(0);
        }

        let mut credit = credit;
        let mut count = 0;
        while credit > 0 && self.sent < self.total {
            let message = OutboundMessage {
                id: self.sent + 1,
                payload: (self.payload)(self.sent + 1),
                durable: self.durable,
            };
            let tag = link.send(message)?;
            self.tracker.track(tag);
            self.sent += 1;
            credit -= 1;
            count += 1;
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(sent = count, total_sent = self.sent, "Credit consumed");
        #[cfg(feature = "log")]
        log::trace!("Sent {} messages, {} in total", count, self.sent);

        Ok(count)
    }

    /// Handles an accepted disposition
    pub fn on_accepted(&mut self, tag: DeliveryTag) -> Flow {
        let resolution = self.tracker.on_accepted(tag);
        self.flow_after(resolution)
    }

    /// Handles a rejected disposition
    ///
    /// The rejection is logged and counted, never retried.
    pub fn on_rejected(&mut self, tag: DeliveryTag, condition: Option<String>) -> Flow {
        #[cfg(feature = "tracing")]
        tracing::warn!(%tag, ?condition, "Delivery rejected");
        #[cfg(feature = "log")]
        log::warn!("Delivery {} rejected: {:?}", tag, condition);

        let resolution = self.tracker.on_rejected(tag, condition);
        self.flow_after(resolution)
    }

    fn flow_after(&mut self, resolution: Resolution) -> Flow {
        match resolution {
            Resolution::Complete if self.state == State::Active => {
                self.state = State::Closed;
                Flow::Close
            }
            _ => Flow::Continue,
        }
    }

    /// Handles the loss of the transport
    ///
    /// Every unconfirmed send is abandoned, `sent` falls back to `confirmed`.
    /// The connection is closed if the disconnect came with a condition and the
    /// session was not closed already. Nothing is sent afterwards.
    pub fn on_disconnected(&mut self, condition: Option<&str>) -> Flow {
        let _abandoned = self.tracker.abandon();
        self.sent = self.tracker.confirmed();

        #[cfg(feature = "tracing")]
        tracing::warn!(abandoned = _abandoned, ?condition, "Disconnected");
        #[cfg(feature = "log")]
        log::warn!("Disconnected ({:?}), abandoned {} sends", condition, _abandoned);

        let was_active = self.state == State::Active;
        self.state = State::Disconnected;
        match condition {
            Some(_) if was_active => Flow::Close,
            _ => Flow::Continue,
        }
    }

    /// Stops sending without waiting for outstanding outcomes
    pub fn on_interrupt(&mut self) -> Flow {
        match self.state {
            State::Active => {
                self.state = State::Closed;
                Flow::Close
            }
            _ => Flow::Continue,
        }
    }

    /// Number of messages handed to the link
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Number of resolved deliveries
    pub fn confirmed(&self) -> u64 {
        self.tracker.confirmed()
    }

    /// Number of messages to send
    pub fn total(&self) -> u64 {
        self.total
    }

    /// The outcome tracker
    pub fn tracker(&self) -> &DeliveryOutcomeTracker {
        &self.tracker
    }

    /// Whether every message has been sent and resolved
    pub fn is_complete(&self) -> bool {
        self.tracker.is_complete()
    }

    /// Whether the controller still sends on credit
    pub fn is_active(&self) -> bool {
        self.state == State::Active
    }
}
