//! Connection and link abstraction consumed by the sessions
//!
//! [`crate::amqp`] implements these traits on top of `fe2o3-amqp`. Tests
//! implement them in memory.

use tokio::sync::mpsc;
use url::Url;

use crate::{
    error::{AttachError, ConnectError, LinkError, TransportError},
    message::{DeliveryTag, InboundMessage, OutboundMessage},
    terminus::SourceTerminus,
};

/// Stream of events produced by an attached link
///
/// The link drops the sending half when it goes away, which the sessions treat
/// as a disconnect without condition.
pub type EventStream<E> = mpsc::UnboundedReceiver<E>;

/// Sending half of an [`EventStream`]
pub type EventSink<E> = mpsc::UnboundedSender<E>;

/// Events delivered to a sender session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderEvent {
    /// The peer granted `credit` more transfers
    Sendable {
        /// Number of messages that may be sent
        credit: u32,
    },

    /// The broker accepted a delivery
    Accepted {
        /// Tag of the delivery
        tag: DeliveryTag,
    },

    /// The broker rejected a delivery
    Rejected {
        /// Tag of the delivery
        tag: DeliveryTag,

        /// Remote disposition condition, if any
        condition: Option<String>,
    },

    /// Socket or authentication failure
    TransportError {
        /// Diagnostic condition
        condition: String,
    },

    /// The transport went away
    Disconnected {
        /// Condition reported with the disconnect
        condition: Option<String>,
    },
}

/// Events delivered to a receiver session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverEvent {
    /// A message arrived. It is unsettled until the session settles it.
    Message(InboundMessage),

    /// Socket or authentication failure
    TransportError {
        /// Diagnostic condition
        condition: String,
    },

    /// The transport went away
    Disconnected {
        /// Condition reported with the disconnect
        condition: Option<String>,
    },
}

/// SASL mechanism selected for a connection
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMechanism {
    /// SASL ANONYMOUS
    Anonymous,

    /// SASL PLAIN
    Plain {
        /// Username
        username: String,

        /// Password
        password: String,

        /// Allow PLAIN over a transport without TLS
        allow_insecure: bool,
    },
}

impl AuthMechanism {
    /// Name of the SASL mechanism
    pub fn name(&self) -> &'static str {
        match self {
            AuthMechanism::Anonymous => "ANONYMOUS",
            AuthMechanism::Plain { .. } => "PLAIN",
        }
    }
}

impl std::fmt::Debug for AuthMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => write!(f, "Anonymous"),
            Self::Plain {
                username,
                allow_insecure,
                ..
            } => f
                .debug_struct("Plain")
                .field("username", username)
                .field("allow_insecure", allow_insecure)
                .finish_non_exhaustive(),
        }
    }
}

/// Establishes connections to a broker
#[allow(async_fn_in_trait)]
pub trait Connector {
    /// The connection type
    type Connection: Connection;

    /// Connects to `url`
    ///
    /// `Ok(None)` means the transport produced no connection. Nothing may be
    /// attached in that case.
    async fn connect(
        &mut self,
        url: &Url,
        auth: &AuthMechanism,
    ) -> Result<Option<Self::Connection>, ConnectError>;
}

/// An established connection on which links are attached
#[allow(async_fn_in_trait)]
pub trait Connection {
    /// The sender link type
    type Sender: SenderLink;

    /// The receiver link type
    type Receiver: ReceiverLink;

    /// Attaches a sender link to `target`
    async fn create_sender(
        &mut self,
        target: &str,
        link_name: &str,
    ) -> Result<(Self::Sender, EventStream<SenderEvent>), AttachError>;

    /// Attaches a receiver link to `source`
    ///
    /// The durability attributes of `source` are part of the attach, the link is
    /// never usable without them.
    async fn create_receiver(
        &mut self,
        source: &SourceTerminus,
        link_name: &str,
    ) -> Result<(Self::Receiver, EventStream<ReceiverEvent>), AttachError>;

    /// Closes the connection
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// The sending end of an attached sender link
#[allow(async_fn_in_trait)]
pub trait SenderLink {
    /// Queues a message for transfer and returns the tag of its delivery
    ///
    /// This never waits. Callers must only send within granted credit.
    fn send(&mut self, message: OutboundMessage) -> Result<DeliveryTag, LinkError>;

    /// Detaches the link with the closed flag
    async fn close(&mut self) -> Result<(), LinkError>;
}

/// The receiving end of an attached receiver link
///
/// Every [`ReceiverEvent::Message`] stays unsettled at the broker until the
/// session accepts or releases it. Messages are settled in the order their
/// events were emitted.
#[allow(async_fn_in_trait)]
pub trait ReceiverLink {
    /// Accepts the oldest unsettled message, removing it from the node
    fn accept(&mut self) -> Result<(), LinkError>;

    /// Releases the oldest unsettled message back to the node
    fn release(&mut self) -> Result<(), LinkError>;

    /// Releases every unsettled message and detaches the link with the closed
    /// flag
    async fn close(&mut self) -> Result<(), LinkError>;
}
