//! Sender and receiver sessions
//!
//! A session owns one connection and one link. [`SenderSession::run`] and
//! [`ReceiverSession::run`] take events off the link's event stream one at a
//! time and hand each to exactly one handler. Nothing else mutates the session
//! counters while a handler runs.
//!
//! Cancelling the [`CancellationToken`] passed to `run` closes the link and the
//! connection and ends the session with [`Completion::Interrupted`]. This is
//! not an error. Closing the link or the connection gives up after the close
//! timeout of the session options.
//!
//! A receiver session settles every inbound message once the dispatcher has
//! handled it. Delivered messages and duplicates are accepted. Messages that
//! arrive past the expected count are released, as is anything still queued on
//! the link when it closes.

use std::{fmt::Display, future::Future, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
    config::{Endpoint, Qos},
    connection::ConnectionManager,
    constants::{DEFAULT_CLOSE_TIMEOUT, DEFAULT_RECEIVER_LINK_NAME, DEFAULT_SENDER_LINK_NAME},
    error::{DeliveryRejected, SessionError, TransportError},
    link,
    receiver::{Dispatch, MessageSink, ReceiveDispatcher},
    sender::{Flow, PayloadFn, SendFlowController},
    terminus::SubscriptionMode,
    transport::{
        Connection, Connector, EventStream, ReceiverEvent, ReceiverLink, SenderEvent, SenderLink,
    },
};

type SenderOf<C> = <<C as Connector>::Connection as Connection>::Sender;
type ReceiverOf<C> = <<C as Connector>::Connection as Connection>::Receiver;

/// Awaits `closing` for at most `timeout`
async fn close_within<E: Display>(
    timeout: Duration,
    _what: &'static str,
    closing: impl Future<Output = Result<(), E>>,
) {
    match tokio::time::timeout(timeout, closing).await {
        Ok(Ok(())) => {}
        Ok(Err(_err)) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(error = %_err, "Closing {}", _what);
            #[cfg(feature = "log")]
            log::debug!("Closing {}: {}", _what, _err);
        }
        Err(_) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(?timeout, "Gave up closing {}", _what);
            #[cfg(feature = "log")]
            log::warn!("Gave up closing {} after {:?}", _what, timeout);
        }
    }
}

/// Counters of a session
///
/// A sender only moves `sent` and `confirmed`, a receiver only moves `received`.
/// `expected` is the number of messages to send or to receive, `0` meaning no
/// limit for a receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionCounters {
    /// Messages handed to the sender link
    pub sent: u64,

    /// Outbound deliveries with a resolved outcome
    pub confirmed: u64,

    /// Inbound messages delivered to the application
    pub received: u64,

    /// Expected total
    pub expected: u64,
}

/// How a session ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Every message was sent and its outcome resolved
    AllConfirmed {
        /// Number of resolved deliveries
        confirmed: u64,

        /// How many of them were rejected
        rejected: u64,
    },

    /// The expected number of messages was received
    AllReceived {
        /// Number of received messages
        received: u64,
    },

    /// The session was cancelled from outside
    Interrupted,

    /// The peer went away without reporting a condition
    Disconnected,
}

/// Options of a [`SenderSession`]
#[derive(Debug, Clone)]
pub struct SenderOptions {
    /// Number of messages to send
    pub total: u64,

    /// Persistence of every message
    pub qos: Qos,

    /// Name of the sender link
    pub link_name: String,

    /// Builds the body of each message
    pub payload: Option<PayloadFn>,

    /// Longest wait for the link or the connection to close
    pub close_timeout: Duration,
}

impl SenderOptions {
    /// Sends `total` non-persistent messages
    pub fn new(total: u64) -> Self {
        Self {
            total,
            qos: Qos::default(),
            link_name: DEFAULT_SENDER_LINK_NAME.to_string(),
            payload: None,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Sets the QoS
    pub fn qos(mut self, qos: Qos) -> Self {
        self.qos = qos;
        self
    }

    /// Sets the link name
    pub fn link_name(mut self, name: impl Into<String>) -> Self {
        self.link_name = name.into();
        self
    }

    /// Sets the payload builder
    pub fn payload(mut self, payload: PayloadFn) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the close timeout
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}

/// Options of a [`ReceiverSession`]
#[derive(Debug, Clone)]
pub struct ReceiverOptions {
    /// Number of messages to receive, `0` receives until stopped
    pub expected: u64,

    /// Plain node or durable topic endpoint
    pub mode: SubscriptionMode,

    /// Name of a plain receiver link. A durable topic endpoint always uses the
    /// subscription name of the endpoint.
    pub link_name: String,

    /// Longest wait for the link or the connection to close
    pub close_timeout: Duration,
}

impl ReceiverOptions {
    /// Receives `expected` messages from a plain node
    pub fn new(expected: u64) -> Self {
        Self {
            expected,
            mode: SubscriptionMode::Plain,
            link_name: DEFAULT_RECEIVER_LINK_NAME.to_string(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Sets the subscription mode
    pub fn mode(mut self, mode: SubscriptionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the name of a plain receiver link
    pub fn link_name(mut self, name: impl Into<String>) -> Self {
        self.link_name = name.into();
        self
    }

    /// Sets the close timeout
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}

/// Sends a bounded number of messages and waits for their outcomes
pub struct SenderSession<C: Connector> {
    manager: ConnectionManager<C>,
    link: Option<SenderOf<C>>,
    events: EventStream<SenderEvent>,
    controller: SendFlowController,
    failure: Option<TransportError>,
    close_timeout: Duration,
}

impl<C: Connector> std::fmt::Debug for SenderSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderSession")
            .field("manager", &self.manager)
            .field("attached", &self.link.is_some())
            .field("controller", &self.controller)
            .field("failure", &self.failure)
            .finish()
    }
}

impl<C: Connector> SenderSession<C> {
    /// Connects and attaches a sender link to the endpoint address
    pub async fn open(
        connector: C,
        endpoint: Endpoint,
        options: SenderOptions,
    ) -> Result<Self, SessionError> {
        let mut manager = ConnectionManager::new(connector, endpoint);
        manager.connect().await?;

        let target = manager.endpoint().address().to_string();
        let attached = link::attach_sender(manager.connection(), &target, &options.link_name).await;
        let (link, events) = match attached {
            Ok(attached) => attached,
            Err(err) => {
                let _ = manager.close().await;
                return Err(err.into());
            }
        };

        let mut controller = SendFlowController::new(options.total, options.qos);
        if let Some(payload) = options.payload {
            controller = controller.with_payload(payload);
        }

        Ok(Self {
            manager,
            link: Some(link),
            events,
            controller,
            failure: None,
            close_timeout: options.close_timeout,
        })
    }

    /// Processes events until every outcome is resolved, the transport fails or
    /// `shutdown` is cancelled
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<Completion, SessionError> {
        if self.controller.total() == 0 {
            self.close().await;
            return Ok(self.all_confirmed());
        }

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    if self.controller.on_interrupt() == Flow::Close {
                        self.close().await;
                    }
                    return Ok(Completion::Interrupted);
                }
                event = self.events.recv() => {
                    event.unwrap_or(SenderEvent::Disconnected { condition: None })
                }
            };

            if let Some(result) = self.handle(event).await {
                return result;
            }
        }
    }

    async fn handle(&mut self, event: SenderEvent) -> Option<Result<Completion, SessionError>> {
        match event {
            SenderEvent::Sendable { credit } => {
                let link = self.link.as_mut()?;
                if let Err(err) = self.controller.on_credit(link, credit) {
                    self.controller.on_disconnected(Some(&err.to_string()));
                    self.close().await;
                    return Some(Err(err.into()));
                }
                None
            }
            SenderEvent::Accepted { tag } => {
                let flow = self.controller.on_accepted(tag);
                self.complete_if(flow).await
            }
            SenderEvent::Rejected { tag, condition } => {
                let flow = self.controller.on_rejected(tag, condition);
                self.complete_if(flow).await
            }
            SenderEvent::TransportError { condition } => {
                self.record_failure(condition);
                None
            }
            SenderEvent::Disconnected { condition } => {
                let condition = condition.or_else(|| self.failure.as_ref().map(|f| f.condition.clone()));
                match self.controller.on_disconnected(condition.as_deref()) {
                    Flow::Close => self.close().await,
                    Flow::Continue => self.link = None,
                }
                Some(self.disconnected(condition))
            }
        }
    }

    async fn complete_if(&mut self, flow: Flow) -> Option<Result<Completion, SessionError>> {
        match flow {
            Flow::Close => {
                self.close().await;

                #[cfg(feature = "tracing")]
                tracing::info!(confirmed = self.controller.confirmed(), "All messages confirmed");
                #[cfg(feature = "log")]
                log::info!("All {} messages confirmed", self.controller.confirmed());

                Some(Ok(self.all_confirmed()))
            }
            Flow::Continue => None,
        }
    }

    fn all_confirmed(&self) -> Completion {
        Completion::AllConfirmed {
            confirmed: self.controller.confirmed(),
            rejected: self.controller.tracker().rejected().len() as u64,
        }
    }

    fn record_failure(&mut self, condition: String) {
        if self.failure.is_none() {
            let failure = TransportError::new(self.manager.endpoint().url().as_str(), condition);

            #[cfg(feature = "tracing")]
            tracing::error!(error = %failure, "Transport error");
            #[cfg(feature = "log")]
            log::error!("Transport error: {}", failure);

            self.failure = Some(failure);
        }
    }

    fn disconnected(&mut self, condition: Option<String>) -> Result<Completion, SessionError> {
        match condition {
            Some(condition) => {
                self.record_failure(condition);
                Err(self
                    .failure
                    .clone()
                    .unwrap_or_else(|| TransportError::new(self.manager.endpoint().url().as_str(), ""))
                    .into())
            }
            None => Ok(Completion::Disconnected),
        }
    }

    async fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            close_within(self.close_timeout, "sender link", link.close()).await;
        }
        close_within(self.close_timeout, "connection", self.manager.close()).await;
    }

    /// Current counters
    pub fn counters(&self) -> SessionCounters {
        SessionCounters {
            sent: self.controller.sent(),
            confirmed: self.controller.confirmed(),
            received: 0,
            expected: self.controller.total(),
        }
    }

    /// Rejected deliveries so far
    pub fn rejected(&self) -> Vec<DeliveryRejected> {
        let url = self.manager.endpoint().url().as_str();
        self.controller
            .tracker()
            .rejected()
            .iter()
            .map(|(tag, condition)| DeliveryRejected {
                url: url.to_string(),
                tag: *tag,
                condition: condition.clone(),
            })
            .collect()
    }

    /// The endpoint of the session
    pub fn endpoint(&self) -> &Endpoint {
        self.manager.endpoint()
    }
}

/// Receives from a node or a durable topic endpoint
pub struct ReceiverSession<C: Connector, K> {
    manager: ConnectionManager<C>,
    link: Option<ReceiverOf<C>>,
    events: EventStream<ReceiverEvent>,
    dispatcher: ReceiveDispatcher,
    sink: K,
    failure: Option<TransportError>,
    close_timeout: Duration,
}

impl<C: Connector, K> std::fmt::Debug for ReceiverSession<C, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiverSession")
            .field("manager", &self.manager)
            .field("attached", &self.link.is_some())
            .field("dispatcher", &self.dispatcher)
            .field("failure", &self.failure)
            .finish()
    }
}

impl<C: Connector, K: MessageSink> ReceiverSession<C, K> {
    /// Connects and attaches a receiver link
    ///
    /// For a durable topic endpoint the endpoint address is the topic and the
    /// link name is the endpoint's subscription name.
    pub async fn open(
        connector: C,
        endpoint: Endpoint,
        options: ReceiverOptions,
        sink: K,
    ) -> Result<Self, SessionError> {
        let mut manager = ConnectionManager::new(connector, endpoint);
        manager.connect().await?;

        let source = manager.endpoint().address().to_string();
        let link_name = match options.mode {
            SubscriptionMode::Plain => options.link_name.clone(),
            SubscriptionMode::DurableTopicEndpoint(_) => manager
                .endpoint()
                .subscription_name()
                .unwrap_or_default()
                .to_string(),
        };
        let attached =
            link::attach_receiver(manager.connection(), &source, options.mode, &link_name).await;
        let (link, events) = match attached {
            Ok(attached) => attached,
            Err(err) => {
                let _ = manager.close().await;
                return Err(err.into());
            }
        };

        Ok(Self {
            manager,
            link: Some(link),
            events,
            dispatcher: ReceiveDispatcher::new(options.expected),
            sink,
            failure: None,
            close_timeout: options.close_timeout,
        })
    }

    /// Processes events until the expected number of messages arrived, the
    /// transport fails or `shutdown` is cancelled
    ///
    /// A session expecting `0` messages only ends through the latter two.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<Completion, SessionError> {
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    self.close().await;
                    return Ok(Completion::Interrupted);
                }
                event = self.events.recv() => {
                    event.unwrap_or(ReceiverEvent::Disconnected { condition: None })
                }
            };

            if let Some(result) = self.handle(event).await {
                return result;
            }
        }
    }

    async fn handle(&mut self, event: ReceiverEvent) -> Option<Result<Completion, SessionError>> {
        match event {
            ReceiverEvent::Message(message) => {
                let dispatch = self.dispatcher.on_message(&message, &mut self.sink);
                self.settle(dispatch);
                match dispatch {
                    Dispatch::Complete => {
                        self.close().await;

                        #[cfg(feature = "tracing")]
                        tracing::info!(received = self.dispatcher.received(), "All messages received");
                        #[cfg(feature = "log")]
                        log::info!("All {} messages received", self.dispatcher.received());

                        Some(Ok(Completion::AllReceived {
                            received: self.dispatcher.received(),
                        }))
                    }
                    Dispatch::Delivered | Dispatch::Duplicate | Dispatch::Ignored => None,
                }
            }
            ReceiverEvent::TransportError { condition } => {
                self.record_failure(condition);
                None
            }
            ReceiverEvent::Disconnected { condition } => {
                let condition = condition.or_else(|| self.failure.as_ref().map(|f| f.condition.clone()));

                #[cfg(feature = "tracing")]
                tracing::warn!(?condition, "Disconnected");
                #[cfg(feature = "log")]
                log::warn!("Disconnected: {:?}", condition);

                match condition {
                    Some(condition) => {
                        self.close().await;
                        self.record_failure(condition);
                        let failure = self.failure.clone()?;
                        Some(Err(failure.into()))
                    }
                    None => {
                        self.link = None;
                        Some(Ok(Completion::Disconnected))
                    }
                }
            }
        }
    }

    fn record_failure(&mut self, condition: String) {
        if self.failure.is_none() {
            let failure = TransportError::new(self.manager.endpoint().url().as_str(), condition);

            #[cfg(feature = "tracing")]
            tracing::error!(error = %failure, "Transport error");
            #[cfg(feature = "log")]
            log::error!("Transport error: {}", failure);

            self.failure = Some(failure);
        }
    }

    async fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            close_within(self.close_timeout, "receiver link", link.close()).await;
        }
        close_within(self.close_timeout, "connection", self.manager.close()).await;
    }

    fn settle(&mut self, dispatch: Dispatch) {
        if let Some(link) = self.link.as_mut() {
            let settled = match dispatch {
                Dispatch::Delivered | Dispatch::Complete | Dispatch::Duplicate => link.accept(),
                Dispatch::Ignored => link.release(),
            };
            if let Err(_err) = settled {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %_err, ?dispatch, "Settling message");
                #[cfg(feature = "log")]
                log::debug!("Settling {:?} message: {}", dispatch, _err);
            }
        }
    }

    /// Current counters
    pub fn counters(&self) -> SessionCounters {
        SessionCounters {
            sent: 0,
            confirmed: 0,
            received: self.dispatcher.received(),
            expected: self.dispatcher.expected(),
        }
    }

    /// The application sink
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Consumes the session and returns the application sink
    pub fn into_sink(self) -> K {
        self.sink
    }

    /// The endpoint of the session
    pub fn endpoint(&self) -> &Endpoint {
        self.manager.endpoint()
    }
}
