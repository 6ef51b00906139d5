//! In-memory broker used by the session tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use fe2o3_amqp_dte::{
    error::{AttachError, ConnectError, LinkError, TransportError},
    message::{DeliveryTag, OutboundMessage},
    terminus::SourceTerminus,
    transport::{
        AuthMechanism, Connection, Connector, EventSink, EventStream, ReceiverEvent, ReceiverLink,
        SenderEvent, SenderLink,
    },
    Endpoint,
};
use tokio::sync::mpsc;
use url::Url;

/// Everything the session asked the broker to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect { url: String, mechanism: &'static str },
    AttachSender { target: String, link_name: String },
    AttachReceiver { source: SourceTerminus, link_name: String },
    Send(OutboundMessage),
    Accept,
    Release,
    CloseSender,
    CloseReceiver,
    CloseConnection,
}

#[derive(Debug, Default)]
pub struct State {
    pub calls: Vec<Call>,
    pub sender_events: Option<EventSink<SenderEvent>>,
    pub receiver_events: Option<EventSink<ReceiverEvent>>,

    /// Messages handed to the receiver that were neither accepted nor released
    pub unsettled: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Broker {
    state: Arc<Mutex<State>>,

    /// Accept every delivery as soon as it is sent
    pub auto_accept: bool,

    /// The transport produces no connection
    pub no_connection: bool,

    /// Refuse PLAIN authentication
    pub reject_plain: bool,

    /// Links never finish closing
    pub hang_on_close: bool,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_accept() -> Self {
        Self {
            auto_accept: true,
            ..Default::default()
        }
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.state().calls.iter().filter(|c| *c == call).count()
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Send(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn push_sender(&self, events: impl IntoIterator<Item = SenderEvent>) {
        let state = self.state();
        let sink = state.sender_events.as_ref().unwrap();
        for event in events {
            sink.send(event).unwrap();
        }
    }

    pub fn push_receiver(&self, events: impl IntoIterator<Item = ReceiverEvent>) {
        let mut state = self.state();
        let sink = state.receiver_events.clone().unwrap();
        for event in events {
            if matches!(event, ReceiverEvent::Message(_)) {
                state.unsettled += 1;
            }
            sink.send(event).unwrap();
        }
    }
}

impl Connector for Broker {
    type Connection = MockConnection;

    async fn connect(
        &mut self,
        url: &Url,
        auth: &AuthMechanism,
    ) -> Result<Option<Self::Connection>, ConnectError> {
        self.state().calls.push(Call::Connect {
            url: url.to_string(),
            mechanism: auth.name(),
        });

        if self.reject_plain && matches!(auth, AuthMechanism::Plain { .. }) {
            return Err(ConnectError::Authentication {
                url: url.to_string(),
                description: "SASL outcome Auth".to_string(),
            });
        }
        if self.no_connection {
            return Ok(None);
        }
        Ok(Some(MockConnection {
            state: self.state.clone(),
            url: url.to_string(),
            auto_accept: self.auto_accept,
            hang_on_close: self.hang_on_close,
        }))
    }
}

#[derive(Debug)]
pub struct MockConnection {
    state: Arc<Mutex<State>>,
    url: String,
    auto_accept: bool,
    hang_on_close: bool,
}

impl Connection for MockConnection {
    type Sender = MockSender;
    type Receiver = MockReceiver;

    async fn create_sender(
        &mut self,
        target: &str,
        link_name: &str,
    ) -> Result<(Self::Sender, EventStream<SenderEvent>), AttachError> {
        let (events, stream) = mpsc::unbounded_channel();
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::AttachSender {
            target: target.to_string(),
            link_name: link_name.to_string(),
        });
        state.sender_events = Some(events.clone());
        let sender = MockSender {
            state: self.state.clone(),
            events,
            auto_accept: self.auto_accept,
            hang_on_close: self.hang_on_close,
            closed: false,
        };
        Ok((sender, stream))
    }

    async fn create_receiver(
        &mut self,
        source: &SourceTerminus,
        link_name: &str,
    ) -> Result<(Self::Receiver, EventStream<ReceiverEvent>), AttachError> {
        if source.address().contains("unreachable") {
            return Err(TransportError::new(self.url.clone(), "amqp:not-found").into());
        }

        let (events, stream) = mpsc::unbounded_channel();
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::AttachReceiver {
            source: source.clone(),
            link_name: link_name.to_string(),
        });
        state.receiver_events = Some(events);
        let receiver = MockReceiver {
            state: self.state.clone(),
            hang_on_close: self.hang_on_close,
        };
        Ok((receiver, stream))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.state.lock().unwrap().calls.push(Call::CloseConnection);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockSender {
    state: Arc<Mutex<State>>,
    events: EventSink<SenderEvent>,
    auto_accept: bool,
    hang_on_close: bool,
    closed: bool,
}

impl SenderLink for MockSender {
    fn send(&mut self, message: OutboundMessage) -> Result<DeliveryTag, LinkError> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        let tag = message.tag();
        self.state.lock().unwrap().calls.push(Call::Send(message));
        if self.auto_accept {
            let _ = self.events.send(SenderEvent::Accepted { tag });
        }
        Ok(tag)
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        self.closed = true;
        self.state.lock().unwrap().calls.push(Call::CloseSender);
        if self.hang_on_close {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockReceiver {
    state: Arc<Mutex<State>>,
    hang_on_close: bool,
}

impl MockReceiver {
    fn settle(&mut self, call: Call) -> Result<(), LinkError> {
        let mut state = self.state.lock().unwrap();
        if state.unsettled == 0 {
            return Err(LinkError::Closed);
        }
        state.unsettled -= 1;
        state.calls.push(call);
        Ok(())
    }
}

impl ReceiverLink for MockReceiver {
    fn accept(&mut self) -> Result<(), LinkError> {
        self.settle(Call::Accept)
    }

    fn release(&mut self) -> Result<(), LinkError> {
        self.settle(Call::Release)
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        {
            let mut state = self.state.lock().unwrap();
            for _ in 0..std::mem::take(&mut state.unsettled) {
                state.calls.push(Call::Release);
            }
            state.calls.push(Call::CloseReceiver);
        }
        if self.hang_on_close {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

pub fn endpoint(address: &str) -> Endpoint {
    Endpoint::builder()
        .url("localhost:5672")
        .address(address)
        .build()
        .unwrap()
}
