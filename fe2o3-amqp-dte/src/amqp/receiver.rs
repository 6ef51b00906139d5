use std::collections::VecDeque;

use fe2o3_amqp::{
    link::{delivery::DeliveryInfo, receiver::CreditMode, ReceiverAttachError},
    session::SessionHandle,
    types::{
        messaging::{Message, MessageId, Source},
        primitives::Value,
    },
    Delivery, Receiver,
};
use tokio::sync::{mpsc, oneshot};

use crate::{
    error::LinkError,
    message::InboundMessage,
    terminus::SourceTerminus,
    transport::{EventSink, EventStream, ReceiverEvent, ReceiverLink},
};

#[derive(Debug)]
enum Command {
    Accept,
    Release,
    Close(oneshot::Sender<Result<(), LinkError>>),
}

/// Handle to a receiver link driven by a background task
///
/// The task keeps every received delivery unsettled until the handle accepts
/// or releases it. With automatic credit the broker is only granted more
/// credit once deliveries are settled.
#[derive(Debug)]
pub struct AmqpReceiver {
    commands: mpsc::UnboundedSender<Command>,
}

impl AmqpReceiver {
    pub(crate) fn spawn(link: Receiver) -> (Self, EventStream<ReceiverEvent>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(link, command_rx, events));
        (Self { commands }, event_rx)
    }
}

impl ReceiverLink for AmqpReceiver {
    fn accept(&mut self) -> Result<(), LinkError> {
        self.commands
            .send(Command::Accept)
            .map_err(|_| LinkError::Closed)
    }

    fn release(&mut self) -> Result<(), LinkError> {
        self.commands
            .send(Command::Release)
            .map_err(|_| LinkError::Closed)
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(Command::Close(ack))
            .map_err(|_| LinkError::Closed)?;
        done.await.map_err(|_| LinkError::Closed)?
    }
}

/// Attaches a receiver with the durability attributes of `source`
pub(crate) async fn attach(
    session: &mut SessionHandle<()>,
    source: &SourceTerminus,
    link_name: &str,
    prefetch: u32,
) -> Result<Receiver, ReceiverAttachError> {
    Receiver::builder()
        .name(link_name)
        .source(to_amqp_source(source))
        .credit_mode(CreditMode::Auto(prefetch))
        .attach(session)
        .await
}

fn to_amqp_source(source: &SourceTerminus) -> Source {
    let builder = Source::builder().address(source.address().to_string());
    match source.attributes() {
        Some(attributes) => builder
            .durable(attributes.durability.clone())
            .expiry_policy(attributes.expiry_policy.clone())
            .build(),
        None => builder.build(),
    }
}

/// Reads the sequence id from the message id, numeric strings included
fn sequence_id(message: &Message<Value>) -> Option<u64> {
    match message.properties.as_ref()?.message_id.as_ref()? {
        MessageId::Ulong(id) => Some(*id),
        MessageId::String(id) => id.parse().ok(),
        _ => None,
    }
}

fn payload(body: &Value) -> String {
    match body {
        Value::String(text) => text.clone(),
        other => format!("{:?}", other),
    }
}

fn to_inbound(delivery: &Delivery<Value>) -> InboundMessage {
    InboundMessage {
        id: sequence_id(delivery.message()),
        payload: payload(delivery.body()),
    }
}

fn fail(events: &EventSink<ReceiverEvent>, condition: String) {
    #[cfg(feature = "tracing")]
    tracing::error!(%condition, "Receiver link failed");
    #[cfg(feature = "log")]
    log::error!("Receiver link failed: {}", condition);

    let _ = events.send(ReceiverEvent::TransportError {
        condition: condition.clone(),
    });
    let _ = events.send(ReceiverEvent::Disconnected {
        condition: Some(condition),
    });
}

/// Hands unsettled deliveries back to the node and closes the link
async fn release_and_close(
    mut link: Receiver,
    unsettled: VecDeque<DeliveryInfo>,
) -> Result<(), LinkError> {
    // No more transfers once closing
    let _ = link.set_credit(0).await;
    if !unsettled.is_empty() {
        #[cfg(feature = "tracing")]
        tracing::debug!(count = unsettled.len(), "Releasing unsettled messages");
        #[cfg(feature = "log")]
        log::debug!("Releasing {} unsettled messages", unsettled.len());

        link.release_all::<Value>(unsettled)
            .await
            .map_err(|_| LinkError::Closed)?;
    }
    link.close().await.map_err(|_| LinkError::Closed)
}

async fn pump(
    mut link: Receiver,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: EventSink<ReceiverEvent>,
) {
    let mut unsettled: VecDeque<DeliveryInfo> = VecDeque::new();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Accept) => {
                    if let Some(delivery) = unsettled.pop_front() {
                        if let Err(err) = link.accept(delivery).await {
                            fail(&events, err.to_string());
                            return;
                        }
                    }
                }
                Some(Command::Release) => {
                    if let Some(delivery) = unsettled.pop_front() {
                        if let Err(err) = link.release::<Value>(delivery).await {
                            fail(&events, err.to_string());
                            return;
                        }
                    }
                }
                Some(Command::Close(ack)) => {
                    let _ = ack.send(release_and_close(link, unsettled).await);
                    return;
                }
                None => {
                    let _ = release_and_close(link, unsettled).await;
                    return;
                }
            },
            delivery = link.recv::<Value>() => {
                let delivery = match delivery {
                    Ok(delivery) => delivery,
                    Err(err) => {
                        fail(&events, err.to_string());
                        return;
                    }
                };
                let message = to_inbound(&delivery);
                unsettled.push_back(DeliveryInfo::from(delivery));
                if events.send(ReceiverEvent::Message(message)).is_err() {
                    let _ = release_and_close(link, unsettled).await;
                    return;
                }
            }
        }
    }
}
