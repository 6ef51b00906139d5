use fe2o3_amqp::{
    link::SendError,
    types::messaging::{AmqpValue, Header, Message, MessageId, Outcome, Properties},
    Sender,
};
use futures_util::{future::BoxFuture, stream::FuturesUnordered, FutureExt, StreamExt};
use tokio::sync::{mpsc, oneshot};

use crate::{
    error::LinkError,
    message::{DeliveryTag, OutboundMessage},
    transport::{EventSink, EventStream, SenderEvent, SenderLink},
};

use super::describe;

type PendingOutcome = BoxFuture<'static, (DeliveryTag, Result<Outcome, SendError>)>;

type CloseAck = oneshot::Sender<Result<(), LinkError>>;

/// Handle to a sender link driven by a background task
///
/// Close requests travel apart from the messages so that they are seen while a
/// transfer waits for credit.
#[derive(Debug)]
pub struct AmqpSender {
    messages: mpsc::UnboundedSender<OutboundMessage>,
    close: mpsc::UnboundedSender<CloseAck>,
}

impl AmqpSender {
    pub(crate) fn spawn(link: Sender, window: u32) -> (Self, EventStream<SenderEvent>) {
        let (messages, message_rx) = mpsc::unbounded_channel();
        let (close, close_rx) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(link, message_rx, close_rx, events, window));
        (Self { messages, close }, event_rx)
    }
}

impl SenderLink for AmqpSender {
    fn send(&mut self, message: OutboundMessage) -> Result<DeliveryTag, LinkError> {
        let tag = message.tag();
        self.messages.send(message).map_err(|_| LinkError::Closed)?;
        Ok(tag)
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        let (ack, done) = oneshot::channel();
        self.close.send(ack).map_err(|_| LinkError::Closed)?;
        done.await.map_err(|_| LinkError::Closed)?
    }
}

fn to_amqp_message(message: OutboundMessage) -> Message<AmqpValue<String>> {
    Message::builder()
        .header(Header::builder().durable(message.durable).build())
        .properties(
            Properties::builder()
                .message_id(MessageId::Ulong(message.id))
                .build(),
        )
        .value(message.payload)
        .build()
}

fn to_event(tag: DeliveryTag, outcome: Outcome) -> SenderEvent {
    match outcome {
        Outcome::Accepted(_) => SenderEvent::Accepted { tag },
        Outcome::Rejected(rejected) => SenderEvent::Rejected {
            tag,
            condition: rejected.error.as_ref().map(describe),
        },
        // Released and modified deliveries are not retried either
        other => SenderEvent::Rejected {
            tag,
            condition: Some(format!("{:?}", other)),
        },
    }
}

fn fail(events: &EventSink<SenderEvent>, condition: String) {
    #[cfg(feature = "tracing")]
    tracing::error!(%condition, "Sender link failed");
    #[cfg(feature = "log")]
    log::error!("Sender link failed: {}", condition);

    let _ = events.send(SenderEvent::TransportError {
        condition: condition.clone(),
    });
    let _ = events.send(SenderEvent::Disconnected {
        condition: Some(condition),
    });
}

async fn close_link(link: Sender, ack: Option<CloseAck>) {
    let result = link.close().await.map_err(|_| LinkError::Closed);
    if let Some(ack) = ack {
        let _ = ack.send(result);
    }
}

async fn pump(
    mut link: Sender,
    mut messages: mpsc::UnboundedReceiver<OutboundMessage>,
    mut close: mpsc::UnboundedReceiver<CloseAck>,
    events: EventSink<SenderEvent>,
    window: u32,
) {
    let _ = events.send(SenderEvent::Sendable { credit: window });
    let mut outcomes: FuturesUnordered<PendingOutcome> = FuturesUnordered::new();

    loop {
        tokio::select! {
            biased;
            ack = close.recv() => {
                close_link(link, ack).await;
                return;
            }
            message = messages.recv() => {
                let message = match message {
                    Some(message) => message,
                    None => {
                        close_link(link, None).await;
                        return;
                    }
                };
                let tag = message.tag();

                // A transfer waiting for credit must not hold up a close
                let sent = tokio::select! {
                    biased;
                    ack = close.recv() => {
                        close_link(link, ack).await;
                        return;
                    }
                    sent = link.send_batchable(to_amqp_message(message)) => sent,
                };
                match sent {
                    Ok(fut) => outcomes.push(async move { (tag, fut.await) }.boxed()),
                    Err(err) => {
                        fail(&events, err.to_string());
                        return;
                    }
                }
            }
            Some((tag, result)) = outcomes.next(), if !outcomes.is_empty() => {
                let event = match result {
                    Ok(outcome) => to_event(tag, outcome),
                    Err(err) => {
                        fail(&events, err.to_string());
                        return;
                    }
                };
                if events.send(event).is_err() {
                    close_link(link, None).await;
                    return;
                }
                let _ = events.send(SenderEvent::Sendable { credit: 1 });
            }
        }
    }
}
