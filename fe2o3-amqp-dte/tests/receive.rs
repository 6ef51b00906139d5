//! Receiver session against the in-memory broker

mod common;

use std::time::Duration;

use common::{Broker, Call};
use fe2o3_amqp_dte::{
    error::{AttachError, ProtocolMisuse},
    session::{ReceiverOptions, ReceiverSession},
    terminus::{DurableStyle, TerminusAttributes},
    transport::ReceiverEvent,
    Completion, Endpoint, InboundMessage, SessionError, SubscriptionMode,
};
use tokio_util::sync::CancellationToken;

fn dte_endpoint(subscription_name: Option<&str>) -> Endpoint {
    let builder = Endpoint::builder().url("localhost:5672").address("a/topic");
    match subscription_name {
        Some(name) => builder.subscription_name(name).build().unwrap(),
        None => builder.build().unwrap(),
    }
}

fn message(id: u64) -> ReceiverEvent {
    ReceiverEvent::Message(InboundMessage::with_id(id, format!("sequence{}", id)))
}

#[tokio::test]
async fn duplicates_are_dropped_and_session_completes() {
    let broker = Broker::new();
    let mut session = ReceiverSession::open(
        broker.clone(),
        common::endpoint("examples"),
        ReceiverOptions::new(5),
        Vec::<InboundMessage>::new(),
    )
    .await
    .unwrap();

    broker.push_receiver([1, 2, 2, 3, 4, 5].into_iter().map(message));
    let completion = session.run(CancellationToken::new()).await.unwrap();

    assert_eq!(completion, Completion::AllReceived { received: 5 });
    let ids: Vec<_> = session.sink().iter().map(|m| m.id).collect();
    assert_eq!(ids, [Some(1), Some(2), Some(3), Some(4), Some(5)]);
    // The repeated message is settled too, it must not be redelivered
    assert_eq!(broker.count(&Call::Accept), 6);
    assert_eq!(broker.count(&Call::Release), 0);
    assert_eq!(broker.count(&Call::CloseReceiver), 1);
    assert_eq!(broker.count(&Call::CloseConnection), 1);
}

#[tokio::test]
async fn messages_past_expected_are_released_not_accepted() {
    let broker = Broker::new();
    let mut session = ReceiverSession::open(
        broker.clone(),
        common::endpoint("examples"),
        ReceiverOptions::new(2),
        Vec::<InboundMessage>::new(),
    )
    .await
    .unwrap();

    broker.push_receiver((1..=4).map(message));
    let completion = session.run(CancellationToken::new()).await.unwrap();

    assert_eq!(completion, Completion::AllReceived { received: 2 });
    assert_eq!(session.counters().received, 2);
    let ids: Vec<_> = session.sink().iter().map(|m| m.id).collect();
    assert_eq!(ids, [Some(1), Some(2)]);

    let settled: Vec<_> = broker
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::Accept | Call::Release | Call::CloseReceiver))
        .collect();
    assert_eq!(
        settled,
        [
            Call::Accept,
            Call::Accept,
            Call::Release,
            Call::Release,
            Call::CloseReceiver
        ]
    );
    assert_eq!(broker.count(&Call::CloseConnection), 1);
}

#[tokio::test]
async fn first_message_may_carry_id_zero() {
    let broker = Broker::new();
    let mut session = ReceiverSession::open(
        broker.clone(),
        common::endpoint("examples"),
        ReceiverOptions::new(2),
        Vec::<InboundMessage>::new(),
    )
    .await
    .unwrap();

    broker.push_receiver([message(0), message(1)]);
    let completion = session.run(CancellationToken::new()).await.unwrap();

    assert_eq!(completion, Completion::AllReceived { received: 2 });
    let ids: Vec<_> = session.sink().iter().map(|m| m.id).collect();
    assert_eq!(ids, [Some(0), Some(1)]);
}

#[tokio::test]
async fn closure_sink_sees_every_delivered_message() {
    let broker = Broker::new();
    let mut payloads = Vec::<InboundMessage>::new();
    {
        let sink = |m: &InboundMessage| payloads.push(m.payload.clone());
        let mut session = ReceiverSession::open(
            broker.clone(),
            common::endpoint("examples"),
            ReceiverOptions::new(2),
            sink,
        )
        .await
        .unwrap();

        broker.push_receiver([
            ReceiverEvent::Message(InboundMessage::without_id("first")),
            ReceiverEvent::Message(InboundMessage::without_id("second")),
        ]);
        session.run(CancellationToken::new()).await.unwrap();
    }
    assert_eq!(payloads, ["first", "second"]);
}

#[tokio::test]
async fn durable_subscription_prefix_attach() {
    let broker = Broker::new();
    let options = ReceiverOptions::new(1)
        .mode(SubscriptionMode::DurableTopicEndpoint(DurableStyle::SubscriptionPrefix));
    ReceiverSession::open(broker.clone(), dte_endpoint(Some("mydte")), options, Vec::<InboundMessage>::new())
        .await
        .unwrap();

    match &broker.calls()[1] {
        Call::AttachReceiver { source, link_name } => {
            assert_eq!(link_name, "mydte");
            assert_eq!(source.address(), "dsub://a/topic");
            assert_eq!(
                source.attributes(),
                Some(&TerminusAttributes::durable_topic_endpoint())
            );
        }
        other => panic!("unexpected call {:?}", other),
    }
}

#[tokio::test]
async fn durable_topic_terminus_attach() {
    let broker = Broker::new();
    let options = ReceiverOptions::new(1)
        .mode(SubscriptionMode::DurableTopicEndpoint(DurableStyle::TopicTerminus));
    ReceiverSession::open(broker.clone(), dte_endpoint(Some("mydte")), options, Vec::<InboundMessage>::new())
        .await
        .unwrap();

    match &broker.calls()[1] {
        Call::AttachReceiver { source, link_name } => {
            assert_eq!(link_name, "mydte");
            assert_eq!(source.address(), "topic://a/topic");
            assert!(source.is_durable());
        }
        other => panic!("unexpected call {:?}", other),
    }
}

#[tokio::test]
async fn durable_topic_endpoint_requires_subscription_name() {
    let broker = Broker::new();
    let options = ReceiverOptions::new(1)
        .mode(SubscriptionMode::DurableTopicEndpoint(DurableStyle::default()));
    let err = ReceiverSession::open(broker.clone(), dte_endpoint(None), options, Vec::<InboundMessage>::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        SessionError::Attach(AttachError::ProtocolMisuse(
            ProtocolMisuse::MissingSubscriptionName
        ))
    );
    assert!(!broker
        .calls()
        .iter()
        .any(|call| matches!(call, Call::AttachReceiver { .. })));
    assert_eq!(broker.count(&Call::CloseConnection), 1);
}

#[tokio::test]
async fn plain_receiver_uses_address_as_is() {
    let broker = Broker::new();
    let options = ReceiverOptions::new(1).link_name("recv");
    ReceiverSession::open(broker.clone(), common::endpoint("examples"), options, Vec::<InboundMessage>::new())
        .await
        .unwrap();

    match &broker.calls()[1] {
        Call::AttachReceiver { source, link_name } => {
            assert_eq!(link_name, "recv");
            assert_eq!(source.address(), "examples");
            assert_eq!(source.attributes(), None);
        }
        other => panic!("unexpected call {:?}", other),
    }
}

#[tokio::test]
async fn unbounded_session_runs_until_disconnected() {
    let broker = Broker::new();
    let mut session = ReceiverSession::open(
        broker.clone(),
        common::endpoint("examples"),
        ReceiverOptions::new(0),
        Vec::<InboundMessage>::new(),
    )
    .await
    .unwrap();

    broker.push_receiver((1..=3).map(message));
    broker.push_receiver([ReceiverEvent::Disconnected { condition: None }]);
    let completion = session.run(CancellationToken::new()).await.unwrap();

    assert_eq!(completion, Completion::Disconnected);
    assert_eq!(session.counters().received, 3);
    assert_eq!(session.counters().expected, 0);
    assert_eq!(broker.count(&Call::CloseConnection), 0);
}

#[tokio::test]
async fn transport_error_ends_session_with_broker_url() {
    let broker = Broker::new();
    let mut session = ReceiverSession::open(
        broker.clone(),
        common::endpoint("examples"),
        ReceiverOptions::new(10),
        Vec::<InboundMessage>::new(),
    )
    .await
    .unwrap();

    broker.push_receiver([
        message(1),
        ReceiverEvent::TransportError {
            condition: "amqp:connection:forced".to_string(),
        },
        ReceiverEvent::Disconnected {
            condition: Some("amqp:connection:forced".to_string()),
        },
    ]);
    let err = session.run(CancellationToken::new()).await.unwrap_err();

    match err {
        SessionError::Transport(err) => {
            assert_eq!(err.condition, "amqp:connection:forced");
            assert!(err.url.contains("localhost:5672"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(session.counters().received, 1);
    assert_eq!(broker.count(&Call::CloseReceiver), 1);
    assert_eq!(broker.count(&Call::CloseConnection), 1);
}

#[tokio::test]
async fn interrupt_stops_unbounded_session() {
    let broker = Broker::new();
    let mut session = ReceiverSession::open(
        broker.clone(),
        common::endpoint("examples"),
        ReceiverOptions::new(0),
        Vec::<InboundMessage>::new(),
    )
    .await
    .unwrap();

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    broker.push_receiver([message(1)]);
    let (completion, _) = tokio::join!(session.run(shutdown), async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    assert_eq!(completion.unwrap(), Completion::Interrupted);
    assert_eq!(session.into_sink().len(), 1);
    assert_eq!(broker.count(&Call::Accept), 1);
    assert_eq!(broker.count(&Call::CloseConnection), 1);
}

#[tokio::test]
async fn interrupt_releases_queued_messages() {
    let broker = Broker::new();
    let mut session = ReceiverSession::open(
        broker.clone(),
        common::endpoint("examples"),
        ReceiverOptions::new(0),
        Vec::<InboundMessage>::new(),
    )
    .await
    .unwrap();

    broker.push_receiver((1..=3).map(message));
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let completion = session.run(shutdown).await.unwrap();

    assert_eq!(completion, Completion::Interrupted);
    assert!(session.sink().is_empty());
    assert_eq!(broker.count(&Call::Accept), 0);
    assert_eq!(broker.count(&Call::Release), 3);
    assert_eq!(broker.count(&Call::CloseReceiver), 1);
}

#[tokio::test]
async fn interrupt_gives_up_on_a_receiver_that_never_closes() {
    let broker = Broker {
        hang_on_close: true,
        ..Default::default()
    };
    let options = ReceiverOptions::new(0).close_timeout(Duration::from_millis(20));
    let mut session = ReceiverSession::open(
        broker.clone(),
        common::endpoint("examples"),
        options,
        Vec::<InboundMessage>::new(),
    )
    .await
    .unwrap();

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let completion = tokio::time::timeout(Duration::from_secs(5), session.run(shutdown))
        .await
        .expect("session must not wait for the link forever");

    assert_eq!(completion.unwrap(), Completion::Interrupted);
    assert_eq!(broker.count(&Call::CloseReceiver), 1);
    assert_eq!(broker.count(&Call::CloseConnection), 1);
}

#[tokio::test]
async fn attach_failure_is_a_transport_error() {
    let broker = Broker::new();
    let err = ReceiverSession::open(
        broker.clone(),
        common::endpoint("unreachable"),
        ReceiverOptions::new(1),
        Vec::<InboundMessage>::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SessionError::Attach(AttachError::Transport(_))));
    assert!(err.url().unwrap().contains("localhost:5672"));
}

#[tokio::test]
async fn missing_connection_fails_attach() {
    let broker = Broker {
        no_connection: true,
        ..Default::default()
    };
    let err = ReceiverSession::open(
        broker.clone(),
        common::endpoint("examples"),
        ReceiverOptions::new(1),
        Vec::<InboundMessage>::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(err, SessionError::Attach(AttachError::NotConnected));
}
