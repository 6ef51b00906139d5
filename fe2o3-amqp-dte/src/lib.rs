#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations)]

//! Flow-controlled AMQP 1.0 messaging sessions on top of [`fe2o3_amqp`]
//!
//! The crate provides the application-level state machines needed to
//!
//! 1. send a bounded number of messages gated by link credit, tracking the
//!    outcome (accepted or rejected) of every delivery, and
//! 2. receive from a plain node address or a durable topic endpoint (DTE),
//!    dropping redelivered duplicates by their monotonic message id.
//!
//! Each session runs on its own event channel. Every event (credit, outcome,
//! inbound message, transport failure) is handled to completion before the
//! next one is taken, so the counters of a session never need a lock.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use fe2o3_amqp_dte::{
//!     amqp::AmqpConnector, config::{Endpoint, Qos}, session::{SenderOptions, SenderSession},
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = Endpoint::builder()
//!     .url("amqp://localhost:5672")
//!     .address("examples")
//!     .build()?;
//! let options = SenderOptions::new(100).qos(Qos::Persistent);
//!
//! let mut session = SenderSession::open(AmqpConnector::default(), endpoint, options).await?;
//! let completion = session.run(CancellationToken::new()).await?;
//! println!("{:?}", completion);
//! # Ok(())
//! # }
//! ```

pub mod amqp;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod link;
pub mod message;
pub mod outcome;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod terminus;
pub mod transport;

pub use config::{Credentials, Endpoint, Qos};
pub use error::{AttachError, ConnectError, ProtocolMisuse, SessionError, TransportError};
pub use message::{DeliveryTag, InboundMessage, OutboundMessage};
pub use session::{Completion, ReceiverSession, SenderSession, SessionCounters};
pub use terminus::SubscriptionMode;
