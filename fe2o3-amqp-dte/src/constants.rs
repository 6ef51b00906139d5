//! Constants shared by the sessions and the address conventions

use std::time::Duration;

/// Broker URL used when none is configured
pub const DEFAULT_URL: &str = "amqp://localhost:5672";

/// Scheme assumed when a URL is given as `host:port`
pub const DEFAULT_SCHEME: &str = "amqp";

/// Address prefix selecting a durable topic endpoint on the broker
pub const DURABLE_SUBSCRIPTION_PREFIX: &str = "dsub://";

/// Address prefix routing to a topic
pub const TOPIC_PREFIX: &str = "topic://";

/// Address prefix routing to a queue
pub const QUEUE_PREFIX: &str = "queue://";

/// Prefix of the container id generated by [`crate::amqp::AmqpConnector`]
pub const DEFAULT_CONTAINER_ID_PREFIX: &str = "fe2o3-amqp-dte";

/// Default link name of a sender
pub const DEFAULT_SENDER_LINK_NAME: &str = "dte-sender-link";

/// Default link name of a plain receiver
pub const DEFAULT_RECEIVER_LINK_NAME: &str = "dte-receiver-link";

/// Number of unsettled deliveries a sender may keep in flight
pub const DEFAULT_SENDER_WINDOW: u32 = 10;

/// Credit granted to the broker by a receiver
pub const DEFAULT_RECEIVER_PREFETCH: u32 = 10;

/// How long a session waits for its link or connection to close before giving up
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
