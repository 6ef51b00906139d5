//! Errors of the connection, link and session layers

use crate::message::DeliveryTag;

/// Socket or connection level failure
///
/// Carries the broker URL so that the diagnostic identifies which broker failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Transport failure for broker {url}: {condition}")]
pub struct TransportError {
    /// Broker URL
    pub url: String,

    /// Diagnostic condition reported by the transport
    pub condition: String,
}

impl TransportError {
    /// Creates a new transport error
    pub fn new(url: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            condition: condition.into(),
        }
    }
}

/// Error associated with establishing a connection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    /// The broker rejected the credentials or the mechanism
    #[error("Authentication failed for broker {url}: {description}")]
    Authentication {
        /// Broker URL
        url: String,

        /// Why the authentication failed
        description: String,
    },

    /// The connection could not be established
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Attaching a link with attributes that the broker would misinterpret
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolMisuse {
    /// Only one of the two durable terminus attributes was set
    #[error("Durable terminus requires both durability and expiry policy, found durability: {durability_set}, expiry policy: {expiry_policy_set}")]
    PartialDurableTerminus {
        /// Whether the durability was set
        durability_set: bool,

        /// Whether the expiry policy was set
        expiry_policy_set: bool,
    },

    /// A durable topic endpoint needs a subscription name for the link name
    #[error("Durable topic endpoint requires a non-empty subscription name")]
    MissingSubscriptionName,
}

/// Error associated with attaching a link
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttachError {
    /// The connection attempt returned no connection
    #[error("No connection is available to attach the link")]
    NotConnected,

    /// The transport failed during attach
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The requested link attributes are invalid
    #[error(transparent)]
    ProtocolMisuse(#[from] ProtocolMisuse),
}

/// Error associated with using an attached link
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// The link is closed and does not take commands anymore
    #[error("Link is closed")]
    Closed,
}

/// Broker-level negative acknowledgement of a single delivery
///
/// This is not fatal to a session. It counts towards completion like an
/// accepted delivery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Broker {url} rejected delivery {tag}{}", .condition.as_ref().map(|c| format!(": {c}")).unwrap_or_default())]
pub struct DeliveryRejected {
    /// Broker URL
    pub url: String,

    /// Tag of the rejected delivery
    pub tag: DeliveryTag,

    /// Remote disposition condition, if any
    pub condition: Option<String>,
}

/// Endpoint configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Error parsing the url
    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// Scheme is not supported
    #[error(r#"Invalid scheme "{0}". Only "amqp" and "amqps" are supported."#)]
    InvalidScheme(String),
}

/// Errors that end a session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Connecting to the broker failed
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Attaching the link failed
    #[error(transparent)]
    Attach(#[from] AttachError),

    /// The transport failed while the session was running
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The link was closed underneath the session
    #[error(transparent)]
    Link(#[from] LinkError),
}

impl SessionError {
    /// Returns the broker URL if the error carries one
    pub fn url(&self) -> Option<&str> {
        match self {
            SessionError::Connect(ConnectError::Authentication { url, .. })
            | SessionError::Connect(ConnectError::Transport(TransportError { url, .. }))
            | SessionError::Attach(AttachError::Transport(TransportError { url, .. }))
            | SessionError::Transport(TransportError { url, .. }) => Some(url),
            _ => None,
        }
    }
}
