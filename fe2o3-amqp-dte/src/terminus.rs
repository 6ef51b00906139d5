//! Address conventions and the source terminus of receiver links
//!
//! A durable topic endpoint (DTE) is selected in one of two ways:
//!
//! - [`DurableStyle::SubscriptionPrefix`]: the source address is `dsub://<topic>`
//! - [`DurableStyle::TopicTerminus`]: the source address is `topic://<topic>`
//!
//! In both cases the link name is the subscription name and the source terminus
//! carries `durable = configuration` and `expiry-policy = never`.

use fe2o3_amqp::types::messaging::{TerminusDurability, TerminusExpiryPolicy};

use crate::{
    constants::{DURABLE_SUBSCRIPTION_PREFIX, QUEUE_PREFIX, TOPIC_PREFIX},
    error::ProtocolMisuse,
};

/// Prefixes `topic` with `topic://`
pub fn topic_address(topic: &str) -> String {
    format!("{}{}", TOPIC_PREFIX, topic)
}

/// Prefixes `queue` with `queue://`
pub fn queue_address(queue: &str) -> String {
    format!("{}{}", QUEUE_PREFIX, queue)
}

/// Prefixes `topic` with `dsub://`
pub fn durable_subscription_address(topic: &str) -> String {
    format!("{}{}", DURABLE_SUBSCRIPTION_PREFIX, topic)
}

/// How a durable topic endpoint is addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurableStyle {
    /// `dsub://<topic>`
    #[default]
    SubscriptionPrefix,

    /// `topic://<topic>`
    TopicTerminus,
}

/// How a receiver link binds to its source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionMode {
    /// The source address is used as given
    #[default]
    Plain,

    /// Bind to a durable topic endpoint that outlives the connection
    DurableTopicEndpoint(DurableStyle),
}

/// Durability attributes of a terminus, always set as a pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminusAttributes {
    /// Terminus durability
    pub durability: TerminusDurability,

    /// Terminus expiry policy
    pub expiry_policy: TerminusExpiryPolicy,
}

impl TerminusAttributes {
    /// The attributes that make a topic endpoint durable
    pub fn durable_topic_endpoint() -> Self {
        Self {
            durability: TerminusDurability::Configuration,
            expiry_policy: TerminusExpiryPolicy::Never,
        }
    }
}

/// Source terminus requested when attaching a receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTerminus {
    address: String,
    attributes: Option<TerminusAttributes>,
}

impl SourceTerminus {
    /// Creates a builder for [`SourceTerminus`]
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// A source without durability attributes
    pub fn plain(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            attributes: None,
        }
    }

    /// Resolves the source terminus of a receiver for the given mode
    ///
    /// In [`SubscriptionMode::Plain`], `address` is the node address. Otherwise
    /// it is the topic name to which the style's prefix is applied.
    pub fn for_mode(address: &str, mode: SubscriptionMode) -> Result<Self, ProtocolMisuse> {
        match mode {
            SubscriptionMode::Plain => Ok(Self::plain(address)),
            SubscriptionMode::DurableTopicEndpoint(style) => {
                let address = match style {
                    DurableStyle::SubscriptionPrefix => durable_subscription_address(address),
                    DurableStyle::TopicTerminus => topic_address(address),
                };
                let attributes = TerminusAttributes::durable_topic_endpoint();
                Self::builder()
                    .address(address)
                    .durability(attributes.durability)
                    .expiry_policy(attributes.expiry_policy)
                    .build()
            }
        }
    }

    /// Source address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Durability attributes, if any
    pub fn attributes(&self) -> Option<&TerminusAttributes> {
        self.attributes.as_ref()
    }

    /// Whether the terminus outlives the link
    pub fn is_durable(&self) -> bool {
        self.attributes.is_some()
    }
}

/// Builder for [`SourceTerminus`]
#[derive(Debug, Clone, Default)]
pub struct Builder {
    address: String,
    durability: Option<TerminusDurability>,
    expiry_policy: Option<TerminusExpiryPolicy>,
}

impl Builder {
    /// Source address
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Terminus durability
    pub fn durability(mut self, durability: TerminusDurability) -> Self {
        self.durability = Some(durability);
        self
    }

    /// Terminus expiry policy
    pub fn expiry_policy(mut self, expiry_policy: TerminusExpiryPolicy) -> Self {
        self.expiry_policy = Some(expiry_policy);
        self
    }

    /// Builds the terminus
    ///
    /// Fails if only one of durability and expiry policy is set.
    pub fn build(self) -> Result<SourceTerminus, ProtocolMisuse> {
        let attributes = match (self.durability, self.expiry_policy) {
            (Some(durability), Some(expiry_policy)) => Some(TerminusAttributes {
                durability,
                expiry_policy,
            }),
            (None, None) => None,
            (durability, expiry_policy) => {
                return Err(ProtocolMisuse::PartialDurableTerminus {
                    durability_set: durability.is_some(),
                    expiry_policy_set: expiry_policy.is_some(),
                })
            }
        };

        Ok(SourceTerminus {
            address: self.address,
            attributes,
        })
    }
}
