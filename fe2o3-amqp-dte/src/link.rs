//! Attaches sender and receiver links over an established connection

use crate::{
    error::{AttachError, ProtocolMisuse},
    terminus::{SourceTerminus, SubscriptionMode},
    transport::{Connection, EventStream, ReceiverEvent, SenderEvent},
};

/// Attaches a sender link to `target`
///
/// Fails fast with [`AttachError::NotConnected`] if there is no connection.
pub async fn attach_sender<C: Connection>(
    connection: Option<&mut C>,
    target: &str,
    link_name: &str,
) -> Result<(C::Sender, EventStream<SenderEvent>), AttachError> {
    let connection = connection.ok_or(AttachError::NotConnected)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(link_name, target, "Attaching sender");
    #[cfg(feature = "log")]
    log::debug!("Attaching sender {} to {}", link_name, target);

    connection.create_sender(target, link_name).await
}

/// Attaches a receiver link
///
/// In [`SubscriptionMode::DurableTopicEndpoint`], `source_address` is the topic
/// name and `link_name` is the durable subscription name. The durability
/// attributes are resolved before anything is sent to the broker.
pub async fn attach_receiver<C: Connection>(
    connection: Option<&mut C>,
    source_address: &str,
    mode: SubscriptionMode,
    link_name: &str,
) -> Result<(C::Receiver, EventStream<ReceiverEvent>), AttachError> {
    let connection = connection.ok_or(AttachError::NotConnected)?;

    if matches!(mode, SubscriptionMode::DurableTopicEndpoint(_)) && link_name.is_empty() {
        return Err(ProtocolMisuse::MissingSubscriptionName.into());
    }
    let source = SourceTerminus::for_mode(source_address, mode)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        link_name,
        source = source.address(),
        durable = source.is_durable(),
        "Attaching receiver"
    );
    #[cfg(feature = "log")]
    log::debug!(
        "Attaching receiver {} to {} (durable: {})",
        link_name,
        source.address(),
        source.is_durable()
    );

    connection.create_receiver(&source, link_name).await
}
