//! Implementation of the connection and link traits with `fe2o3-amqp`
//!
//! Every attached link is driven by its own task. The task owns the
//! `fe2o3-amqp` link and turns link activity into [`SenderEvent`]s or
//! [`ReceiverEvent`]s.
//!
//! `fe2o3-amqp` does not expose the credit granted by the broker to the
//! application, it suspends a send until credit is available instead. The
//! sender task therefore grants credit to the session from an in-flight window:
//! the whole window right after attach and one more for every resolved outcome.
//!
//! [`SenderEvent`]: crate::transport::SenderEvent
//! [`ReceiverEvent`]: crate::transport::ReceiverEvent

use fe2o3_amqp::{
    connection::{ConnectionHandle, OpenError},
    sasl_profile::SaslProfile,
    session::SessionHandle,
    types::definitions,
    Connection as AmqpConnectionBuilder, Session,
};
use url::Url;

use crate::{
    constants::{DEFAULT_CONTAINER_ID_PREFIX, DEFAULT_RECEIVER_PREFETCH, DEFAULT_SENDER_WINDOW},
    error::{AttachError, ConnectError, TransportError},
    terminus::SourceTerminus,
    transport::{AuthMechanism, Connection, Connector, EventStream, ReceiverEvent, SenderEvent},
};

mod receiver;
mod sender;

pub use receiver::AmqpReceiver;
pub use sender::AmqpSender;

/// Opens `fe2o3-amqp` connections
#[derive(Debug, Clone)]
pub struct AmqpConnector {
    container_id: String,
    sender_window: u32,
    receiver_prefetch: u32,
}

impl Default for AmqpConnector {
    fn default() -> Self {
        Self {
            container_id: format!("{}-{}", DEFAULT_CONTAINER_ID_PREFIX, uuid::Uuid::new_v4()),
            sender_window: DEFAULT_SENDER_WINDOW,
            receiver_prefetch: DEFAULT_RECEIVER_PREFETCH,
        }
    }
}

impl AmqpConnector {
    /// Creates a connector with a generated container id
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the container id sent in the open frame
    pub fn container_id(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = container_id.into();
        self
    }

    /// Sets the number of unsettled deliveries a sender keeps in flight
    pub fn sender_window(mut self, window: u32) -> Self {
        self.sender_window = window.max(1);
        self
    }

    /// Sets the credit a receiver grants to the broker
    pub fn receiver_prefetch(mut self, prefetch: u32) -> Self {
        self.receiver_prefetch = prefetch.max(1);
        self
    }
}

impl Connector for AmqpConnector {
    type Connection = AmqpConnection;

    async fn connect(
        &mut self,
        url: &Url,
        auth: &AuthMechanism,
    ) -> Result<Option<Self::Connection>, ConnectError> {
        let profile = match auth {
            AuthMechanism::Anonymous => SaslProfile::Anonymous,
            AuthMechanism::Plain {
                username,
                password,
                allow_insecure,
            } => {
                if !allow_insecure && url.scheme() != "amqps" {
                    return Err(ConnectError::Authentication {
                        url: url.to_string(),
                        description: "PLAIN is not allowed without TLS".to_string(),
                    });
                }
                SaslProfile::Plain {
                    username: username.clone(),
                    password: password.clone(),
                }
            }
        };

        let mut connection = AmqpConnectionBuilder::builder()
            .container_id(self.container_id.clone())
            .sasl_profile(profile)
            .open(url.as_str())
            .await
            .map_err(|err| map_open_error(url, err))?;

        let session = match Session::begin(&mut connection).await {
            Ok(session) => session,
            Err(err) => {
                let _ = connection.close().await;
                return Err(TransportError::new(url.as_str(), err.to_string()).into());
            }
        };

        #[cfg(feature = "tracing")]
        tracing::info!(%url, container_id = %self.container_id, "Connected");
        #[cfg(feature = "log")]
        log::info!("Connected to {} as {}", url, self.container_id);

        Ok(Some(AmqpConnection {
            url: url.clone(),
            connection,
            session,
            sender_window: self.sender_window,
            receiver_prefetch: self.receiver_prefetch,
            closed: false,
        }))
    }
}

fn map_open_error(url: &Url, err: OpenError) -> ConnectError {
    match err {
        OpenError::SaslError { code, .. } => ConnectError::Authentication {
            url: url.to_string(),
            description: format!("SASL outcome {:?}", code),
        },
        err => TransportError::new(url.as_str(), err.to_string()).into(),
    }
}

/// Formats a remote error condition
pub(crate) fn describe(error: &definitions::Error) -> String {
    match &error.description {
        Some(description) => format!("{:?}: {}", error.condition, description),
        None => format!("{:?}", error.condition),
    }
}

/// A `fe2o3-amqp` connection with the one session all links are attached on
pub struct AmqpConnection {
    url: Url,
    connection: ConnectionHandle<()>,
    session: SessionHandle<()>,
    sender_window: u32,
    receiver_prefetch: u32,
    closed: bool,
}

impl std::fmt::Debug for AmqpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpConnection")
            .field("url", &self.url.as_str())
            .field("sender_window", &self.sender_window)
            .field("receiver_prefetch", &self.receiver_prefetch)
            .field("closed", &self.closed)
            .finish()
    }
}

impl AmqpConnection {
    fn transport_error(&self, condition: impl ToString) -> TransportError {
        TransportError::new(self.url.as_str(), condition.to_string())
    }
}

impl Connection for AmqpConnection {
    type Sender = AmqpSender;
    type Receiver = AmqpReceiver;

    async fn create_sender(
        &mut self,
        target: &str,
        link_name: &str,
    ) -> Result<(Self::Sender, EventStream<SenderEvent>), AttachError> {
        let link = fe2o3_amqp::Sender::attach(&mut self.session, link_name, target)
            .await
            .map_err(|err| self.transport_error(err))?;
        Ok(AmqpSender::spawn(link, self.sender_window))
    }

    async fn create_receiver(
        &mut self,
        source: &SourceTerminus,
        link_name: &str,
    ) -> Result<(Self::Receiver, EventStream<ReceiverEvent>), AttachError> {
        let link = receiver::attach(&mut self.session, source, link_name, self.receiver_prefetch)
            .await
            .map_err(|err| self.transport_error(err))?;
        Ok(AmqpReceiver::spawn(link))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // The session may already be gone with the transport
        if let Err(_err) = self.session.end().await {
            #[cfg(feature = "tracing")]
            tracing::debug!(error = %_err, "Ending session");
            #[cfg(feature = "log")]
            log::debug!("Ending session: {}", _err);
        }
        self.connection
            .close()
            .await
            .map_err(|err| self.transport_error(err))
    }
}
