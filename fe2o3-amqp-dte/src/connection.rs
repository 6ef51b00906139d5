//! Establishes the single broker connection of a session

use crate::{
    config::Endpoint,
    error::{ConnectError, TransportError},
    transport::{AuthMechanism, Connection, Connector},
};

/// Owns the endpoint descriptor and the connection built from it
pub struct ConnectionManager<C: Connector> {
    connector: C,
    endpoint: Endpoint,
    connection: Option<C::Connection>,
}

impl<C: Connector> std::fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint)
            .field("connected", &self.connection.is_some())
            .finish()
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Creates a manager that is not connected yet
    pub fn new(connector: C, endpoint: Endpoint) -> Self {
        Self {
            connector,
            endpoint,
            connection: None,
        }
    }

    /// The endpoint descriptor
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Mechanism derived from the endpoint credentials
    ///
    /// Credentials select PLAIN and explicitly allow it over transports without
    /// TLS. No credentials select ANONYMOUS.
    pub fn auth_mechanism(&self) -> AuthMechanism {
        match self.endpoint.credentials() {
            Some(credentials) => AuthMechanism::Plain {
                username: credentials.username.clone(),
                password: credentials.password.clone(),
                allow_insecure: true,
            },
            None => AuthMechanism::Anonymous,
        }
    }

    /// Connects to the broker
    ///
    /// Returns whether a connection was established. Failures are returned
    /// once and never retried here.
    pub async fn connect(&mut self) -> Result<bool, ConnectError> {
        let auth = self.auth_mechanism();

        #[cfg(feature = "tracing")]
        tracing::debug!(url = %self.endpoint.url(), mechanism = auth.name(), "Connecting");
        #[cfg(feature = "log")]
        log::debug!("Connecting to {} with {}", self.endpoint.url(), auth.name());

        let result = self.connector.connect(self.endpoint.url(), &auth).await;
        match result {
            Ok(connection) => {
                self.connection = connection;
                if self.connection.is_none() {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(url = %self.endpoint.url(), "Transport returned no connection");
                    #[cfg(feature = "log")]
                    log::warn!("Transport returned no connection for {}", self.endpoint.url());
                }
                Ok(self.connection.is_some())
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %err, "Connect failed");
                #[cfg(feature = "log")]
                log::error!("Connect failed: {}", err);
                Err(err)
            }
        }
    }

    /// The established connection, if any
    pub fn connection(&mut self) -> Option<&mut C::Connection> {
        self.connection.as_mut()
    }

    /// Whether a connection is established
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Closes the connection. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        match self.connection.take() {
            Some(mut connection) => connection.close().await,
            None => Ok(()),
        }
    }
}
