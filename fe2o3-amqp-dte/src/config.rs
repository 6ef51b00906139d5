//! Endpoint descriptor and quality of service selection

use std::{convert::Infallible, fmt, str::FromStr};

use url::Url;

use crate::{
    constants::{DEFAULT_SCHEME, DEFAULT_URL},
    error::ConfigError,
};

/// Username and password for the PLAIN mechanism
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username
    pub username: String,

    /// Password
    pub password: String,
}

impl Credentials {
    /// Creates new credentials
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// The password must never end up in a log line
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl<'a> TryFrom<&'a Url> for Credentials {
    type Error = ();

    fn try_from(value: &'a Url) -> Result<Self, Self::Error> {
        match (value.username(), value.password()) {
            ("", _) | (_, None) => Err(()),
            (username, Some(password)) => Ok(Credentials::new(username, password)),
        }
    }
}

/// Where and how to connect, and which node to use
///
/// The descriptor is immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
    address: String,
    subscription_name: Option<String>,
    credentials: Option<Credentials>,
}

impl Endpoint {
    /// Creates a builder for [`Endpoint`]
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Broker URL, without userinfo
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Node address, or the topic name when subscribing to a durable topic endpoint
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Name of the durable subscription
    pub fn subscription_name(&self) -> Option<&str> {
        self.subscription_name.as_deref()
    }

    /// Credentials, `None` selects anonymous authentication
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }
}

/// Builder for [`Endpoint`]
#[derive(Debug, Clone, Default)]
pub struct Builder {
    url: Option<String>,
    address: String,
    subscription_name: Option<String>,
    credentials: Option<Credentials>,
}

impl Builder {
    /// Creates a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Broker URL. The scheme may be omitted, eg. `localhost:5672`
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Node address or topic name
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Name of the durable subscription
    pub fn subscription_name(mut self, name: impl Into<String>) -> Self {
        self.subscription_name = Some(name.into());
        self
    }

    /// Authenticate with username and password
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Authenticate with username and password if a non-empty username is given
    ///
    /// A missing password is sent as an empty one.
    pub fn optional_credentials(
        mut self,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        self.credentials = match username {
            Some(username) if !username.is_empty() => {
                Some(Credentials::new(username, password.unwrap_or_default()))
            }
            _ => None,
        };
        self
    }

    /// Builds the endpoint
    ///
    /// Credentials embedded in the URL are used when none are given explicitly.
    /// They are removed from the stored URL in either case.
    pub fn build(self) -> Result<Endpoint, ConfigError> {
        let mut url = parse_url(self.url.as_deref().unwrap_or(DEFAULT_URL))?;

        let embedded = Credentials::try_from(&url).ok();
        if !url.username().is_empty() || url.password().is_some() {
            // Neither call can fail on a url that has a host
            let _ = url.set_username("");
            let _ = url.set_password(None);
        }

        Ok(Endpoint {
            url,
            address: self.address,
            subscription_name: self.subscription_name,
            credentials: self.credentials.or(embedded),
        })
    }
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    let raw = raw.trim();
    let url = if raw.contains("://") {
        Url::parse(raw)?
    } else {
        Url::parse(&format!("{}://{}", DEFAULT_SCHEME, raw))?
    };

    match url.scheme() {
        "amqp" | "amqps" => Ok(url),
        scheme => Err(ConfigError::InvalidScheme(scheme.to_string())),
    }
}

/// Persistence level requested for outbound messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Qos {
    /// Best effort
    #[default]
    NonPersistent,

    /// The broker persists the message before acknowledging it
    Persistent,
}

impl Qos {
    /// Value of the durable flag carried by every message
    pub fn is_durable(&self) -> bool {
        matches!(self, Qos::Persistent)
    }

    /// Parses a QoS selector
    ///
    /// `"persistent"` and `"2"` select [`Qos::Persistent`]. `"non-persistent"`,
    /// `"1"` and every unrecognized value fall back to [`Qos::NonPersistent`].
    pub fn parse(value: &str) -> Self {
        match value {
            "persistent" | "2" => Qos::Persistent,
            _ => Qos::NonPersistent,
        }
    }
}

impl FromStr for Qos {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Qos::parse(s))
    }
}

impl From<u8> for Qos {
    fn from(value: u8) -> Self {
        match value {
            2 => Qos::Persistent,
            _ => Qos::NonPersistent,
        }
    }
}

impl fmt::Display for Qos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Qos::NonPersistent => write!(f, "non-persistent"),
            Qos::Persistent => write!(f, "persistent"),
        }
    }
}
