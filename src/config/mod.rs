//! Configuration for the OAuth2 SMTP sender.
//!
//! Options arrive as a finished value: either deserialized from config
//! files (durations in humantime format) or assembled with the builder.
//! The client secret never serializes.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{MailError, MailResult};

/// Default SMTP port (submission with STARTTLS).
pub const DEFAULT_PORT: u16 = 587;

/// Default timeout for connections.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for commands.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// SMTP sender options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpOAuth2Options {
    /// SMTP server hostname.
    pub server: String,
    /// SMTP server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Account to send as (also the XOAUTH2 user).
    pub user: String,
    /// Implicit TLS on connect. When false the connection upgrades
    /// opportunistically via STARTTLS.
    #[serde(default)]
    pub use_ssl: bool,
    /// Write messages to the pickup directory instead of transmitting.
    #[serde(default)]
    pub use_pickup_directory: bool,
    /// Pickup directory path; required when pickup mode is on.
    pub mail_pickup_directory: Option<PathBuf>,
    /// OAuth2 client ID.
    #[serde(default)]
    pub client_id: String,
    /// OAuth2 client secret (never serialized).
    #[serde(skip)]
    pub client_secret: Option<SecretString>,
    /// Connect timeout.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Command timeout.
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}
fn default_command_timeout() -> Duration {
    DEFAULT_COMMAND_TIMEOUT
}

impl SmtpOAuth2Options {
    /// Creates a new options builder.
    pub fn builder() -> SmtpOAuth2OptionsBuilder {
        SmtpOAuth2OptionsBuilder::default()
    }

    /// Returns the server address as host:port.
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    /// Validates the options.
    pub fn validate(&self) -> MailResult<()> {
        if self.use_pickup_directory {
            if self.mail_pickup_directory.is_none() {
                return Err(MailError::configuration(
                    "mail_pickup_directory is required when use_pickup_directory is set",
                ));
            }
            return Ok(());
        }

        if self.server.is_empty() {
            return Err(MailError::configuration("server cannot be empty"));
        }
        if self.port == 0 {
            return Err(MailError::configuration("port cannot be zero"));
        }
        if self.user.is_empty() {
            return Err(MailError::configuration("user cannot be empty"));
        }
        if self.client_id.is_empty() {
            return Err(MailError::configuration("client_id cannot be empty"));
        }
        if self.client_secret.is_none() {
            return Err(MailError::configuration("client_secret is required"));
        }

        Ok(())
    }
}

/// Builder for [`SmtpOAuth2Options`].
#[derive(Debug, Default)]
pub struct SmtpOAuth2OptionsBuilder {
    server: String,
    port: Option<u16>,
    user: String,
    use_ssl: bool,
    use_pickup_directory: bool,
    mail_pickup_directory: Option<PathBuf>,
    client_id: String,
    client_secret: Option<SecretString>,
    connect_timeout: Option<Duration>,
    command_timeout: Option<Duration>,
}

impl SmtpOAuth2OptionsBuilder {
    /// Sets the server hostname.
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// Sets the server port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the sending account.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Enables implicit TLS on connect.
    pub fn use_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    /// Routes sends to the pickup directory.
    pub fn pickup_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.use_pickup_directory = true;
        self.mail_pickup_directory = Some(directory.into());
        self
    }

    /// Sets the OAuth2 client ID.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Sets the OAuth2 client secret.
    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(SecretString::new(secret.into()));
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the command timeout.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Builds and validates the options.
    pub fn build(self) -> MailResult<SmtpOAuth2Options> {
        let options = SmtpOAuth2Options {
            server: self.server,
            port: self.port.unwrap_or(DEFAULT_PORT),
            user: self.user,
            use_ssl: self.use_ssl,
            use_pickup_directory: self.use_pickup_directory,
            mail_pickup_directory: self.mail_pickup_directory,
            client_id: self.client_id,
            client_secret: self.client_secret,
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            command_timeout: self.command_timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT),
        };

        options.validate()?;
        Ok(options)
    }
}

// Humantime serde support
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
