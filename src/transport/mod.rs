//! Transport layer for SMTP connections.
//!
//! One TCP connection per send attempt, optionally TLS-wrapped either at
//! connect time (implicit TLS) or later via STARTTLS.

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::SmtpOAuth2Options;
use crate::errors::{MailError, MailErrorKind, MailResult};
use crate::protocol::{EsmtpCapabilities, SmtpCommand, SmtpResponse, TransactionState};

/// Trait for SMTP transport abstraction.
#[async_trait]
pub trait SmtpTransport: Send + Sync + fmt::Debug {
    /// Sends a command and receives a response.
    async fn send_command(&mut self, command: &SmtpCommand) -> MailResult<SmtpResponse>;

    /// Sends raw data (for the DATA command body).
    async fn send_data(&mut self, data: &[u8]) -> MailResult<()>;

    /// Reads a response from the server.
    async fn read_response(&mut self) -> MailResult<SmtpResponse>;

    /// Upgrades the connection to TLS.
    async fn upgrade_tls(&mut self, host: &str) -> MailResult<()>;

    /// Returns true if TLS is enabled.
    fn is_tls(&self) -> bool;

    /// Closes the connection gracefully (QUIT).
    async fn close(&mut self) -> MailResult<()>;

    /// Returns the current transaction state.
    fn state(&self) -> TransactionState;

    /// Sets the transaction state.
    fn set_state(&mut self, state: TransactionState);

    /// Returns the server capabilities.
    fn capabilities(&self) -> Option<&EsmtpCapabilities>;

    /// Sets the server capabilities.
    fn set_capabilities(&mut self, caps: EsmtpCapabilities);
}

/// TCP connection with optional TLS.
pub struct TcpTransport {
    /// Read/write stream.
    stream: TransportStream,
    /// Command timeout.
    command_timeout: Duration,
    /// Transaction state.
    state: TransactionState,
    /// Server capabilities.
    capabilities: Option<EsmtpCapabilities>,
    /// TLS enabled flag.
    tls_enabled: bool,
    /// Server host.
    host: String,
}

/// Stream that can be plain TCP or TLS.
///
/// `Detached` is the placeholder state while the plain stream is taken out
/// for the TLS handshake; it is never observable outside `upgrade_tls`.
enum TransportStream {
    Plain(BufReader<TcpStream>),
    #[cfg(feature = "rustls-tls")]
    Tls(BufReader<tokio_rustls::client::TlsStream<TcpStream>>),
    #[cfg(feature = "native-tls")]
    NativeTls(BufReader<tokio_native_tls::TlsStream<TcpStream>>),
    Detached,
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("host", &self.host)
            .field("tls_enabled", &self.tls_enabled)
            .field("state", &self.state)
            .finish()
    }
}

impl TcpTransport {
    /// Connects to the configured SMTP server, reads the greeting and
    /// performs the implicit TLS handshake when `use_ssl` is set.
    pub async fn connect(options: &SmtpOAuth2Options) -> MailResult<Self> {
        let address = options.address();

        let stream = timeout(options.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| MailError::timeout(MailErrorKind::ConnectTimeout, "Connect timed out"))?
            .map_err(|e| Self::map_io_error(e, &address))?;

        stream.set_nodelay(true).ok();

        let mut transport = Self {
            stream: TransportStream::Plain(BufReader::new(stream)),
            command_timeout: options.command_timeout,
            state: TransactionState::Initial,
            capabilities: None,
            tls_enabled: false,
            host: options.server.clone(),
        };

        if options.use_ssl {
            let host = transport.host.clone();
            transport.upgrade_tls(&host).await?;
        }

        // Read server greeting
        let greeting = transport.read_response().await?;
        if !greeting.is_success() {
            return Err(greeting.to_error());
        }

        transport.state = TransactionState::Connected;

        Ok(transport)
    }

    /// Maps IO errors to mailer errors.
    fn map_io_error(error: io::Error, address: &str) -> MailError {
        match error.kind() {
            io::ErrorKind::ConnectionRefused => MailError::new(
                MailErrorKind::ConnectionRefused,
                format!("Connection refused to {}", address),
            ),
            io::ErrorKind::TimedOut => {
                MailError::timeout(MailErrorKind::ConnectTimeout, "Connect timed out")
            }
            io::ErrorKind::ConnectionReset => {
                MailError::new(MailErrorKind::ConnectionReset, "Connection reset by server")
            }
            _ => MailError::connection(format!("Connection error: {}", error)),
        }
    }

    /// Reads lines until a complete (possibly multiline) response.
    async fn read_response_inner<R: AsyncBufReadExt + Unpin>(
        reader: &mut R,
        timeout_duration: Duration,
    ) -> MailResult<SmtpResponse> {
        let mut lines = Vec::new();

        loop {
            let mut line = String::new();

            let result = timeout(timeout_duration, reader.read_line(&mut line))
                .await
                .map_err(|_| MailError::timeout(MailErrorKind::ReadTimeout, "Read timed out"))?
                .map_err(|e| MailError::protocol(format!("Read error: {}", e)))?;

            if result == 0 {
                return Err(MailError::new(
                    MailErrorKind::ConnectionReset,
                    "Server closed connection",
                ));
            }

            let line = line.trim_end().to_string();

            // Continuation lines carry a hyphen after the code
            let is_continuation = line.len() >= 4 && line.chars().nth(3) == Some('-');
            lines.push(line);

            if !is_continuation {
                break;
            }
        }

        SmtpResponse::parse(&lines)
    }

    /// Writes and flushes data with the command timeout.
    async fn write_all<W: AsyncWrite + Unpin>(
        writer: &mut W,
        data: &[u8],
        timeout_duration: Duration,
    ) -> MailResult<()> {
        timeout(timeout_duration, writer.write_all(data))
            .await
            .map_err(|_| MailError::timeout(MailErrorKind::WriteTimeout, "Write timed out"))?
            .map_err(|e| MailError::protocol(format!("Write error: {}", e)))?;

        timeout(timeout_duration, writer.flush())
            .await
            .map_err(|_| MailError::timeout(MailErrorKind::WriteTimeout, "Flush timed out"))?
            .map_err(|e| MailError::protocol(format!("Flush error: {}", e)))?;

        Ok(())
    }

    /// Takes the plain TCP stream out for a TLS handshake.
    fn detach_plain(&mut self) -> MailResult<TcpStream> {
        match std::mem::replace(&mut self.stream, TransportStream::Detached) {
            TransportStream::Plain(reader) => Ok(reader.into_inner()),
            other => {
                self.stream = other;
                Err(MailError::tls("Already using TLS"))
            }
        }
    }
}

#[async_trait]
impl SmtpTransport for TcpTransport {
    async fn send_command(&mut self, command: &SmtpCommand) -> MailResult<SmtpResponse> {
        let cmd_str = format!("{}\r\n", command.to_smtp_string());

        tracing::debug!(command = %command, "Sending SMTP command");

        self.send_data(cmd_str.as_bytes()).await?;
        self.read_response().await
    }

    async fn send_data(&mut self, data: &[u8]) -> MailResult<()> {
        match &mut self.stream {
            TransportStream::Plain(ref mut stream) => {
                Self::write_all(stream.get_mut(), data, self.command_timeout).await?;
            }
            #[cfg(feature = "rustls-tls")]
            TransportStream::Tls(ref mut stream) => {
                Self::write_all(stream.get_mut(), data, self.command_timeout).await?;
            }
            #[cfg(feature = "native-tls")]
            TransportStream::NativeTls(ref mut stream) => {
                Self::write_all(stream.get_mut(), data, self.command_timeout).await?;
            }
            TransportStream::Detached => {
                return Err(MailError::connection("Stream detached"));
            }
        }
        Ok(())
    }

    async fn read_response(&mut self) -> MailResult<SmtpResponse> {
        let response = match &mut self.stream {
            TransportStream::Plain(ref mut stream) => {
                Self::read_response_inner(stream, self.command_timeout).await?
            }
            #[cfg(feature = "rustls-tls")]
            TransportStream::Tls(ref mut stream) => {
                Self::read_response_inner(stream, self.command_timeout).await?
            }
            #[cfg(feature = "native-tls")]
            TransportStream::NativeTls(ref mut stream) => {
                Self::read_response_inner(stream, self.command_timeout).await?
            }
            TransportStream::Detached => {
                return Err(MailError::connection("Stream detached"));
            }
        };

        tracing::debug!(code = response.code, message = %response.first_message(), "Received SMTP response");

        Ok(response)
    }

    async fn upgrade_tls(&mut self, host: &str) -> MailResult<()> {
        if self.tls_enabled {
            return Ok(());
        }

        #[cfg(feature = "rustls-tls")]
        {
            use rustls::pki_types::ServerName;
            use std::sync::Arc;

            let mut root_store = rustls::RootCertStore::empty();
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

            let tls_config = rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();

            let connector = tokio_rustls::TlsConnector::from(Arc::new(tls_config));
            let server_name = ServerName::try_from(host.to_string())
                .map_err(|_| MailError::tls(format!("Invalid server name: {}", host)))?;

            let tcp_stream = self.detach_plain()?;

            let tls_stream = timeout(
                Duration::from_secs(30),
                connector.connect(server_name, tcp_stream),
            )
            .await
            .map_err(|_| {
                MailError::timeout(MailErrorKind::ConnectTimeout, "TLS handshake timed out")
            })?
            .map_err(|e| MailError::tls(format!("TLS handshake failed: {}", e)))?;

            self.stream = TransportStream::Tls(BufReader::new(tls_stream));
            self.tls_enabled = true;
            if self.state != TransactionState::Initial {
                self.state = TransactionState::TlsEstablished;
            }

            Ok(())
        }

        #[cfg(all(feature = "native-tls", not(feature = "rustls-tls")))]
        {
            use native_tls::TlsConnector;

            let connector = TlsConnector::builder()
                .build()
                .map_err(|e| MailError::tls(format!("Failed to build TLS connector: {}", e)))?;
            let connector = tokio_native_tls::TlsConnector::from(connector);

            let tcp_stream = self.detach_plain()?;

            let tls_stream = timeout(Duration::from_secs(30), connector.connect(host, tcp_stream))
                .await
                .map_err(|_| {
                    MailError::timeout(MailErrorKind::ConnectTimeout, "TLS handshake timed out")
                })?
                .map_err(|e| MailError::tls(format!("TLS handshake failed: {}", e)))?;

            self.stream = TransportStream::NativeTls(BufReader::new(tls_stream));
            self.tls_enabled = true;
            if self.state != TransactionState::Initial {
                self.state = TransactionState::TlsEstablished;
            }

            Ok(())
        }

        #[cfg(not(any(feature = "rustls-tls", feature = "native-tls")))]
        {
            let _ = host;
            Err(MailError::configuration("No TLS implementation available"))
        }
    }

    fn is_tls(&self) -> bool {
        self.tls_enabled
    }

    async fn close(&mut self) -> MailResult<()> {
        if self.state != TransactionState::Closed {
            let _ = self.send_command(&SmtpCommand::Quit).await;
            self.state = TransactionState::Closed;
        }
        Ok(())
    }

    fn state(&self) -> TransactionState {
        self.state
    }

    fn set_state(&mut self, state: TransactionState) {
        self.state = state;
    }

    fn capabilities(&self) -> Option<&EsmtpCapabilities> {
        self.capabilities.as_ref()
    }

    fn set_capabilities(&mut self, caps: EsmtpCapabilities) {
        self.capabilities = Some(caps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_io_error_kinds() {
        let err = TcpTransport::map_io_error(
            io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
            "smtp.example.com:587",
        );
        assert_eq!(err.kind(), MailErrorKind::ConnectionRefused);

        let err = TcpTransport::map_io_error(
            io::Error::new(io::ErrorKind::ConnectionReset, "reset"),
            "smtp.example.com:587",
        );
        assert_eq!(err.kind(), MailErrorKind::ConnectionReset);
    }

    #[tokio::test]
    async fn test_connect_refused_maps_to_error() {
        // Port 1 on localhost is not listening.
        let options = SmtpOAuth2Options::builder()
            .server("127.0.0.1")
            .port(1)
            .user("user@example.com")
            .client_id("id")
            .client_secret("secret")
            .build();
        let options = options.expect("options build");

        let result = TcpTransport::connect(&options).await;
        assert!(result.is_err());
    }
}
