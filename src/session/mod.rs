//! SMTP session management.
//!
//! [`OAuth2SmtpSender`] drives one complete send attempt: cancellation
//! gate, pickup-directory delegation, then the network sequence of
//! connect, EHLO, optional STARTTLS, OAuth2 token acquisition, SASL
//! bearer authentication, envelope and data transfer, and QUIT. External
//! faults never escape as errors; they come back as messages on the
//! [`SendResponse`]. Only composition faults propagate as `Err`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthMethod, Authenticator, CredentialProvider, ProviderKeys, MAIL_SCOPE};
use crate::config::SmtpOAuth2Options;
use crate::errors::{MailError, MailErrorKind, MailResult};
use crate::mime::{compose, MimeWriter, WireMessage};
use crate::observability::SenderMetrics;
use crate::pickup::PickupDirectoryWriter;
use crate::protocol::{codes, EsmtpCapabilities, SmtpCommand, TransactionState};
use crate::transport::{SmtpTransport, TcpTransport};
use crate::types::{EmailData, SendResponse};

/// Sender abstraction consumed by the orchestrator.
#[async_trait]
pub trait MailSender: Send + Sync {
    /// Sends one email, honoring the optional cancellation token.
    async fn send(
        &self,
        data: &EmailData,
        cancellation: Option<&CancellationToken>,
    ) -> MailResult<SendResponse>;
}

/// SMTP sender authenticating with OAuth2 bearer tokens.
pub struct OAuth2SmtpSender {
    options: SmtpOAuth2Options,
    provider: Arc<dyn CredentialProvider>,
    metrics: Arc<SenderMetrics>,
}

impl OAuth2SmtpSender {
    /// Creates a sender from validated options and a credential provider.
    pub fn new(options: SmtpOAuth2Options, provider: Arc<dyn CredentialProvider>) -> Self {
        Self {
            options,
            provider,
            metrics: Arc::new(SenderMetrics::new()),
        }
    }

    /// Returns the metrics handle.
    pub fn metrics(&self) -> Arc<SenderMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Sends an already composed message, folding every fault into the
    /// response.
    pub async fn send_message(
        &self,
        message: &WireMessage,
        cancellation: Option<&CancellationToken>,
    ) -> SendResponse {
        if let Some(token) = cancellation {
            if token.is_cancelled() {
                self.metrics.record_failed();
                return SendResponse::error(MailError::cancelled().message());
            }
        }

        if self.options.use_pickup_directory {
            return self.deliver_to_pickup(message).await;
        }

        let outcome = match cancellation {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => Err(MailError::cancelled()),
                    result = self.transmit(message) => result,
                }
            }
            None => self.transmit(message).await,
        };

        match outcome {
            Ok(()) => {
                self.metrics.record_sent();
                SendResponse::success()
            }
            Err(e) => {
                self.metrics.record_failed();
                tracing::warn!(error = %e, "Send attempt failed");
                // Cancellation surfaces its synthetic message verbatim.
                let message = if e.kind() == MailErrorKind::Cancelled {
                    e.message().to_string()
                } else {
                    e.to_string()
                };
                SendResponse::error(message)
            }
        }
    }

    /// Writes the message to the pickup directory instead of transmitting.
    async fn deliver_to_pickup(&self, message: &WireMessage) -> SendResponse {
        let directory = match &self.options.mail_pickup_directory {
            Some(dir) => dir.clone(),
            None => {
                self.metrics.record_failed();
                return SendResponse::error(
                    MailError::configuration("mail_pickup_directory is not set").to_string(),
                );
            }
        };

        match PickupDirectoryWriter::new(directory).write(message).await {
            Ok(()) => {
                self.metrics.record_pickup_write();
                SendResponse::success()
            }
            Err(e) => {
                self.metrics.record_failed();
                SendResponse::error(e.to_string())
            }
        }
    }

    /// Connects, runs the transaction and closes the connection on every
    /// exit path.
    async fn transmit(&self, message: &WireMessage) -> MailResult<()> {
        let mut transport = TcpTransport::connect(&self.options).await?;
        let result = self.transact(&mut transport, message).await;
        let _ = transport.close().await;
        result
    }

    /// Runs the SMTP transaction on an established transport.
    pub async fn transact(
        &self,
        transport: &mut dyn SmtpTransport,
        message: &WireMessage,
    ) -> MailResult<()> {
        if message.envelope_recipients().next().is_none() {
            return Err(MailError::composition(
                MailErrorKind::InvalidRecipientAddress,
                "No recipients have been specified.",
            ));
        }

        let capabilities = self.greet(transport).await?;

        let capabilities = if !transport.is_tls() && capabilities.starttls {
            let response = transport.send_command(&SmtpCommand::StartTls).await?;
            if !response.is_success() {
                return Err(response.to_error());
            }
            let host = self.options.server.clone();
            transport.upgrade_tls(&host).await?;
            // Capabilities may change after the TLS upgrade
            self.greet(transport).await?
        } else {
            capabilities
        };

        self.authenticate(transport, &capabilities).await?;

        let encoded = MimeWriter::default().encode(message)?;

        let response = transport
            .send_command(&SmtpCommand::MailFrom {
                address: message.from.to_smtp(),
                size: capabilities.size.map(|_| encoded.len()),
                body_8bit: capabilities.eight_bit_mime,
            })
            .await?;
        if !response.is_success() {
            return Err(response.to_error());
        }
        transport.set_state(TransactionState::InTransaction);

        let mut rejected = Vec::new();
        for recipient in message.envelope_recipients() {
            let response = transport
                .send_command(&SmtpCommand::RcptTo {
                    address: recipient.to_smtp(),
                })
                .await?;
            if response.is_success() {
                transport.set_state(TransactionState::RecipientsAdded);
            } else {
                rejected.push(format!("{}: {}", recipient.email(), response.full_message()));
            }
        }

        if !rejected.is_empty() {
            // Abort the transaction so the connection quits cleanly
            let _ = transport.send_command(&SmtpCommand::Rset).await;
            return Err(MailError::new(
                MailErrorKind::InvalidRecipientAddress,
                format!("Recipients rejected: {}", rejected.join("; ")),
            ));
        }

        let response = transport.send_command(&SmtpCommand::Data).await?;
        if !response.is_intermediate() {
            return Err(response.to_error());
        }

        let data = MimeWriter::prepare_data_content(&encoded);
        transport.send_data(&data).await?;

        let response = transport.read_response().await?;
        if !response.is_success() {
            return Err(response.to_error());
        }
        transport.set_state(TransactionState::Complete);

        tracing::debug!(code = response.code, "Message accepted");
        Ok(())
    }

    /// Sends EHLO, falling back to HELO for servers without ESMTP.
    async fn greet(&self, transport: &mut dyn SmtpTransport) -> MailResult<EsmtpCapabilities> {
        let response = transport
            .send_command(&SmtpCommand::Ehlo("localhost".to_string()))
            .await?;

        let capabilities = if response.is_success() {
            EsmtpCapabilities::from_ehlo_response(&response)
        } else if matches!(response.code, codes::SYNTAX_ERROR | codes::NOT_IMPLEMENTED) {
            let response = transport
                .send_command(&SmtpCommand::Helo("localhost".to_string()))
                .await?;
            if !response.is_success() {
                return Err(response.to_error());
            }
            EsmtpCapabilities::default()
        } else {
            return Err(response.to_error());
        };

        transport.set_state(TransactionState::Greeted);
        transport.set_capabilities(capabilities.clone());
        Ok(capabilities)
    }

    /// Obtains a token (refreshing it when stale) and authenticates.
    async fn authenticate(
        &self,
        transport: &mut dyn SmtpTransport,
        capabilities: &EsmtpCapabilities,
    ) -> MailResult<()> {
        let secret = self.options.client_secret.as_ref().ok_or_else(|| {
            MailError::configuration("client_secret is required for SMTP authentication")
        })?;
        let keys = ProviderKeys {
            client_id: self.options.client_id.clone(),
            client_secret: secret.clone(),
        };

        let token = self
            .provider
            .obtain(&keys, &[MAIL_SCOPE], &self.options.user)
            .await?;

        let token = if token.is_stale() {
            self.metrics.record_token_refresh();
            tracing::debug!("Access token is stale, refreshing");
            self.provider.refresh(&token).await?
        } else {
            token
        };

        // XOAUTH2 unless the server advertises only OAUTHBEARER
        let mechanism = capabilities
            .bearer_mechanism()
            .unwrap_or(AuthMethod::XOAuth2);

        let initial_response = match mechanism {
            AuthMethod::XOAuth2 => {
                Authenticator::xoauth2_initial_response(&self.options.user, &token.access_token)
            }
            AuthMethod::OAuthBearer => Authenticator::oauth_bearer_initial_response(
                &token.access_token,
                Some(&self.options.server),
                Some(self.options.port),
            ),
        };

        self.metrics.record_auth_attempt();
        let response = transport
            .send_command(&SmtpCommand::Auth {
                mechanism: mechanism.mechanism_name().to_string(),
                initial_response: Some(initial_response),
            })
            .await?;

        if response.code != codes::AUTH_SUCCESS {
            self.metrics.record_auth_failure();
            return Err(MailError::credentials(format!(
                "Authentication failed: {}",
                response.full_message()
            ))
            .with_smtp_code(response.code));
        }

        transport.set_state(TransactionState::Authenticated);
        Ok(())
    }

    /// Blocking variant of [`MailSender::send`] for synchronous callers.
    pub fn send_blocking(
        &self,
        data: &EmailData,
        cancellation: Option<&CancellationToken>,
    ) -> MailResult<SendResponse> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                MailError::new(
                    MailErrorKind::Unknown,
                    format!("Failed to build runtime: {}", e),
                )
            })?;
        runtime.block_on(self.send(data, cancellation))
    }
}

#[async_trait]
impl MailSender for OAuth2SmtpSender {
    async fn send(
        &self,
        data: &EmailData,
        cancellation: Option<&CancellationToken>,
    ) -> MailResult<SendResponse> {
        let message = compose(data)?;
        Ok(self.send_message(&message, cancellation).await)
    }
}

impl std::fmt::Debug for OAuth2SmtpSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2SmtpSender")
            .field("server", &self.options.server)
            .field("port", &self.options.port)
            .field("user", &self.options.user)
            .field("pickup", &self.options.use_pickup_directory)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{
        auth_success_response, data_ready_response, ehlo_response, test_email, MockCredentialProvider,
        MockTransport,
    };
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use std::time::Duration;

    fn network_options() -> SmtpOAuth2Options {
        SmtpOAuth2Options::builder()
            .server("smtp.example.com")
            .port(587)
            .user("user@example.com")
            .client_id("client-id")
            .client_secret("client-secret")
            .build()
            .unwrap()
    }

    fn sender_with(provider: MockCredentialProvider) -> OAuth2SmtpSender {
        OAuth2SmtpSender::new(network_options(), Arc::new(provider))
    }

    fn queue_happy_path(transport: &MockTransport) {
        transport.queue_response(ehlo_response());
        transport.queue_response(auth_success_response());
        transport.queue_ok(); // MAIL FROM
        transport.queue_ok(); // RCPT TO
        transport.queue_response(data_ready_response());
        transport.queue_ok(); // final 250 after data
    }

    #[tokio::test]
    async fn test_pre_cancelled_send_returns_exact_message() {
        let sender = sender_with(MockCredentialProvider::fresh("token"));
        let token = CancellationToken::new();
        token.cancel();

        let response = sender
            .send(&test_email().unwrap(), Some(&token))
            .await
            .unwrap();

        assert!(!response.is_successful());
        assert_eq!(
            response.error_messages,
            vec!["Message was cancelled by cancellation token.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_transact_command_sequence() {
        let sender = sender_with(MockCredentialProvider::fresh("token"));
        let mut transport = MockTransport::new();
        queue_happy_path(&transport);

        let message = compose(&test_email().unwrap()).unwrap();
        sender.transact(&mut transport, &message).await.unwrap();

        let commands = transport.recorded_commands();
        assert!(matches!(commands[0], SmtpCommand::Ehlo(_)));
        assert!(matches!(commands[1], SmtpCommand::Auth { .. }));
        assert!(matches!(commands[2], SmtpCommand::MailFrom { .. }));
        assert!(matches!(commands[3], SmtpCommand::RcptTo { .. }));
        assert!(matches!(commands[4], SmtpCommand::Data));
        assert_eq!(commands.len(), 5);

        // Data is dot-stuffed and terminated
        let data = transport.received_data();
        let last = data.last().unwrap();
        assert!(last.ends_with(b"\r\n.\r\n"));
    }

    #[tokio::test]
    async fn test_stale_token_refreshed_once_and_used() {
        let provider = MockCredentialProvider::stale("stale-token", "fresh-token");
        let sender = OAuth2SmtpSender::new(network_options(), Arc::new(provider));
        let mut transport = MockTransport::new();
        queue_happy_path(&transport);

        let message = compose(&test_email().unwrap()).unwrap();
        sender.transact(&mut transport, &message).await.unwrap();

        assert_eq!(sender.metrics().snapshot().token_refreshes, 1);

        let commands = transport.recorded_commands();
        let auth_arg = commands
            .iter()
            .find_map(|c| match c {
                SmtpCommand::Auth {
                    initial_response: Some(r),
                    ..
                } => Some(r.clone()),
                _ => None,
            })
            .unwrap();
        let decoded = String::from_utf8(BASE64.decode(&auth_arg).unwrap()).unwrap();
        assert!(decoded.contains("auth=Bearer fresh-token"));
        assert!(!decoded.contains("stale-token"));
    }

    #[tokio::test]
    async fn test_rejected_recipient_aborts_with_rset() {
        let sender = sender_with(MockCredentialProvider::fresh("token"));
        let mut transport = MockTransport::new();
        transport.queue_response(ehlo_response());
        transport.queue_response(auth_success_response());
        transport.queue_ok(); // MAIL FROM
        transport.queue_error(codes::MAILBOX_UNAVAILABLE, "User unknown"); // RCPT TO

        let message = compose(&test_email().unwrap()).unwrap();
        let err = sender.transact(&mut transport, &message).await.unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::InvalidRecipientAddress);
        assert!(err.message().contains("recipient@example.com"));

        let commands = transport.recorded_commands();
        assert!(commands.iter().any(|c| matches!(c, SmtpCommand::Rset)));
        assert!(!commands.iter().any(|c| matches!(c, SmtpCommand::Data)));
    }

    #[tokio::test]
    async fn test_no_recipients_is_an_error() {
        let sender = sender_with(MockCredentialProvider::fresh("token"));
        let mut transport = MockTransport::new();

        let email = EmailData::builder()
            .from("sender@example.com")
            .unwrap()
            .build()
            .unwrap();
        let message = compose(&email).unwrap();

        let err = sender.transact(&mut transport, &message).await.unwrap_err();
        assert_eq!(err.message(), "No recipients have been specified.");
        assert!(transport.recorded_commands().is_empty());
    }

    #[tokio::test]
    async fn test_failed_token_obtain_aborts_before_auth() {
        let provider = Arc::new(MockCredentialProvider::fresh("token").failing_obtain());
        let sender = OAuth2SmtpSender::new(
            network_options(),
            Arc::clone(&provider) as Arc<dyn CredentialProvider>,
        );
        let mut transport = MockTransport::new();
        transport.queue_response(ehlo_response());

        let message = compose(&test_email().unwrap()).unwrap();
        let err = sender.transact(&mut transport, &message).await.unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::CredentialsInvalid);
        assert_eq!(provider.obtain_calls(), 1);

        let commands = transport.recorded_commands();
        assert!(!commands.iter().any(|c| matches!(c, SmtpCommand::Auth { .. })));
    }

    #[tokio::test]
    async fn test_failed_token_refresh_aborts_before_auth() {
        let provider =
            Arc::new(MockCredentialProvider::stale("stale-token", "fresh-token").failing_refresh());
        let sender = OAuth2SmtpSender::new(
            network_options(),
            Arc::clone(&provider) as Arc<dyn CredentialProvider>,
        );
        let mut transport = MockTransport::new();
        transport.queue_response(ehlo_response());

        let message = compose(&test_email().unwrap()).unwrap();
        let err = sender.transact(&mut transport, &message).await.unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::CredentialsInvalid);
        assert_eq!(provider.refresh_calls(), 1);

        let commands = transport.recorded_commands();
        assert!(!commands.iter().any(|c| matches!(c, SmtpCommand::Auth { .. })));
    }

    #[tokio::test]
    async fn test_auth_rejection_is_credentials_error() {
        let sender = sender_with(MockCredentialProvider::fresh("token"));
        let mut transport = MockTransport::new();
        transport.queue_response(ehlo_response());
        transport.queue_error(codes::AUTH_FAILED, "Invalid credentials");

        let message = compose(&test_email().unwrap()).unwrap();
        let err = sender.transact(&mut transport, &message).await.unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::CredentialsInvalid);
        assert_eq!(err.smtp_code(), Some(codes::AUTH_FAILED));
        assert_eq!(sender.metrics().snapshot().auth_failures, 1);
    }

    #[tokio::test]
    async fn test_unreachable_server_folds_into_response() {
        // Nothing listens on port 1; the failure must come back as a
        // response message, not an Err and not a panic.
        let options = SmtpOAuth2Options::builder()
            .server("127.0.0.1")
            .port(1)
            .user("bob@x.com")
            .client_id("client-id")
            .client_secret("client-secret")
            .connect_timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let sender =
            OAuth2SmtpSender::new(options, Arc::new(MockCredentialProvider::fresh("token")));

        let email = EmailData::builder()
            .from("bob@x.com")
            .unwrap()
            .to("Bob <bob@x.com>")
            .unwrap()
            .subject("Hi")
            .text("Hello")
            .build()
            .unwrap();

        let response = sender.send(&email, None).await.unwrap();
        assert!(!response.is_successful());
        assert_eq!(response.error_messages.len(), 1);
    }

    #[tokio::test]
    async fn test_pickup_mode_writes_instead_of_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let options = SmtpOAuth2Options::builder()
            .pickup_directory(dir.path())
            .build()
            .unwrap();
        let sender =
            OAuth2SmtpSender::new(options, Arc::new(MockCredentialProvider::fresh("token")));

        let response = sender.send(&test_email().unwrap(), None).await.unwrap();
        assert!(response.is_successful());

        let count = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 1);
        assert_eq!(sender.metrics().snapshot().pickup_writes, 1);
    }

    #[test]
    fn test_send_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let options = SmtpOAuth2Options::builder()
            .pickup_directory(dir.path())
            .build()
            .unwrap();
        let sender =
            OAuth2SmtpSender::new(options, Arc::new(MockCredentialProvider::fresh("token")));

        let response = sender.send_blocking(&test_email().unwrap(), None).unwrap();
        assert!(response.is_successful());
    }
}
