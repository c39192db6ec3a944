//! Mock implementations for testing.
//!
//! Provides mock transports, credential providers and service collaborators
//! for London-School TDD.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::auth::{CredentialProvider, OAuth2Token, ProviderKeys};
use crate::errors::{MailError, MailResult};
use crate::protocol::{EsmtpCapabilities, SmtpCommand, SmtpResponse, TransactionState, codes};
use crate::service::{OutcomeReporter, TemplateRenderer};
use crate::transport::SmtpTransport;
use crate::types::{EmailData, SendResponse};

/// Mock SMTP transport for testing.
#[derive(Debug)]
pub struct MockTransport {
    /// Recorded commands.
    commands: Arc<Mutex<Vec<SmtpCommand>>>,
    /// Queued responses.
    responses: Arc<Mutex<VecDeque<SmtpResponse>>>,
    /// Default response.
    default_response: SmtpResponse,
    /// Current state.
    state: TransactionState,
    /// Server capabilities.
    capabilities: Option<EsmtpCapabilities>,
    /// TLS enabled.
    tls_enabled: bool,
    /// Data received.
    data_received: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Simulate failure.
    fail_next: Arc<Mutex<Option<MailError>>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            commands: Arc::new(Mutex::new(Vec::new())),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            default_response: SmtpResponse::new(codes::OK, "OK"),
            state: TransactionState::Connected,
            capabilities: Some(Self::default_capabilities()),
            tls_enabled: false,
            data_received: Arc::new(Mutex::new(Vec::new())),
            fail_next: Arc::new(Mutex::new(None)),
        }
    }

    /// Creates default ESMTP capabilities (XOAUTH2, no STARTTLS).
    pub fn default_capabilities() -> EsmtpCapabilities {
        let mut caps = EsmtpCapabilities::default();
        caps.eight_bit_mime = true;
        caps.auth_mechanisms.insert(crate::auth::AuthMethod::XOAuth2);
        caps.size = Some(10 * 1024 * 1024);
        caps.raw = vec![
            "SIZE 10485760".to_string(),
            "AUTH XOAUTH2".to_string(),
            "8BITMIME".to_string(),
        ];
        caps
    }

    /// Queues a response.
    pub fn queue_response(&self, response: SmtpResponse) -> &Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    /// Queues an OK response.
    pub fn queue_ok(&self) -> &Self {
        self.queue_response(SmtpResponse::new(codes::OK, "OK"))
    }

    /// Queues an error response.
    pub fn queue_error(&self, code: u16, message: &str) -> &Self {
        self.queue_response(SmtpResponse::new(code, message))
    }

    /// Sets the next call to fail.
    pub fn fail_next_with(&self, error: MailError) -> &Self {
        *self.fail_next.lock().unwrap() = Some(error);
        self
    }

    /// Returns recorded commands.
    pub fn recorded_commands(&self) -> Vec<SmtpCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Returns received data.
    pub fn received_data(&self) -> Vec<Vec<u8>> {
        self.data_received.lock().unwrap().clone()
    }

    fn get_next_response(&self) -> SmtpResponse {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_response.clone())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SmtpTransport for MockTransport {
    async fn send_command(&mut self, command: &SmtpCommand) -> MailResult<SmtpResponse> {
        if let Some(error) = self.fail_next.lock().unwrap().take() {
            return Err(error);
        }

        self.commands.lock().unwrap().push(command.clone());
        Ok(self.get_next_response())
    }

    async fn send_data(&mut self, data: &[u8]) -> MailResult<()> {
        if let Some(error) = self.fail_next.lock().unwrap().take() {
            return Err(error);
        }

        self.data_received.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn read_response(&mut self) -> MailResult<SmtpResponse> {
        if let Some(error) = self.fail_next.lock().unwrap().take() {
            return Err(error);
        }

        Ok(self.get_next_response())
    }

    async fn upgrade_tls(&mut self, _host: &str) -> MailResult<()> {
        if let Some(error) = self.fail_next.lock().unwrap().take() {
            return Err(error);
        }

        self.tls_enabled = true;
        self.state = TransactionState::TlsEstablished;
        Ok(())
    }

    fn is_tls(&self) -> bool {
        self.tls_enabled
    }

    async fn close(&mut self) -> MailResult<()> {
        self.state = TransactionState::Closed;
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

/// Mock credential provider with staleness and call counting.
#[derive(Debug)]
pub struct MockCredentialProvider {
    initial: OAuth2Token,
    refreshed: OAuth2Token,
    obtain_calls: AtomicU64,
    refresh_calls: AtomicU64,
    fail_obtain: bool,
    fail_refresh: bool,
}

impl MockCredentialProvider {
    /// Creates a provider whose initial token is fresh.
    pub fn fresh(access_token: &str) -> Self {
        Self {
            initial: OAuth2Token::new(access_token),
            refreshed: OAuth2Token::new(access_token),
            obtain_calls: AtomicU64::new(0),
            refresh_calls: AtomicU64::new(0),
            fail_obtain: false,
            fail_refresh: false,
        }
    }

    /// Creates a provider whose initial token is already stale; refresh
    /// hands out the second token.
    pub fn stale(initial_token: &str, refreshed_token: &str) -> Self {
        Self {
            initial: OAuth2Token::new(initial_token).with_expires_at(0),
            refreshed: OAuth2Token::new(refreshed_token),
            obtain_calls: AtomicU64::new(0),
            refresh_calls: AtomicU64::new(0),
            fail_obtain: false,
            fail_refresh: false,
        }
    }

    /// Makes obtain fail.
    pub fn failing_obtain(mut self) -> Self {
        self.fail_obtain = true;
        self
    }

    /// Makes refresh fail.
    pub fn failing_refresh(mut self) -> Self {
        self.fail_refresh = true;
        self
    }

    /// Number of obtain calls so far.
    pub fn obtain_calls(&self) -> u64 {
        self.obtain_calls.load(Ordering::SeqCst)
    }

    /// Number of refresh calls so far.
    pub fn refresh_calls(&self) -> u64 {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for MockCredentialProvider {
    async fn obtain(
        &self,
        _keys: &ProviderKeys,
        _scopes: &[&str],
        _user: &str,
    ) -> MailResult<OAuth2Token> {
        self.obtain_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_obtain {
            return Err(MailError::credentials("Mock obtain failure"));
        }
        Ok(self.initial.clone())
    }

    async fn refresh(&self, _token: &OAuth2Token) -> MailResult<OAuth2Token> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh {
            return Err(MailError::credentials("Mock refresh failure"));
        }
        Ok(self.refreshed.clone())
    }
}

/// Renderer that substitutes nothing and records its inputs.
#[derive(Debug, Default)]
pub struct MockTemplateRenderer {
    rendered: Mutex<Vec<String>>,
}

impl MockTemplateRenderer {
    /// Creates a new mock renderer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Templates rendered so far.
    pub fn rendered(&self) -> Vec<String> {
        self.rendered.lock().unwrap().clone()
    }
}

#[async_trait]
impl TemplateRenderer for MockTemplateRenderer {
    async fn render(&self, template: &str, _model: &serde_json::Value) -> MailResult<String> {
        self.rendered.lock().unwrap().push(template.to_string());
        Ok(template.to_string())
    }

    async fn render_file(
        &self,
        path: &std::path::Path,
        _model: &serde_json::Value,
    ) -> MailResult<String> {
        let name = path.display().to_string();
        self.rendered.lock().unwrap().push(name.clone());
        Ok(name)
    }
}

/// Reporter that records every response it sees.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<SendResponse>>,
}

impl RecordingReporter {
    /// Creates a new recording reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Responses reported so far.
    pub fn reports(&self) -> Vec<SendResponse> {
        self.reports.lock().unwrap().clone()
    }
}

impl OutcomeReporter for RecordingReporter {
    fn report(&self, response: &SendResponse) {
        self.reports.lock().unwrap().push(response.clone());
    }
}

/// Creates a test email.
pub fn test_email() -> MailResult<EmailData> {
    EmailData::builder()
        .from("sender@example.com")?
        .to("recipient@example.com")?
        .subject("Test Subject")
        .text("Test body")
        .build()
}

/// Creates an EHLO response advertising XOAUTH2.
pub fn ehlo_response() -> SmtpResponse {
    SmtpResponse {
        code: codes::OK,
        enhanced_code: None,
        message: vec![
            "smtp.example.com Hello".to_string(),
            "SIZE 10485760".to_string(),
            "AUTH XOAUTH2 OAUTHBEARER".to_string(),
            "8BITMIME".to_string(),
        ],
        is_multiline: true,
    }
}

/// Creates an authentication success response.
pub fn auth_success_response() -> SmtpResponse {
    SmtpResponse::new(codes::AUTH_SUCCESS, "Authentication successful")
}

/// Creates a DATA ready response.
pub fn data_ready_response() -> SmtpResponse {
    SmtpResponse::new(codes::START_MAIL_INPUT, "Start mail input")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transport_records_commands() {
        let mut transport = MockTransport::new();

        transport.queue_ok();
        transport.queue_ok();

        let response = transport
            .send_command(&SmtpCommand::Ehlo("test".to_string()))
            .await
            .unwrap();
        assert_eq!(response.code, 250);

        let response = transport.send_command(&SmtpCommand::Rset).await.unwrap();
        assert_eq!(response.code, 250);

        assert_eq!(transport.recorded_commands().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_transport_failure() {
        let mut transport = MockTransport::new();
        transport.fail_next_with(MailError::connection("Test failure"));

        let result = transport.send_command(&SmtpCommand::Rset).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_provider_counts() {
        let provider = MockCredentialProvider::stale("old", "new");
        let keys = ProviderKeys::new("id", "secret");

        let token = provider.obtain(&keys, &[], "user").await.unwrap();
        assert!(token.is_stale());
        assert_eq!(provider.obtain_calls(), 1);

        let refreshed = provider.refresh(&token).await.unwrap();
        assert!(!refreshed.is_stale());
        assert_eq!(provider.refresh_calls(), 1);
    }

    #[test]
    fn test_test_email() {
        let email = test_email().unwrap();
        assert_eq!(email.from.email, "sender@example.com");
        assert_eq!(email.to.len(), 1);
    }
}
