//! Error types for the mailer.
//!
//! Provides a single error type covering composition, credential,
//! transport and pickup-directory failures, with SMTP reply-code mapping.

use std::fmt;
use thiserror::Error;

/// Result type for mailer operations.
pub type MailResult<T> = Result<T, MailError>;

/// Error kinds categorizing the failure modes of a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MailErrorKind {
    // Cancellation
    /// Send was cancelled before any network activity.
    Cancelled,

    // Connection errors
    /// Connection was refused.
    ConnectionRefused,
    /// Connection timed out.
    ConnectionTimeout,
    /// Connection was reset.
    ConnectionReset,

    // TLS errors
    /// TLS handshake failed.
    TlsHandshakeFailed,
    /// STARTTLS not supported by server.
    StarttlsNotSupported,

    // Credential errors
    /// Credentials are invalid or were rejected.
    CredentialsInvalid,
    /// OAuth2 token acquisition or refresh failed.
    TokenRefreshFailed,
    /// No compatible SASL mechanism.
    AuthMethodNotSupported,

    // Protocol errors
    /// Invalid response from server.
    InvalidResponse,
    /// Unexpected response code.
    UnexpectedResponse,
    /// Server is shutting down (421).
    ServerShutdown,

    // Message errors
    /// Invalid sender address.
    InvalidFromAddress,
    /// Invalid recipient address.
    InvalidRecipientAddress,
    /// Invalid header name or value.
    InvalidHeader,
    /// Encoding failed.
    EncodingFailed,
    /// Attachment error (e.g. malformed content type).
    AttachmentError,
    /// Message exceeds server size limit.
    MessageTooLarge,

    // Timeout errors
    /// Connect timeout.
    ConnectTimeout,
    /// Read timeout.
    ReadTimeout,
    /// Write timeout.
    WriteTimeout,

    // Pickup directory
    /// Pickup-directory I/O failure.
    PickupIo,

    // Configuration errors
    /// Configuration is invalid.
    ConfigurationInvalid,

    // Generic
    /// Unknown or internal error.
    Unknown,
}

impl fmt::Display for MailErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailErrorKind::Cancelled => write!(f, "Cancelled"),
            MailErrorKind::ConnectionRefused => write!(f, "Connection refused"),
            MailErrorKind::ConnectionTimeout => write!(f, "Connection timed out"),
            MailErrorKind::ConnectionReset => write!(f, "Connection reset"),
            MailErrorKind::TlsHandshakeFailed => write!(f, "TLS handshake failed"),
            MailErrorKind::StarttlsNotSupported => write!(f, "STARTTLS not supported"),
            MailErrorKind::CredentialsInvalid => write!(f, "Invalid credentials"),
            MailErrorKind::TokenRefreshFailed => write!(f, "Token refresh failed"),
            MailErrorKind::AuthMethodNotSupported => write!(f, "Auth method not supported"),
            MailErrorKind::InvalidResponse => write!(f, "Invalid server response"),
            MailErrorKind::UnexpectedResponse => write!(f, "Unexpected response"),
            MailErrorKind::ServerShutdown => write!(f, "Server shutting down"),
            MailErrorKind::InvalidFromAddress => write!(f, "Invalid sender address"),
            MailErrorKind::InvalidRecipientAddress => write!(f, "Invalid recipient address"),
            MailErrorKind::InvalidHeader => write!(f, "Invalid header"),
            MailErrorKind::EncodingFailed => write!(f, "Encoding failed"),
            MailErrorKind::AttachmentError => write!(f, "Attachment error"),
            MailErrorKind::MessageTooLarge => write!(f, "Message too large"),
            MailErrorKind::ConnectTimeout => write!(f, "Connect timeout"),
            MailErrorKind::ReadTimeout => write!(f, "Read timeout"),
            MailErrorKind::WriteTimeout => write!(f, "Write timeout"),
            MailErrorKind::PickupIo => write!(f, "Pickup directory I/O error"),
            MailErrorKind::ConfigurationInvalid => write!(f, "Invalid configuration"),
            MailErrorKind::Unknown => write!(f, "Unknown error"),
        }
    }
}

/// Enhanced SMTP status code (RFC 2034).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancedStatusCode {
    /// Class (2=success, 4=temporary, 5=permanent).
    pub class: u8,
    /// Subject (e.g., 1=addressing, 2=mailbox, 3=mail system).
    pub subject: u16,
    /// Detail code.
    pub detail: u16,
}

impl EnhancedStatusCode {
    /// Creates a new enhanced status code.
    pub fn new(class: u8, subject: u16, detail: u16) -> Self {
        Self { class, subject, detail }
    }

    /// Parses an enhanced status code from a string (e.g., "5.1.1").
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return None;
        }
        Some(Self {
            class: parts[0].parse().ok()?,
            subject: parts[1].parse().ok()?,
            detail: parts[2].parse().ok()?,
        })
    }

    /// Returns true if this is a permanent failure.
    pub fn is_permanent(&self) -> bool {
        self.class == 5
    }

    /// Returns true if this is a temporary failure.
    pub fn is_temporary(&self) -> bool {
        self.class == 4
    }
}

impl fmt::Display for EnhancedStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.class, self.subject, self.detail)
    }
}

/// Mailer error with detailed information.
#[derive(Error, Debug)]
pub struct MailError {
    /// Error kind.
    kind: MailErrorKind,
    /// Human-readable message.
    message: String,
    /// SMTP status code if available.
    smtp_code: Option<u16>,
    /// Enhanced status code if available.
    enhanced_code: Option<EnhancedStatusCode>,
    /// Underlying cause.
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl MailError {
    /// Creates a new mailer error.
    pub fn new(kind: MailErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            smtp_code: None,
            enhanced_code: None,
            cause: None,
        }
    }

    /// Sets the SMTP status code.
    pub fn with_smtp_code(mut self, code: u16) -> Self {
        self.smtp_code = Some(code);
        self
    }

    /// Sets the enhanced status code.
    pub fn with_enhanced_code(mut self, code: EnhancedStatusCode) -> Self {
        self.enhanced_code = Some(code);
        self
    }

    /// Sets the underlying cause.
    pub fn with_cause<E: std::error::Error + Send + Sync + 'static>(mut self, cause: E) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> MailErrorKind {
        self.kind
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the SMTP status code if available.
    pub fn smtp_code(&self) -> Option<u16> {
        self.smtp_code
    }

    /// Returns the enhanced status code if available.
    pub fn enhanced_code(&self) -> Option<&EnhancedStatusCode> {
        self.enhanced_code.as_ref()
    }

    // Convenience constructors

    /// Creates the synthetic cancellation error.
    pub fn cancelled() -> Self {
        Self::new(
            MailErrorKind::Cancelled,
            "Message was cancelled by cancellation token.",
        )
    }

    /// Creates a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::ConnectionRefused, message)
    }

    /// Creates a timeout error.
    pub fn timeout(kind: MailErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message)
    }

    /// Creates a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::TlsHandshakeFailed, message)
    }

    /// Creates a credential error.
    pub fn credentials(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::CredentialsInvalid, message)
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::InvalidResponse, message)
    }

    /// Creates a message composition error.
    pub fn composition(kind: MailErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message)
    }

    /// Creates a pickup-directory I/O error.
    pub fn pickup(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::PickupIo, message)
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(MailErrorKind::ConfigurationInvalid, message)
    }

    /// Creates an error from an SMTP response code and message.
    pub fn from_smtp_response(code: u16, message: impl Into<String>) -> Self {
        let msg = message.into();
        let kind = match code {
            421 => MailErrorKind::ServerShutdown,
            450 | 451 | 452 => MailErrorKind::UnexpectedResponse,
            500 | 501 | 502 | 503 => MailErrorKind::InvalidResponse,
            530 | 535 => MailErrorKind::CredentialsInvalid,
            550 => MailErrorKind::InvalidRecipientAddress,
            552 => MailErrorKind::MessageTooLarge,
            553 => MailErrorKind::InvalidFromAddress,
            _ if code >= 400 => MailErrorKind::UnexpectedResponse,
            _ => MailErrorKind::Unknown,
        };
        Self::new(kind, msg).with_smtp_code(code)
    }
}

impl fmt::Display for MailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(code) = self.smtp_code {
            write!(f, " (SMTP {})", code)?;
        }
        if let Some(enhanced) = &self.enhanced_code {
            write!(f, " [{}]", enhanced)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enhanced_status_code_parse() {
        let code = EnhancedStatusCode::parse("5.1.1").unwrap();
        assert_eq!(code.class, 5);
        assert_eq!(code.subject, 1);
        assert_eq!(code.detail, 1);
        assert!(code.is_permanent());
        assert!(!code.is_temporary());

        assert!(EnhancedStatusCode::parse("5.1").is_none());
        assert!(EnhancedStatusCode::parse("a.b.c").is_none());
    }

    #[test]
    fn test_error_from_smtp_response() {
        let err = MailError::from_smtp_response(535, "Authentication failed");
        assert_eq!(err.kind(), MailErrorKind::CredentialsInvalid);
        assert_eq!(err.smtp_code(), Some(535));

        let err = MailError::from_smtp_response(421, "Service unavailable");
        assert_eq!(err.kind(), MailErrorKind::ServerShutdown);

        let err = MailError::from_smtp_response(552, "Too big");
        assert_eq!(err.kind(), MailErrorKind::MessageTooLarge);
    }

    #[test]
    fn test_cancelled_message_text() {
        let err = MailError::cancelled();
        assert_eq!(err.kind(), MailErrorKind::Cancelled);
        assert_eq!(err.message(), "Message was cancelled by cancellation token.");
    }

    #[test]
    fn test_display_includes_code() {
        let err = MailError::from_smtp_response(550, "User unknown")
            .with_enhanced_code(EnhancedStatusCode::new(5, 1, 1));
        let text = err.to_string();
        assert!(text.contains("SMTP 550"));
        assert!(text.contains("[5.1.1]"));
    }
}
