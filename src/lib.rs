//! # OAuth2 SMTP Mailer
//!
//! Sends email over SMTP with OAuth2 bearer-token authentication:
//! - SASL XOAUTH2 and OAUTHBEARER
//! - RFC 5322 MIME composition with attachments and alternative bodies
//! - Transport security (STARTTLS, implicit TLS)
//! - Pickup-directory fallback writing `<uuid>.eml` files instead of
//!   transmitting
//! - Cooperative cancellation and a uniform send outcome
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use oauth_mailer::{
//!     EmailData, MailSender, OAuth2SmtpSender, SmtpOAuth2Options, StaticTokenProvider,
//!     OAuth2Token,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = SmtpOAuth2Options::builder()
//!         .server("smtp.gmail.com")
//!         .port(587)
//!         .user("sender@gmail.com")
//!         .client_id("client-id")
//!         .client_secret("client-secret")
//!         .build()?;
//!
//!     let provider = Arc::new(StaticTokenProvider::new(OAuth2Token::new("access-token")));
//!     let sender = OAuth2SmtpSender::new(options, provider);
//!
//!     let email = EmailData::builder()
//!         .from("sender@gmail.com")?
//!         .to("recipient@example.com")?
//!         .subject("Hello from Rust!")
//!         .text("This is a test email.")
//!         .build()?;
//!
//!     let response = sender.send(&email, None).await?;
//!     println!("Sent: {}", response.is_successful());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;
pub mod types;

// Protocol layer
pub mod protocol;

// Transport layer
pub mod transport;

// Authentication
pub mod auth;

// MIME composition
pub mod mime;

// Pickup-directory delivery
pub mod pickup;

// Session management
pub mod session;

// Send orchestration
pub mod service;

// Observability
pub mod observability;

// Mocks for testing
pub mod mocks;

// Re-exports for convenience
pub use auth::{
    AuthMethod, Authenticator, CredentialProvider, OAuth2Token, ProviderKeys,
    StaticTokenProvider, MAIL_SCOPE,
};
pub use config::{SmtpOAuth2Options, SmtpOAuth2OptionsBuilder};
pub use errors::{EnhancedStatusCode, MailError, MailErrorKind, MailResult};
pub use mime::{compose, MessageBody, MimeWriter, WireMessage, WirePriority};
pub use observability::{MetricsSnapshot, SenderMetrics};
pub use pickup::PickupDirectoryWriter;
pub use protocol::{EsmtpCapabilities, SmtpCommand, SmtpResponse};
pub use service::{
    EmailMetadata, EmailService, MailerService, OutcomeReporter, TemplateRenderer,
    TracingReporter,
};
pub use session::{MailSender, OAuth2SmtpSender};
pub use transport::{SmtpTransport, TcpTransport};
pub use types::{
    Address, Attachment, EmailData, EmailDataBuilder, Priority, SendResponse,
};
