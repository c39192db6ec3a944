//! Core types for the mailer.
//!
//! This module provides:
//! - The provider-agnostic email data model
//! - Address types with validation
//! - Attachment handling
//! - The uniform send outcome type

use std::collections::BTreeMap;
use std::fmt;
use serde::{Deserialize, Serialize};

use crate::errors::{MailError, MailErrorKind, MailResult};

/// Email address with optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// Display name (e.g., "John Doe").
    pub name: Option<String>,
    /// Email address (e.g., "john@example.com").
    pub email: String,
}

impl Address {
    /// Creates a new address with just an email.
    pub fn new(email: impl Into<String>) -> MailResult<Self> {
        let email = email.into();
        Self::validate_email(&email)?;
        Ok(Self { name: None, email })
    }

    /// Creates a new address with display name and email.
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> MailResult<Self> {
        let email = email.into();
        Self::validate_email(&email)?;
        Ok(Self {
            name: Some(name.into()),
            email,
        })
    }

    /// Parses an address from a string (e.g., "John Doe <john@example.com>").
    pub fn parse(s: &str) -> MailResult<Self> {
        let s = s.trim();

        // Check for "Name <email>" format
        if let Some(start) = s.find('<') {
            if let Some(end) = s.find('>') {
                let name = s[..start].trim().trim_matches('"');
                let email = s[start + 1..end].trim();
                return Self::with_name(name, email);
            }
        }

        // Plain email address
        Self::new(s)
    }

    /// Validates an email address according to RFC 5321/5322.
    fn validate_email(email: &str) -> MailResult<()> {
        if email.is_empty() {
            return Err(MailError::composition(
                MailErrorKind::InvalidFromAddress,
                "Email address cannot be empty",
            ));
        }

        if email.len() > 254 {
            return Err(MailError::composition(
                MailErrorKind::InvalidFromAddress,
                "Email address too long (max 254 characters)",
            ));
        }

        // Must have exactly one @
        let at_count = email.chars().filter(|c| *c == '@').count();
        if at_count != 1 {
            return Err(MailError::composition(
                MailErrorKind::InvalidFromAddress,
                "Email address must contain exactly one @",
            ));
        }

        let parts: Vec<&str> = email.split('@').collect();
        let local = parts[0];
        let domain = parts[1];

        if local.is_empty() || local.len() > 64 {
            return Err(MailError::composition(
                MailErrorKind::InvalidFromAddress,
                "Local part must be 1-64 characters",
            ));
        }

        if domain.is_empty() {
            return Err(MailError::composition(
                MailErrorKind::InvalidFromAddress,
                "Domain cannot be empty",
            ));
        }

        if email.chars().any(|c| c.is_control()) {
            return Err(MailError::composition(
                MailErrorKind::InvalidFromAddress,
                "Email address cannot contain control characters",
            ));
        }

        Ok(())
    }

    /// Returns the email part only.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the display name if present.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Formats the address for SMTP MAIL FROM/RCPT TO commands.
    pub fn to_smtp(&self) -> String {
        format!("<{}>", self.email)
    }

    /// Formats the address for email headers.
    pub fn to_header(&self) -> String {
        match &self.name {
            Some(name) => {
                // Quote name if it contains special characters
                if name.contains(|c: char| !c.is_alphanumeric() && c != ' ') {
                    format!("\"{}\" <{}>", name, self.email)
                } else {
                    format!("{} <{}>", name, self.email)
                }
            }
            None => self.email.clone(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_header())
    }
}

impl TryFrom<&str> for Address {
    type Error = MailError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Address::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = MailError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Address::parse(&s)
    }
}

/// File attachment.
///
/// Owned by the [`EmailData`] value that contains it; read-only during
/// composition. The declared content type is parsed when the message is
/// composed, and a malformed value is a composition fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Filename.
    pub filename: String,
    /// Declared MIME content type.
    pub content_type: String,
    /// Binary content.
    pub data: Vec<u8>,
    /// Content ID for inline references (e.g., embedded images).
    pub content_id: Option<String>,
}

impl Attachment {
    /// Creates a new attachment.
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            data,
            content_id: None,
        }
    }

    /// Creates an attachment with the content type guessed from the filename.
    pub fn from_file(filename: impl Into<String>, data: Vec<u8>) -> Self {
        let filename = filename.into();
        let content_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .to_string();
        Self::new(filename, content_type, data)
    }

    /// Sets the content ID so the attachment can be referenced inline.
    pub fn with_content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }
}

/// Message priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Low priority (maps to non-urgent on the wire).
    Low,
    /// Normal priority.
    #[default]
    Normal,
    /// High priority (maps to urgent on the wire).
    High,
}

/// Immutable description of one message to send.
///
/// Address lists preserve their order into the wire message and may contain
/// duplicates. Custom headers are kept in an ordered map so that composing
/// the same value twice yields structurally identical output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailData {
    /// Sender address (exactly one).
    pub from: Address,
    /// Primary recipients.
    pub to: Vec<Address>,
    /// CC recipients.
    pub cc: Vec<Address>,
    /// BCC recipients.
    pub bcc: Vec<Address>,
    /// Reply-to addresses.
    pub reply_to: Vec<Address>,
    /// Email subject (may be empty, never absent in composed output).
    pub subject: String,
    /// Message body.
    pub body: String,
    /// Plain-text alternative body; when non-empty the body is treated as HTML.
    pub plaintext_alternative_body: Option<String>,
    /// Whether the body is HTML.
    pub is_html: bool,
    /// File attachments, in order.
    pub attachments: Vec<Attachment>,
    /// Custom headers, appended after the Subject/Encoding headers.
    pub headers: BTreeMap<String, String>,
    /// Message priority.
    pub priority: Priority,
}

impl EmailData {
    /// Creates a new email data builder.
    pub fn builder() -> EmailDataBuilder {
        EmailDataBuilder::default()
    }

    /// Returns all envelope recipients (to + cc + bcc).
    pub fn all_recipients(&self) -> impl Iterator<Item = &Address> {
        self.to.iter().chain(self.cc.iter()).chain(self.bcc.iter())
    }

    /// Returns the count of all envelope recipients.
    pub fn recipient_count(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }

    /// Returns true if the email has any attachments.
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

/// Builder for [`EmailData`] values.
#[derive(Debug, Default)]
pub struct EmailDataBuilder {
    from: Option<Address>,
    to: Vec<Address>,
    cc: Vec<Address>,
    bcc: Vec<Address>,
    reply_to: Vec<Address>,
    subject: String,
    body: String,
    plaintext_alternative_body: Option<String>,
    is_html: bool,
    attachments: Vec<Attachment>,
    headers: BTreeMap<String, String>,
    priority: Priority,
}

impl EmailDataBuilder {
    /// Sets the sender address.
    pub fn from(mut self, address: impl TryInto<Address, Error = MailError>) -> MailResult<Self> {
        self.from = Some(address.try_into()?);
        Ok(self)
    }

    /// Sets the sender from an already validated address.
    pub fn from_address(mut self, address: Address) -> Self {
        self.from = Some(address);
        self
    }

    /// Adds a primary recipient.
    pub fn to(mut self, address: impl TryInto<Address, Error = MailError>) -> MailResult<Self> {
        self.to.push(address.try_into()?);
        Ok(self)
    }

    /// Adds a CC recipient.
    pub fn cc(mut self, address: impl TryInto<Address, Error = MailError>) -> MailResult<Self> {
        self.cc.push(address.try_into()?);
        Ok(self)
    }

    /// Adds a BCC recipient.
    pub fn bcc(mut self, address: impl TryInto<Address, Error = MailError>) -> MailResult<Self> {
        self.bcc.push(address.try_into()?);
        Ok(self)
    }

    /// Adds a reply-to address.
    pub fn reply_to(mut self, address: impl TryInto<Address, Error = MailError>) -> MailResult<Self> {
        self.reply_to.push(address.try_into()?);
        Ok(self)
    }

    /// Sets the subject.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets a plain-text body.
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.is_html = false;
        self
    }

    /// Sets an HTML body.
    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.is_html = true;
        self
    }

    /// Sets the plain-text alternative body for multipart/alternative output.
    pub fn plaintext_alternative(mut self, body: impl Into<String>) -> Self {
        self.plaintext_alternative_body = Some(body.into());
        self
    }

    /// Adds an attachment.
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Adds a custom header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Builds the email data value.
    pub fn build(self) -> MailResult<EmailData> {
        let from = self.from.ok_or_else(|| {
            MailError::composition(MailErrorKind::InvalidFromAddress, "From address is required")
        })?;

        Ok(EmailData {
            from,
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            reply_to: self.reply_to,
            subject: self.subject,
            body: self.body,
            plaintext_alternative_body: self.plaintext_alternative_body,
            is_html: self.is_html,
            attachments: self.attachments,
            headers: self.headers,
            priority: self.priority,
        })
    }
}

/// Uniform outcome of one send attempt.
///
/// Successful iff the error list is empty; there is no partial-success state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendResponse {
    /// Error messages, in the order they were produced.
    pub error_messages: Vec<String>,
}

impl SendResponse {
    /// Creates a successful response.
    pub fn success() -> Self {
        Self::default()
    }

    /// Creates a failed response with a single error message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error_messages: vec![message.into()],
        }
    }

    /// Returns true iff no errors were recorded.
    pub fn is_successful(&self) -> bool {
        self.error_messages.is_empty()
    }

    /// Appends an error message.
    pub fn push_error(&mut self, message: impl Into<String>) {
        self.error_messages.push(message.into());
    }

    /// Returns the error messages joined for display.
    pub fn joined_errors(&self) -> String {
        self.error_messages.join(", ")
    }
}
