//! SMTP protocol primitives.
//!
//! The RFC 5321 subset one send attempt uses: command formatting, response
//! parsing (with RFC 2034 enhanced codes), ESMTP capability tracking and
//! transaction state.

use std::collections::HashSet;
use std::fmt;

use crate::auth::AuthMethod;
use crate::errors::{EnhancedStatusCode, MailError, MailResult};

/// SMTP commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    /// Extended HELLO with client identity.
    Ehlo(String),
    /// Basic HELLO.
    Helo(String),
    /// Start TLS negotiation.
    StartTls,
    /// Authenticate.
    Auth {
        /// Authentication mechanism.
        mechanism: String,
        /// Initial response (optional).
        initial_response: Option<String>,
    },
    /// MAIL FROM command.
    MailFrom {
        /// Sender address.
        address: String,
        /// SIZE parameter (optional).
        size: Option<usize>,
        /// 8BITMIME parameter.
        body_8bit: bool,
    },
    /// RCPT TO command.
    RcptTo {
        /// Recipient address.
        address: String,
    },
    /// DATA command.
    Data,
    /// Reset transaction.
    Rset,
    /// Quit connection.
    Quit,
}

impl SmtpCommand {
    /// Formats the command for sending.
    pub fn to_smtp_string(&self) -> String {
        match self {
            SmtpCommand::Ehlo(domain) => format!("EHLO {}", domain),
            SmtpCommand::Helo(domain) => format!("HELO {}", domain),
            SmtpCommand::StartTls => "STARTTLS".to_string(),
            SmtpCommand::Auth {
                mechanism,
                initial_response,
            } => {
                if let Some(response) = initial_response {
                    format!("AUTH {} {}", mechanism, response)
                } else {
                    format!("AUTH {}", mechanism)
                }
            }
            SmtpCommand::MailFrom {
                address,
                size,
                body_8bit,
            } => {
                let mut cmd = format!("MAIL FROM:{}", address);
                if let Some(s) = size {
                    cmd.push_str(&format!(" SIZE={}", s));
                }
                if *body_8bit {
                    cmd.push_str(" BODY=8BITMIME");
                }
                cmd
            }
            SmtpCommand::RcptTo { address } => format!("RCPT TO:{}", address),
            SmtpCommand::Data => "DATA".to_string(),
            SmtpCommand::Rset => "RSET".to_string(),
            SmtpCommand::Quit => "QUIT".to_string(),
        }
    }
}

impl fmt::Display for SmtpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_smtp_string())
    }
}

/// SMTP response from the server.
#[derive(Debug, Clone)]
pub struct SmtpResponse {
    /// Status code (e.g., 250, 354, 550).
    pub code: u16,
    /// Enhanced status code (optional).
    pub enhanced_code: Option<EnhancedStatusCode>,
    /// Response message lines.
    pub message: Vec<String>,
    /// Whether this is a multiline response.
    pub is_multiline: bool,
}

impl SmtpResponse {
    /// Creates a new response.
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            enhanced_code: None,
            message: vec![message.into()],
            is_multiline: false,
        }
    }

    /// Parses a response from raw lines.
    pub fn parse(lines: &[String]) -> MailResult<Self> {
        if lines.is_empty() {
            return Err(MailError::protocol("Empty response"));
        }

        let mut messages = Vec::new();
        let mut code = 0u16;
        let mut enhanced_code = None;

        for (i, line) in lines.iter().enumerate() {
            if line.len() < 3 {
                return Err(MailError::protocol(format!("Response too short: {}", line)));
            }

            // get() keeps a reply starting mid-way through a multi-byte
            // character from panicking the slice
            let parsed_code: u16 = line
                .get(..3)
                .and_then(|prefix| prefix.parse().ok())
                .ok_or_else(|| MailError::protocol(format!("Invalid status code: {}", line)))?;

            if i == 0 {
                code = parsed_code;
            } else if parsed_code != code {
                return Err(MailError::protocol(
                    "Inconsistent status codes in multiline response",
                ));
            }

            let message = match line.get(4..) {
                Some(msg) if i == 0 => {
                    if let Some((esc, rest)) = Self::parse_enhanced_code(msg) {
                        enhanced_code = Some(esc);
                        rest.trim().to_string()
                    } else {
                        msg.to_string()
                    }
                }
                Some(msg) => msg.to_string(),
                None => String::new(),
            };

            messages.push(message);
        }

        Ok(Self {
            code,
            enhanced_code,
            message: messages,
            is_multiline: lines.len() > 1,
        })
    }

    /// Parses an enhanced status code from the message start.
    fn parse_enhanced_code(msg: &str) -> Option<(EnhancedStatusCode, &str)> {
        let parts: Vec<&str> = msg.splitn(2, ' ').collect();
        if parts.is_empty() {
            return None;
        }

        let code = EnhancedStatusCode::parse(parts[0])?;
        let rest = parts.get(1).copied().unwrap_or("");
        Some((code, rest))
    }

    /// Returns true if this is a success response (2xx).
    pub fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// Returns true if this is a positive intermediate response (3xx).
    pub fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// Returns true if this is a permanent failure (5xx).
    pub fn is_permanent_failure(&self) -> bool {
        self.code >= 500 && self.code < 600
    }

    /// Returns the first message line.
    pub fn first_message(&self) -> &str {
        self.message.first().map(|s| s.as_str()).unwrap_or("")
    }

    /// Returns all message lines joined.
    pub fn full_message(&self) -> String {
        self.message.join("\n")
    }

    /// Converts to an error if not successful.
    pub fn to_error(&self) -> MailError {
        let mut err = MailError::from_smtp_response(self.code, self.full_message());
        if let Some(enhanced) = &self.enhanced_code {
            err = err.with_enhanced_code(enhanced.clone());
        }
        err
    }
}

impl fmt::Display for SmtpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.first_message())
    }
}

/// ESMTP server capabilities.
#[derive(Debug, Clone, Default)]
pub struct EsmtpCapabilities {
    /// Maximum message size.
    pub size: Option<usize>,
    /// Advertised bearer authentication mechanisms.
    pub auth_mechanisms: HashSet<AuthMethod>,
    /// STARTTLS supported.
    pub starttls: bool,
    /// 8BITMIME supported.
    pub eight_bit_mime: bool,
    /// Raw capability strings.
    pub raw: Vec<String>,
}

impl EsmtpCapabilities {
    /// Parses capabilities from an EHLO response.
    pub fn from_ehlo_response(response: &SmtpResponse) -> Self {
        let mut caps = Self::default();

        for line in &response.message {
            let line = line.trim().to_uppercase();
            caps.raw.push(line.clone());

            let parts: Vec<&str> = line.splitn(2, ' ').collect();
            let capability = parts[0];
            let params = parts.get(1).copied().unwrap_or("");

            match capability {
                "SIZE" => {
                    caps.size = params.parse().ok();
                }
                "AUTH" => {
                    for mech in params.split_whitespace() {
                        if let Some(method) = AuthMethod::from_capability(mech) {
                            caps.auth_mechanisms.insert(method);
                        }
                    }
                }
                "STARTTLS" => {
                    caps.starttls = true;
                }
                "8BITMIME" => {
                    caps.eight_bit_mime = true;
                }
                _ => {}
            }
        }

        caps
    }

    /// Picks the bearer mechanism to use: XOAUTH2 unless the server
    /// advertises only OAUTHBEARER.
    pub fn bearer_mechanism(&self) -> Option<AuthMethod> {
        if self.auth_mechanisms.contains(&AuthMethod::XOAuth2) {
            Some(AuthMethod::XOAuth2)
        } else if self.auth_mechanisms.contains(&AuthMethod::OAuthBearer) {
            Some(AuthMethod::OAuthBearer)
        } else {
            None
        }
    }

    /// Checks if a specific capability is supported.
    pub fn has_capability(&self, name: &str) -> bool {
        let upper = name.to_uppercase();
        self.raw.iter().any(|c| c.starts_with(&upper))
    }
}

/// SMTP transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Initial state, before the server greeting.
    Initial,
    /// Connected, received server greeting.
    Connected,
    /// EHLO/HELO sent, ready for TLS or AUTH.
    Greeted,
    /// TLS established.
    TlsEstablished,
    /// Authenticated.
    Authenticated,
    /// In mail transaction (after MAIL FROM).
    InTransaction,
    /// Recipients added (after RCPT TO).
    RecipientsAdded,
    /// Transaction complete.
    Complete,
    /// Connection closed.
    Closed,
}

impl TransactionState {
    /// Returns true if authentication is allowed in this state.
    pub fn can_authenticate(&self) -> bool {
        matches!(
            self,
            TransactionState::Greeted | TransactionState::TlsEstablished
        )
    }

    /// Returns true if MAIL FROM is allowed in this state.
    pub fn can_start_mail(&self) -> bool {
        matches!(
            self,
            TransactionState::Authenticated | TransactionState::Complete
        )
    }

    /// Returns true if RCPT TO is allowed in this state.
    pub fn can_add_recipient(&self) -> bool {
        matches!(
            self,
            TransactionState::InTransaction | TransactionState::RecipientsAdded
        )
    }

    /// Returns true if DATA is allowed in this state.
    pub fn can_send_data(&self) -> bool {
        matches!(self, TransactionState::RecipientsAdded)
    }
}

/// Response codes for common SMTP operations.
pub mod codes {
    /// Service ready.
    pub const SERVICE_READY: u16 = 220;
    /// Service closing.
    pub const SERVICE_CLOSING: u16 = 221;
    /// Authentication successful.
    pub const AUTH_SUCCESS: u16 = 235;
    /// OK.
    pub const OK: u16 = 250;
    /// Continue (AUTH).
    pub const AUTH_CONTINUE: u16 = 334;
    /// Start mail input.
    pub const START_MAIL_INPUT: u16 = 354;
    /// Service unavailable.
    pub const SERVICE_UNAVAILABLE: u16 = 421;
    /// Syntax error.
    pub const SYNTAX_ERROR: u16 = 500;
    /// Command not implemented.
    pub const NOT_IMPLEMENTED: u16 = 502;
    /// Bad command sequence.
    pub const BAD_SEQUENCE: u16 = 503;
    /// Authentication required.
    pub const AUTH_REQUIRED: u16 = 530;
    /// Authentication failed.
    pub const AUTH_FAILED: u16 = 535;
    /// Mailbox unavailable (permanent).
    pub const MAILBOX_UNAVAILABLE: u16 = 550;
    /// Message too big.
    pub const MESSAGE_TOO_BIG: u16 = 552;
    /// Invalid mailbox name.
    pub const INVALID_MAILBOX: u16 = 553;
    /// Transaction failed.
    pub const TRANSACTION_FAILED: u16 = 554;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_formatting() {
        assert_eq!(
            SmtpCommand::Ehlo("localhost".to_string()).to_smtp_string(),
            "EHLO localhost"
        );
        assert_eq!(SmtpCommand::StartTls.to_smtp_string(), "STARTTLS");
        assert_eq!(
            SmtpCommand::MailFrom {
                address: "<test@example.com>".to_string(),
                size: Some(1024),
                body_8bit: true,
            }
            .to_smtp_string(),
            "MAIL FROM:<test@example.com> SIZE=1024 BODY=8BITMIME"
        );
        assert_eq!(
            SmtpCommand::Auth {
                mechanism: "XOAUTH2".to_string(),
                initial_response: Some("dXNlcg==".to_string()),
            }
            .to_smtp_string(),
            "AUTH XOAUTH2 dXNlcg=="
        );
    }

    #[test]
    fn test_response_parse() {
        let lines = vec!["250 OK".to_string()];
        let response = SmtpResponse::parse(&lines).unwrap();
        assert_eq!(response.code, 250);
        assert!(response.is_success());
        assert_eq!(response.first_message(), "OK");

        let lines = vec![
            "250-smtp.example.com Hello".to_string(),
            "250-SIZE 10485760".to_string(),
            "250 STARTTLS".to_string(),
        ];
        let response = SmtpResponse::parse(&lines).unwrap();
        assert_eq!(response.code, 250);
        assert!(response.is_multiline);
        assert_eq!(response.message.len(), 3);
    }

    #[test]
    fn test_response_parse_rejects_garbage_prefix() {
        let err = SmtpResponse::parse(&["abc hello".to_string()]).unwrap_err();
        assert_eq!(err.kind(), crate::errors::MailErrorKind::InvalidResponse);

        // Multi-byte characters straddling the code bytes must error, not panic
        let err = SmtpResponse::parse(&["éé0 not a reply".to_string()]).unwrap_err();
        assert_eq!(err.kind(), crate::errors::MailErrorKind::InvalidResponse);
    }

    #[test]
    fn test_response_with_enhanced_code() {
        let lines = vec!["550 5.1.1 User unknown".to_string()];
        let response = SmtpResponse::parse(&lines).unwrap();
        assert_eq!(response.code, 550);
        let esc = response.enhanced_code.unwrap();
        assert_eq!((esc.class, esc.subject, esc.detail), (5, 1, 1));
    }

    #[test]
    fn test_capabilities_parse() {
        let response = SmtpResponse {
            code: 250,
            enhanced_code: None,
            message: vec![
                "smtp.example.com".to_string(),
                "SIZE 10485760".to_string(),
                "AUTH XOAUTH2 OAUTHBEARER PLAIN".to_string(),
                "STARTTLS".to_string(),
                "8BITMIME".to_string(),
            ],
            is_multiline: true,
        };

        let caps = EsmtpCapabilities::from_ehlo_response(&response);
        assert_eq!(caps.size, Some(10485760));
        assert!(caps.auth_mechanisms.contains(&AuthMethod::XOAuth2));
        assert!(caps.auth_mechanisms.contains(&AuthMethod::OAuthBearer));
        assert!(caps.starttls);
        assert!(caps.eight_bit_mime);
        assert_eq!(caps.bearer_mechanism(), Some(AuthMethod::XOAuth2));
    }

    #[test]
    fn test_bearer_mechanism_fallback() {
        let response = SmtpResponse {
            code: 250,
            enhanced_code: None,
            message: vec!["AUTH OAUTHBEARER".to_string()],
            is_multiline: false,
        };
        let caps = EsmtpCapabilities::from_ehlo_response(&response);
        assert_eq!(caps.bearer_mechanism(), Some(AuthMethod::OAuthBearer));

        let caps = EsmtpCapabilities::default();
        assert_eq!(caps.bearer_mechanism(), None);
    }

    #[test]
    fn test_transaction_state() {
        assert!(TransactionState::Greeted.can_authenticate());
        assert!(!TransactionState::InTransaction.can_authenticate());
        assert!(TransactionState::Authenticated.can_start_mail());
        assert!(TransactionState::InTransaction.can_add_recipient());
        assert!(TransactionState::RecipientsAdded.can_send_data());
    }
}
