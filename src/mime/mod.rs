//! Message composition and MIME serialization.
//!
//! Composition (`compose`) turns an [`EmailData`] value into a structured
//! [`WireMessage`] without any I/O or randomness, so two compositions of the
//! same input are structurally equal. Serialization (`MimeWriter`) turns a
//! `WireMessage` into RFC 5322 bytes and is where message IDs, MIME
//! boundaries and the Date header get generated.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::{MailError, MailErrorKind, MailResult};
use crate::types::{Address, EmailData, Priority};

/// Priority as it appears on the wire (RFC 2156 Priority header).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WirePriority {
    /// Low priority.
    NonUrgent,
    /// Default priority.
    Normal,
    /// High priority.
    Urgent,
}

impl WirePriority {
    /// Returns the Priority header value.
    pub fn header_value(&self) -> &'static str {
        match self {
            WirePriority::NonUrgent => "non-urgent",
            WirePriority::Normal => "normal",
            WirePriority::Urgent => "urgent",
        }
    }
}

impl From<Priority> for WirePriority {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::Low => WirePriority::NonUrgent,
            Priority::Normal => WirePriority::Normal,
            Priority::High => WirePriority::Urgent,
        }
    }
}

/// Body structure of a composed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Plain-text body.
    Plain(String),
    /// HTML body.
    Html(String),
    /// multipart/alternative with a text part and an HTML part.
    Alternative {
        /// Plain-text part.
        text: String,
        /// HTML part.
        html: String,
    },
}

/// Attachment with its declared content type parsed and validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedAttachment {
    /// Filename.
    pub filename: String,
    /// Parsed MIME content type, re-rendered canonically.
    pub content_type: String,
    /// Binary content.
    pub data: Vec<u8>,
    /// Content ID for inline references.
    pub content_id: Option<String>,
}

/// Structured wire message produced by [`compose`].
///
/// Carries no message ID, boundaries or date; those are generated when the
/// message is serialized, so equal inputs compose to equal values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    /// Named headers in output order (Subject, Encoding, then custom headers).
    pub headers: Vec<(String, String)>,
    /// Sender.
    pub from: Address,
    /// Primary recipients.
    pub to: Vec<Address>,
    /// CC recipients.
    pub cc: Vec<Address>,
    /// BCC recipients (envelope only, never serialized as a header).
    pub bcc: Vec<Address>,
    /// Reply-to addresses.
    pub reply_to: Vec<Address>,
    /// Wire priority.
    pub priority: WirePriority,
    /// Body structure.
    pub body: MessageBody,
    /// Attachments in input order.
    pub attachments: Vec<ComposedAttachment>,
}

impl WireMessage {
    /// Sets a header, replacing any existing header with the same name
    /// (case-insensitive). The message never carries two headers with
    /// the same name through this path.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(existing) = self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            existing.1 = value;
        } else {
            self.headers.push((name, value));
        }
    }

    /// Appends a header without replacing existing ones.
    pub fn append_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Returns the first header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the subject header value.
    pub fn subject(&self) -> Option<&str> {
        self.header("Subject")
    }

    /// Returns all envelope recipients (to + cc + bcc) in order.
    pub fn envelope_recipients(&self) -> impl Iterator<Item = &Address> {
        self.to.iter().chain(self.cc.iter()).chain(self.bcc.iter())
    }
}

/// Validates a header name for use in a composed message.
fn validate_header_name(name: &str) -> MailResult<()> {
    if name.is_empty() || name.chars().any(|c| c.is_control() || c == ':' || c == ' ') {
        return Err(MailError::composition(
            MailErrorKind::InvalidHeader,
            format!("Invalid header name: {:?}", name),
        ));
    }
    Ok(())
}

/// Composes an email into a structured wire message. Pure: no I/O, no
/// randomness, no clock reads.
///
/// The subject is set exactly once even when the input also carries a
/// Subject custom header; the custom value wins but never duplicates the
/// header. An `Encoding: UTF-8` declaration follows the subject, and the
/// remaining custom headers are appended after both, without replacing
/// anything already there. The body
/// becomes multipart/alternative when a non-empty plaintext alternative is
/// present (the main body is then treated as HTML regardless of `is_html`),
/// plain text when `is_html` is false, and HTML otherwise.
pub fn compose(data: &EmailData) -> MailResult<WireMessage> {
    let body = match &data.plaintext_alternative_body {
        Some(text) if !text.is_empty() => MessageBody::Alternative {
            text: text.clone(),
            html: data.body.clone(),
        },
        _ => {
            if data.is_html {
                MessageBody::Html(data.body.clone())
            } else {
                MessageBody::Plain(data.body.clone())
            }
        }
    };

    let mut attachments = Vec::with_capacity(data.attachments.len());
    for attachment in &data.attachments {
        let parsed = mime::Mime::from_str(&attachment.content_type).map_err(|_| {
            MailError::composition(
                MailErrorKind::AttachmentError,
                format!(
                    "Invalid content type {:?} for attachment {:?}",
                    attachment.content_type, attachment.filename
                ),
            )
        })?;
        attachments.push(ComposedAttachment {
            filename: attachment.filename.clone(),
            content_type: parsed.to_string(),
            data: attachment.data.clone(),
            content_id: attachment.content_id.clone(),
        });
    }

    let mut message = WireMessage {
        headers: Vec::new(),
        from: data.from.clone(),
        to: data.to.clone(),
        cc: data.cc.clone(),
        bcc: data.bcc.clone(),
        reply_to: data.reply_to.clone(),
        priority: data.priority.into(),
        body,
        attachments,
    };

    message.set_header("Subject", &data.subject);
    message.set_header("Encoding", "UTF-8");

    for (name, value) in &data.headers {
        validate_header_name(name)?;
        if value.chars().any(|c| c == '\r' || c == '\n') {
            return Err(MailError::composition(
                MailErrorKind::InvalidHeader,
                format!("Header {:?} contains line breaks", name),
            ));
        }
        // Subject given as a custom header overwrites rather than duplicates;
        // every other custom header is appended after the declarations above.
        if name.eq_ignore_ascii_case("Subject") {
            message.set_header(name.clone(), value.clone());
        } else {
            message.append_header(name.clone(), value.clone());
        }
    }

    Ok(message)
}

/// MIME content types used during serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentType {
    /// Plain text.
    TextPlain,
    /// HTML content.
    TextHtml,
    /// Multipart alternative (text + HTML).
    MultipartAlternative(String),
    /// Multipart mixed (body + attachments).
    MultipartMixed(String),
}

impl ContentType {
    /// Returns the MIME type string.
    pub fn mime_type(&self) -> String {
        match self {
            ContentType::TextPlain => "text/plain; charset=utf-8".to_string(),
            ContentType::TextHtml => "text/html; charset=utf-8".to_string(),
            ContentType::MultipartAlternative(boundary) => {
                format!("multipart/alternative; boundary=\"{}\"", boundary)
            }
            ContentType::MultipartMixed(boundary) => {
                format!("multipart/mixed; boundary=\"{}\"", boundary)
            }
        }
    }
}

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferEncoding {
    /// Quoted-printable encoding.
    #[default]
    QuotedPrintable,
    /// Base64 encoding.
    Base64,
}

impl TransferEncoding {
    /// Returns the header value.
    pub fn header_value(&self) -> &'static str {
        match self {
            TransferEncoding::QuotedPrintable => "quoted-printable",
            TransferEncoding::Base64 => "base64",
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header_value())
    }
}

/// Serializer turning a [`WireMessage`] into RFC 5322 bytes.
pub struct MimeWriter {
    /// Date for the message.
    date: DateTime<Utc>,
    /// Domain for message IDs.
    domain: String,
}

impl MimeWriter {
    /// Creates a new writer stamping messages with the current time.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            date: Utc::now(),
            domain: domain.into(),
        }
    }

    /// Serializes a wire message to RFC 5322 format.
    pub fn encode(&self, message: &WireMessage) -> MailResult<Vec<u8>> {
        let mut output = Vec::new();

        self.write_header(&mut output, "Date", &self.format_date())?;
        self.write_header(&mut output, "From", &message.from.to_header())?;

        if !message.to.is_empty() {
            let list: Vec<String> = message.to.iter().map(|a| a.to_header()).collect();
            self.write_header(&mut output, "To", &list.join(", "))?;
        }

        if !message.cc.is_empty() {
            let list: Vec<String> = message.cc.iter().map(|a| a.to_header()).collect();
            self.write_header(&mut output, "Cc", &list.join(", "))?;
        }

        // BCC is never serialized as a header

        if !message.reply_to.is_empty() {
            let list: Vec<String> = message.reply_to.iter().map(|a| a.to_header()).collect();
            self.write_header(&mut output, "Reply-To", &list.join(", "))?;
        }

        for (name, value) in &message.headers {
            self.write_header(&mut output, name, &self.encode_header(value))?;
        }

        self.write_header(
            &mut output,
            "Message-ID",
            &format!("<{}>", self.generate_message_id()),
        )?;

        if message.priority != WirePriority::Normal {
            self.write_header(&mut output, "Priority", message.priority.header_value())?;
        }

        self.write_header(&mut output, "MIME-Version", "1.0")?;

        if message.attachments.is_empty() {
            self.write_body(&mut output, &message.body)?;
        } else {
            let mixed_boundary = self.generate_boundary();
            self.write_header(
                &mut output,
                "Content-Type",
                &ContentType::MultipartMixed(mixed_boundary.clone()).mime_type(),
            )?;
            output.extend_from_slice(b"\r\n");

            output.extend_from_slice(format!("--{}\r\n", mixed_boundary).as_bytes());
            self.write_body(&mut output, &message.body)?;
            output.extend_from_slice(b"\r\n");

            for attachment in &message.attachments {
                output.extend_from_slice(format!("--{}\r\n", mixed_boundary).as_bytes());
                self.write_attachment(&mut output, attachment)?;
            }

            output.extend_from_slice(format!("--{}--\r\n", mixed_boundary).as_bytes());
        }

        Ok(output)
    }

    /// Writes the body structure (single part or multipart/alternative).
    fn write_body(&self, output: &mut Vec<u8>, body: &MessageBody) -> MailResult<()> {
        match body {
            MessageBody::Plain(text) => {
                self.write_text_part(output, ContentType::TextPlain, text)?;
            }
            MessageBody::Html(html) => {
                self.write_text_part(output, ContentType::TextHtml, html)?;
            }
            MessageBody::Alternative { text, html } => {
                let boundary = self.generate_boundary();
                self.write_header(
                    output,
                    "Content-Type",
                    &ContentType::MultipartAlternative(boundary.clone()).mime_type(),
                )?;
                output.extend_from_slice(b"\r\n");

                output.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
                self.write_text_part(output, ContentType::TextPlain, text)?;
                output.extend_from_slice(b"\r\n");

                output.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
                self.write_text_part(output, ContentType::TextHtml, html)?;
                output.extend_from_slice(b"\r\n");

                output.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
            }
        }
        Ok(())
    }

    /// Writes a single text part with quoted-printable encoding.
    fn write_text_part(
        &self,
        output: &mut Vec<u8>,
        content_type: ContentType,
        text: &str,
    ) -> MailResult<()> {
        self.write_header(output, "Content-Type", &content_type.mime_type())?;
        self.write_header(
            output,
            "Content-Transfer-Encoding",
            TransferEncoding::QuotedPrintable.header_value(),
        )?;
        output.extend_from_slice(b"\r\n");
        output.extend_from_slice(&quoted_printable::encode(text.as_bytes()));
        Ok(())
    }

    /// Writes an attachment part with base64 encoding.
    fn write_attachment(
        &self,
        output: &mut Vec<u8>,
        attachment: &ComposedAttachment,
    ) -> MailResult<()> {
        self.write_header(
            output,
            "Content-Type",
            &format!("{}; name=\"{}\"", attachment.content_type, attachment.filename),
        )?;
        self.write_header(
            output,
            "Content-Transfer-Encoding",
            TransferEncoding::Base64.header_value(),
        )?;
        if let Some(content_id) = &attachment.content_id {
            self.write_header(output, "Content-ID", &format!("<{}>", content_id))?;
            self.write_header(
                output,
                "Content-Disposition",
                &format!("inline; filename=\"{}\"", attachment.filename),
            )?;
        } else {
            self.write_header(
                output,
                "Content-Disposition",
                &format!("attachment; filename=\"{}\"", attachment.filename),
            )?;
        }
        output.extend_from_slice(b"\r\n");

        let encoded = BASE64.encode(&attachment.data);
        for chunk in encoded.as_bytes().chunks(76) {
            output.extend_from_slice(chunk);
            output.extend_from_slice(b"\r\n");
        }

        Ok(())
    }

    /// Writes a header line with folding.
    fn write_header(&self, output: &mut Vec<u8>, name: &str, value: &str) -> MailResult<()> {
        if name.chars().any(|c| c.is_control() || c == ':') {
            return Err(MailError::composition(
                MailErrorKind::InvalidHeader,
                format!("Invalid header name: {}", name),
            ));
        }

        let header = format!("{}: {}", name, value);
        let folded = self.fold_header(&header);
        output.extend_from_slice(folded.as_bytes());
        output.extend_from_slice(b"\r\n");
        Ok(())
    }

    /// Folds a header line at 78 characters.
    fn fold_header(&self, header: &str) -> String {
        if header.len() <= 78 {
            return header.to_string();
        }

        let mut result = String::new();
        let mut current_line = String::new();

        for word in header.split(' ') {
            if current_line.is_empty() {
                current_line = word.to_string();
            } else if current_line.len() + 1 + word.len() <= 76 {
                current_line.push(' ');
                current_line.push_str(word);
            } else {
                result.push_str(&current_line);
                result.push_str("\r\n ");
                current_line = word.to_string();
            }
        }

        result.push_str(&current_line);
        result
    }

    /// Encodes a header value using RFC 2047 when it is not plain ASCII.
    fn encode_header(&self, value: &str) -> String {
        if value.chars().all(|c| c.is_ascii() && !c.is_control()) {
            return value.to_string();
        }

        let encoded = BASE64.encode(value.as_bytes());
        format!("=?UTF-8?B?{}?=", encoded)
    }

    /// Generates a unique message ID.
    fn generate_message_id(&self) -> String {
        let uuid = Uuid::new_v4();
        format!("{}.{}@{}", uuid, self.date.timestamp(), self.domain)
    }

    /// Generates a unique boundary.
    fn generate_boundary(&self) -> String {
        format!("----=_Part_{}", Uuid::new_v4().simple())
    }

    /// Formats the date for the Date header.
    fn format_date(&self) -> String {
        self.date.format("%a, %d %b %Y %H:%M:%S %z").to_string()
    }

    /// Prepares DATA content with dot-stuffing and the terminating sequence.
    pub fn prepare_data_content(encoded: &[u8]) -> Vec<u8> {
        let mut output = Vec::with_capacity(encoded.len() + 100);
        let mut at_line_start = true;

        for &byte in encoded {
            if at_line_start && byte == b'.' {
                output.push(b'.');
            }
            output.push(byte);
            at_line_start = byte == b'\n';
        }

        if !output.ends_with(b"\r\n") {
            if output.ends_with(b"\n") {
                output.pop();
                output.extend_from_slice(b"\r\n");
            } else {
                output.extend_from_slice(b"\r\n");
            }
        }

        output.extend_from_slice(b".\r\n");
        output
    }
}

impl Default for MimeWriter {
    fn default() -> Self {
        Self::new("localhost")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EmailData;

    fn basic_email() -> EmailData {
        EmailData::builder()
            .from("sender@example.com")
            .unwrap()
            .to("recipient@example.com")
            .unwrap()
            .subject("Test Subject")
            .text("Hello World!")
            .build()
            .unwrap()
    }

    #[test]
    fn test_compose_is_deterministic() {
        let email = basic_email();
        let first = compose(&email).unwrap();
        let second = compose(&email).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_compose_plain_body() {
        let message = compose(&basic_email()).unwrap();
        assert_eq!(message.body, MessageBody::Plain("Hello World!".to_string()));
        assert_eq!(message.subject(), Some("Test Subject"));
        assert_eq!(message.header("Encoding"), Some("UTF-8"));
        assert_eq!(message.priority, WirePriority::Normal);
    }

    #[test]
    fn test_compose_alternative_body() {
        let email = EmailData::builder()
            .from("sender@example.com")
            .unwrap()
            .to("recipient@example.com")
            .unwrap()
            .html("<b>Hi</b>")
            .plaintext_alternative("Hi")
            .build()
            .unwrap();

        let message = compose(&email).unwrap();
        assert_eq!(
            message.body,
            MessageBody::Alternative {
                text: "Hi".to_string(),
                html: "<b>Hi</b>".to_string(),
            }
        );
    }

    #[test]
    fn test_alternative_wins_over_is_html_flag() {
        // A non-empty alternative forces the multipart shape with the body as HTML.
        let email = EmailData::builder()
            .from("sender@example.com")
            .unwrap()
            .text("body as text")
            .plaintext_alternative("plain version")
            .build()
            .unwrap();

        let message = compose(&email).unwrap();
        assert_eq!(
            message.body,
            MessageBody::Alternative {
                text: "plain version".to_string(),
                html: "body as text".to_string(),
            }
        );
    }

    #[test]
    fn test_subject_never_duplicated() {
        let email = EmailData::builder()
            .from("sender@example.com")
            .unwrap()
            .subject("Original")
            .header("Subject", "Overwritten")
            .text("body")
            .build()
            .unwrap();

        let message = compose(&email).unwrap();
        let subject_count = message
            .headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("Subject"))
            .count();
        assert_eq!(subject_count, 1);
        assert_eq!(message.subject(), Some("Overwritten"));
    }

    #[test]
    fn test_custom_encoding_header_appends_after_declaration() {
        let email = EmailData::builder()
            .from("sender@example.com")
            .unwrap()
            .header("Encoding", "ISO-8859-1")
            .text("body")
            .build()
            .unwrap();

        let message = compose(&email).unwrap();
        let encodings: Vec<&str> = message
            .headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("Encoding"))
            .map(|(_, v)| v.as_str())
            .collect();
        // The UTF-8 declaration stays; the custom header lands after it.
        assert_eq!(encodings, vec!["UTF-8", "ISO-8859-1"]);
    }

    #[test]
    fn test_compose_priority_mapping() {
        for (input, expected) in [
            (Priority::Low, WirePriority::NonUrgent),
            (Priority::Normal, WirePriority::Normal),
            (Priority::High, WirePriority::Urgent),
        ] {
            let email = EmailData::builder()
                .from("sender@example.com")
                .unwrap()
                .priority(input)
                .text("body")
                .build()
                .unwrap();
            assert_eq!(compose(&email).unwrap().priority, expected);
        }
    }

    #[test]
    fn test_compose_rejects_bad_attachment_content_type() {
        let email = EmailData::builder()
            .from("sender@example.com")
            .unwrap()
            .attachment(crate::types::Attachment::new(
                "file.bin",
                "not a valid mime type!!",
                vec![1, 2, 3],
            ))
            .text("body")
            .build()
            .unwrap();

        let err = compose(&email).unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::AttachmentError);
    }

    #[test]
    fn test_compose_rejects_bad_header() {
        let email = EmailData::builder()
            .from("sender@example.com")
            .unwrap()
            .header("Bad:Name", "value")
            .text("body")
            .build()
            .unwrap();
        assert_eq!(
            compose(&email).unwrap_err().kind(),
            MailErrorKind::InvalidHeader
        );

        let email = EmailData::builder()
            .from("sender@example.com")
            .unwrap()
            .header("X-Ok", "line1\r\nline2")
            .text("body")
            .build()
            .unwrap();
        assert_eq!(
            compose(&email).unwrap_err().kind(),
            MailErrorKind::InvalidHeader
        );
    }

    #[test]
    fn test_encode_plain_message() {
        let message = compose(&basic_email()).unwrap();
        let writer = MimeWriter::new("example.com");
        let encoded = writer.encode(&message).unwrap();
        let content = String::from_utf8_lossy(&encoded);

        assert!(content.contains("From: sender@example.com"));
        assert!(content.contains("To: recipient@example.com"));
        assert!(content.contains("Subject: Test Subject"));
        assert!(content.contains("Encoding: UTF-8"));
        assert!(content.contains("MIME-Version: 1.0"));
        assert!(content.contains("Content-Type: text/plain; charset=utf-8"));
        // Normal priority is omitted from headers
        assert!(!content.contains("\r\nPriority:"));
    }

    #[test]
    fn test_encode_urgent_priority_header() {
        let email = EmailData::builder()
            .from("sender@example.com")
            .unwrap()
            .priority(Priority::High)
            .text("body")
            .build()
            .unwrap();
        let message = compose(&email).unwrap();
        let encoded = MimeWriter::new("example.com").encode(&message).unwrap();
        let content = String::from_utf8_lossy(&encoded);
        assert!(content.contains("Priority: urgent"));
    }

    #[test]
    fn test_encode_bcc_excluded_from_headers() {
        let email = EmailData::builder()
            .from("sender@example.com")
            .unwrap()
            .to("to@example.com")
            .unwrap()
            .bcc("hidden@example.com")
            .unwrap()
            .text("body")
            .build()
            .unwrap();
        let message = compose(&email).unwrap();
        let encoded = MimeWriter::new("example.com").encode(&message).unwrap();
        let content = String::from_utf8_lossy(&encoded);
        assert!(!content.contains("hidden@example.com"));
        // Still in the envelope
        assert_eq!(message.envelope_recipients().count(), 2);
    }

    #[test]
    fn test_encode_attachment_structure() {
        let email = EmailData::builder()
            .from("sender@example.com")
            .unwrap()
            .to("to@example.com")
            .unwrap()
            .text("see attached")
            .attachment(crate::types::Attachment::new(
                "report.pdf",
                "application/pdf",
                vec![0x25, 0x50, 0x44, 0x46],
            ))
            .build()
            .unwrap();
        let message = compose(&email).unwrap();
        let encoded = MimeWriter::new("example.com").encode(&message).unwrap();
        let content = String::from_utf8_lossy(&encoded);

        assert!(content.contains("multipart/mixed"));
        assert!(content.contains("Content-Type: application/pdf; name=\"report.pdf\""));
        assert!(content.contains("Content-Transfer-Encoding: base64"));
        assert!(content.contains("Content-Disposition: attachment; filename=\"report.pdf\""));
    }

    #[test]
    fn test_encode_inline_attachment_content_id() {
        let email = EmailData::builder()
            .from("sender@example.com")
            .unwrap()
            .html("<img src=\"cid:logo\">")
            .attachment(
                crate::types::Attachment::new("logo.png", "image/png", vec![1, 2]).with_content_id("logo"),
            )
            .build()
            .unwrap();
        let message = compose(&email).unwrap();
        let encoded = MimeWriter::new("example.com").encode(&message).unwrap();
        let content = String::from_utf8_lossy(&encoded);
        assert!(content.contains("Content-ID: <logo>"));
        assert!(content.contains("Content-Disposition: inline; filename=\"logo.png\""));
    }

    #[test]
    fn test_header_encoding() {
        let writer = MimeWriter::new("example.com");
        assert_eq!(writer.encode_header("Hello"), "Hello");
        assert!(writer.encode_header("Héllo").starts_with("=?UTF-8?B?"));
    }

    #[test]
    fn test_dot_stuffing() {
        let input = b"Hello\r\n.World\r\n..Test\r\n";
        let output = MimeWriter::prepare_data_content(input);
        let output_str = String::from_utf8_lossy(&output);
        assert!(output_str.contains("\r\n..World"));
        assert!(output_str.contains("\r\n...Test"));
        assert!(output_str.ends_with("\r\n.\r\n"));
    }

    #[test]
    fn test_boundary_and_message_id_generation() {
        let writer = MimeWriter::new("example.com");
        assert_ne!(writer.generate_boundary(), writer.generate_boundary());
        assert!(writer.generate_message_id().ends_with("@example.com"));
    }
}
