//! Send orchestration.
//!
//! [`MailerService`] turns high-level requests ("send this body to this
//! address", "render this template first") into composed emails, hands
//! them to a [`MailSender`] and reports a one-line outcome through an
//! injected [`OutcomeReporter`]. Reporting is a side effect; the returned
//! response is the source of truth.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::errors::{MailError, MailErrorKind, MailResult};
use crate::session::MailSender;
use crate::types::{Address, EmailData, SendResponse};

/// Minimal description of one outgoing email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMetadata {
    /// Recipient address.
    pub to_address: String,
    /// Subject line.
    pub subject: String,
    /// Body, used directly by plain sends and ignored by template sends.
    pub body: String,
}

impl EmailMetadata {
    /// Creates new metadata.
    pub fn new(
        to_address: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            to_address: to_address.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Renders templates against a serialized model.
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    /// Renders an in-memory template.
    async fn render(&self, template: &str, model: &serde_json::Value) -> MailResult<String>;

    /// Renders a template loaded from a file.
    async fn render_file(&self, path: &Path, model: &serde_json::Value) -> MailResult<String>;
}

/// Receives the one-line outcome of each send.
pub trait OutcomeReporter: Send + Sync {
    /// Reports the outcome of a completed send attempt.
    fn report(&self, response: &SendResponse);
}

/// Reporter logging through tracing.
#[derive(Debug, Default, Clone)]
pub struct TracingReporter;

impl OutcomeReporter for TracingReporter {
    fn report(&self, response: &SendResponse) {
        if response.is_successful() {
            tracing::info!("Email sent successfully!");
        } else {
            tracing::error!("Failed to send email: {}", response.joined_errors());
        }
    }
}

/// Orchestrator surface for sending email.
#[async_trait]
pub trait EmailService: Send + Sync {
    /// Sends an email with the metadata's body.
    async fn send(
        &self,
        metadata: &EmailMetadata,
        cancellation: Option<&CancellationToken>,
    ) -> MailResult<SendResponse>;

    /// Renders an in-memory template and sends the result as HTML.
    async fn send_using_template(
        &self,
        metadata: &EmailMetadata,
        template: &str,
        model: &serde_json::Value,
        cancellation: Option<&CancellationToken>,
    ) -> MailResult<SendResponse>;

    /// Renders a template file and sends the result as HTML.
    async fn send_using_template_from_file(
        &self,
        metadata: &EmailMetadata,
        template_path: &Path,
        model: &serde_json::Value,
        cancellation: Option<&CancellationToken>,
    ) -> MailResult<SendResponse>;
}

/// Default orchestrator wiring a sender, a renderer and a reporter.
pub struct MailerService<S: MailSender> {
    sender: S,
    from: Address,
    renderer: Arc<dyn TemplateRenderer>,
    reporter: Arc<dyn OutcomeReporter>,
}

impl<S: MailSender> MailerService<S> {
    /// Creates a service sending from the given address.
    pub fn new(
        sender: S,
        from: Address,
        renderer: Arc<dyn TemplateRenderer>,
        reporter: Arc<dyn OutcomeReporter>,
    ) -> Self {
        Self {
            sender,
            from,
            renderer,
            reporter,
        }
    }

    /// Serializes a typed model for the renderer.
    pub fn to_model<T: Serialize>(model: &T) -> MailResult<serde_json::Value> {
        serde_json::to_value(model).map_err(|e| {
            MailError::new(
                MailErrorKind::EncodingFailed,
                format!("Cannot serialize template model: {}", e),
            )
            .with_cause(e)
        })
    }

    fn build_email(&self, metadata: &EmailMetadata, body: String, is_html: bool) -> MailResult<EmailData> {
        let builder = EmailData::builder()
            .from_address(self.from.clone())
            .to(metadata.to_address.as_str())?
            .subject(&metadata.subject);
        let builder = if is_html {
            builder.html(body)
        } else {
            builder.text(body)
        };
        builder.build()
    }

    async fn dispatch(
        &self,
        email: &EmailData,
        cancellation: Option<&CancellationToken>,
    ) -> MailResult<SendResponse> {
        let response = self.sender.send(email, cancellation).await?;
        self.reporter.report(&response);
        Ok(response)
    }
}

#[async_trait]
impl<S: MailSender> EmailService for MailerService<S> {
    async fn send(
        &self,
        metadata: &EmailMetadata,
        cancellation: Option<&CancellationToken>,
    ) -> MailResult<SendResponse> {
        let email = self.build_email(metadata, metadata.body.clone(), false)?;
        self.dispatch(&email, cancellation).await
    }

    async fn send_using_template(
        &self,
        metadata: &EmailMetadata,
        template: &str,
        model: &serde_json::Value,
        cancellation: Option<&CancellationToken>,
    ) -> MailResult<SendResponse> {
        let body = self.renderer.render(template, model).await?;
        let email = self.build_email(metadata, body, true)?;
        self.dispatch(&email, cancellation).await
    }

    async fn send_using_template_from_file(
        &self,
        metadata: &EmailMetadata,
        template_path: &Path,
        model: &serde_json::Value,
        cancellation: Option<&CancellationToken>,
    ) -> MailResult<SendResponse> {
        let body = self.renderer.render_file(template_path, model).await?;
        let email = self.build_email(metadata, body, true)?;
        self.dispatch(&email, cancellation).await
    }
}
