//! Notifier - mails the composed images to a client
//!
//! Delivery failures are returned to the caller and never touch the
//! generated files.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::artifact::file_name_of;
use crate::compositor::mime_for;
use crate::config::MailSettings;
use crate::records::ClientRecord;

const DEFAULT_BODY: &str = "Dear {{client_name}},\n\n\
We are pleased to share your customized product designs featuring the \
{{client_company_name}} logo. Please find the attached images.\n\n\
Best regards,\n";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Email build error: {0}")]
    Build(String),

    #[error("Failed to read attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    pub file_name: String,
    pub path: PathBuf,
}

/// A fully rendered message, ready for a [`Mailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from_name: String,
    pub from_address: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<MailAttachment>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError>;
}

/// Subject and body with `{{client_name}}` / `{{client_company_name}}`
/// placeholders.
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    pub subject: String,
    pub body: String,
}

impl MessageTemplate {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Built-in body, signed with the sender's display name.
    pub fn standard(subject: impl Into<String>, from_name: &str) -> Self {
        Self::new(subject, format!("{DEFAULT_BODY}{from_name}"))
    }

    pub fn render(&self, client: &ClientRecord) -> (String, String) {
        (
            substitute(&self.subject, client),
            substitute(&self.body, client),
        )
    }
}

fn substitute(text: &str, client: &ClientRecord) -> String {
    text.replace("{{client_name}}", client.salutation())
        .replace("{{client_company_name}}", &client.name)
}

pub struct Notifier {
    mailer: Box<dyn Mailer>,
    from_name: String,
    from_address: String,
    template: MessageTemplate,
}

impl Notifier {
    pub fn new(
        mailer: Box<dyn Mailer>,
        from_name: impl Into<String>,
        from_address: impl Into<String>,
        template: MessageTemplate,
    ) -> Self {
        Self {
            mailer,
            from_name: from_name.into(),
            from_address: from_address.into(),
            template,
        }
    }

    /// Send `attachments` to `to` on behalf of `client`.
    pub async fn notify(
        &self,
        client: &ClientRecord,
        to: &str,
        attachments: &[PathBuf],
    ) -> Result<(), DeliveryError> {
        let (subject, body) = self.template.render(client);
        let mail = OutgoingMail {
            from_name: self.from_name.clone(),
            from_address: self.from_address.clone(),
            to: to.to_string(),
            subject,
            body,
            attachments: attachments
                .iter()
                .map(|path| MailAttachment {
                    file_name: file_name_of(path),
                    path: path.clone(),
                })
                .collect(),
        };

        self.mailer.send(&mail).await?;
        tracing::info!(client = %client.name, to, attachments = attachments.len(), "Email sent");
        Ok(())
    }
}

/// SMTP delivery over STARTTLS with credentials.
pub struct SmtpMailer {
    transport: lettre::AsyncSmtpTransport<lettre::Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(settings: &MailSettings) -> Result<Self, DeliveryError> {
        use lettre::transport::smtp::authentication::Credentials;

        let transport =
            lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>::starttls_relay(&settings.smtp_host)?
                .port(settings.smtp_port)
                .timeout(Some(settings.timeout))
                .credentials(Credentials::new(
                    settings.user.clone(),
                    settings.password.clone(),
                ))
                .build();

        Ok(Self { transport })
    }

    async fn build_message(mail: &OutgoingMail) -> Result<lettre::Message, DeliveryError> {
        use lettre::message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart};

        let from = Mailbox::new(Some(mail.from_name.clone()), mail.from_address.parse()?);
        let to = Mailbox::new(None, mail.to.parse()?);

        let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(mail.body.clone()));
        for attachment in &mail.attachments {
            let bytes = tokio::fs::read(&attachment.path)
                .await
                .map_err(|source| DeliveryError::Attachment {
                    path: attachment.path.clone(),
                    source,
                })?;
            let content_type = ContentType::parse(mime_for(&attachment.path))
                .map_err(|e| DeliveryError::Build(e.to_string()))?;
            parts = parts.singlepart(Attachment::new(attachment.file_name.clone()).body(bytes, content_type));
        }

        lettre::Message::builder()
            .from(from)
            .to(to)
            .subject(mail.subject.clone())
            .multipart(parts)
            .map_err(|e| DeliveryError::Build(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError> {
        use lettre::AsyncTransport;

        let message = Self::build_message(mail).await?;
        self.transport.send(message).await?;
        Ok(())
    }
}

/// Attachment order: generated images first, then pass-through images.
pub fn attachment_list(generated: &[PathBuf], passthrough: &[PathBuf]) -> Vec<PathBuf> {
    generated.iter().chain(passthrough).cloned().collect()
}
