// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Templated email over SMTP or a pickup directory.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Datelike;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::Serialize;
use serde_json::Value;
use tera::{Context, Tera};
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("email configuration error: {0}")]
    Configuration(String),

    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    #[error("email model must serialize to an object: {0}")]
    Model(String),

    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("failed to send email: {0}")]
    Transport(String),
}

/// Embedded email templates. Each has an HTML and a plain-text part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailTemplate {
    SubscriptionConfirmation,
    UnsubscribeConfirmation,
}

impl EmailTemplate {
    pub const ALL: [EmailTemplate; 2] = [
        EmailTemplate::SubscriptionConfirmation,
        EmailTemplate::UnsubscribeConfirmation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EmailTemplate::SubscriptionConfirmation => "subscription_confirmation",
            EmailTemplate::UnsubscribeConfirmation => "unsubscribe_confirmation",
        }
    }

    fn sources(self) -> (&'static str, &'static str) {
        match self {
            EmailTemplate::SubscriptionConfirmation => (
                include_str!("../../templates/email/subscription_confirmation.html"),
                include_str!("../../templates/email/subscription_confirmation.txt"),
            ),
            EmailTemplate::UnsubscribeConfirmation => (
                include_str!("../../templates/email/unsubscribe_confirmation.html"),
                include_str!("../../templates/email/unsubscribe_confirmation.txt"),
            ),
        }
    }

    fn html_name(self) -> String {
        format!("{}.html", self.name())
    }

    fn text_name(self) -> String {
        format!("{}.txt", self.name())
    }
}

/// A message to render and send.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    /// Template model; always a JSON object
    pub model: Value,
}

impl EmailMessage {
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        model: &impl Serialize,
    ) -> Result<Self, EmailError> {
        let model = serde_json::to_value(model).map_err(|e| EmailError::Model(e.to_string()))?;
        if !model.is_object() {
            return Err(EmailError::Model(format!("got {model}")));
        }
        Ok(Self {
            to: to.into(),
            subject: subject.into(),
            model,
        })
    }
}

/// Sends templated email.
#[async_trait]
pub trait EmailNotification: Send + Sync {
    async fn send_email(&self, message: EmailMessage, template: EmailTemplate) -> Result<(), EmailError>;
}

/// Where messages go.
#[derive(Debug, Clone)]
pub enum EmailTransportSettings {
    Smtp {
        host: String,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        tls: bool,
    },
    /// Each message is written to `<directory>/<id>.eml`
    PickupDirectory(PathBuf),
}

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub from_address: String,
    pub from_name: String,
    pub transport: EmailTransportSettings,
}

enum MailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    Pickup(AsyncFileTransport<Tokio1Executor>),
}

impl MailTransport {
    fn from_settings(settings: &EmailTransportSettings) -> Result<Self, EmailError> {
        match settings {
            EmailTransportSettings::Smtp {
                host,
                port,
                username,
                password,
                tls,
            } => {
                let mut builder = if *tls {
                    AsyncSmtpTransport::<Tokio1Executor>::relay(host).map_err(|e| {
                        EmailError::Configuration(format!("failed to configure SMTP relay: {e}"))
                    })?
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                };
                builder = builder.port(*port);
                if let (Some(username), Some(password)) = (username, password) {
                    builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
                }
                Ok(MailTransport::Smtp(builder.build()))
            }
            EmailTransportSettings::PickupDirectory(directory) => {
                std::fs::create_dir_all(directory).map_err(|e| {
                    EmailError::Configuration(format!(
                        "cannot create pickup directory {}: {e}",
                        directory.display()
                    ))
                })?;
                Ok(MailTransport::Pickup(AsyncFileTransport::<Tokio1Executor>::new(
                    directory,
                )))
            }
        }
    }

    async fn send(&self, message: Message) -> Result<(), EmailError> {
        match self {
            MailTransport::Smtp(transport) => transport
                .send(message)
                .await
                .map(|_| ())
                .map_err(|e| EmailError::Transport(e.to_string())),
            MailTransport::Pickup(transport) => transport
                .send(message)
                .await
                .map(|id| debug!(message_id = %id, "Email written to pickup directory"))
                .map_err(|e| EmailError::Transport(e.to_string())),
        }
    }
}

/// Renders embedded templates and sends multipart/alternative messages.
pub struct EmailNotificationService {
    transport: MailTransport,
    templates: Tera,
    from: Mailbox,
    app_name: String,
}

impl EmailNotificationService {
    pub fn new(settings: &EmailSettings) -> Result<Self, EmailError> {
        let from_address = settings
            .from_address
            .parse()
            .map_err(|e: lettre::address::AddressError| EmailError::InvalidAddress {
                address: settings.from_address.clone(),
                reason: e.to_string(),
            })?;
        let from = Mailbox::new(Some(settings.from_name.clone()), from_address);

        let mut templates = Tera::default();
        for template in EmailTemplate::ALL {
            let (html, text) = template.sources();
            templates.add_raw_template(&template.html_name(), html)?;
            templates.add_raw_template(&template.text_name(), text)?;
        }

        let transport = MailTransport::from_settings(&settings.transport)?;
        let kind = match settings.transport {
            EmailTransportSettings::Smtp { .. } => "smtp",
            EmailTransportSettings::PickupDirectory(_) => "pickup",
        };
        info!(from = %settings.from_address, transport = kind, "Email notifications configured");

        Ok(Self {
            transport,
            templates,
            from,
            app_name: settings.from_name.clone(),
        })
    }

    /// Render the HTML and text parts of a template.
    pub fn render(&self, template: EmailTemplate, model: &Value) -> Result<(String, String), EmailError> {
        let mut context = Context::from_value(model.clone())?;
        if !context.contains_key("app_name") {
            context.insert("app_name", &self.app_name);
        }
        context.insert("current_year", &chrono::Utc::now().year());

        let html = self.templates.render(&template.html_name(), &context)?;
        let text = self.templates.render(&template.text_name(), &context)?;
        Ok((html, text))
    }

    fn build_message(&self, message: &EmailMessage, html: String, text: String) -> Result<Message, EmailError> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e: lettre::address::AddressError| EmailError::InvalidAddress {
                address: message.to.clone(),
                reason: e.to_string(),
            })?;

        Ok(Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .multipart(MultiPart::alternative_plain_html(text, html))?)
    }
}

#[async_trait]
impl EmailNotification for EmailNotificationService {
    async fn send_email(&self, message: EmailMessage, template: EmailTemplate) -> Result<(), EmailError> {
        let (html, text) = self.render(template, &message.model)?;
        let email = self.build_message(&message, html, text)?;

        match self.transport.send(email).await {
            Ok(()) => {
                info!(template = template.name(), "Email sent");
                Ok(())
            }
            Err(e) => {
                error!(template = template.name(), error = %e, "Failed to send email");
                Err(e)
            }
        }
    }
}
