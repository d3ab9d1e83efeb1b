// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Subscription commands and queries.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use utoipa::ToSchema;

use super::mediator::{Handler, Request};
use super::response::{CommandResponse, FieldError};
use super::validation::validate_email_address;
use super::ApplicationError;
use crate::data_protection::{DataProtectionError, DataProtector};
use crate::notifications::{EmailMessage, EmailNotification, EmailTemplate};
use crate::storage::Subscription;
use crate::subscription::{normalize_email, SubscriptionService, UnsubscribeOutcome};

pub const TOKEN_FIELD: &str = "Token";
pub const INVALID_UNSUBSCRIBE_LINK: &str = "The unsubscribe link is invalid or has expired.";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeCommand {
    #[serde(default)]
    pub email_address: String,
}

impl Request for SubscribeCommand {
    type Response = CommandResponse<Subscription>;
    const NAME: &'static str = "SubscribeCommand";
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeCommand {
    #[serde(default)]
    pub email_address: String,
}

impl Request for UnsubscribeCommand {
    type Response = CommandResponse<Subscription>;
    const NAME: &'static str = "UnsubscribeCommand";
}

/// Unsubscribe through the protected link sent in confirmation emails.
#[derive(Debug, Clone, Serialize)]
pub struct UnsubscribeByTokenCommand {
    #[serde(skip_serializing)]
    pub token: String,
}

impl Request for UnsubscribeByTokenCommand {
    type Response = CommandResponse<Subscription>;
    const NAME: &'static str = "UnsubscribeByTokenCommand";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSubscriptionByEmailQuery {
    pub email_address: String,
}

impl Request for GetSubscriptionByEmailQuery {
    type Response = Option<Subscription>;
    const NAME: &'static str = "GetSubscriptionByEmailQuery";
}

#[derive(Serialize)]
struct ConfirmationModel<'a> {
    email_address: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    unsubscribe_url: Option<String>,
}

/// Handles every subscription request.
pub struct SubscriptionHandlers {
    subscriptions: Arc<dyn SubscriptionService>,
    email: Arc<dyn EmailNotification>,
    protector: Arc<DataProtector>,
    base_url: String,
}

impl SubscriptionHandlers {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionService>,
        email: Arc<dyn EmailNotification>,
        protector: Arc<DataProtector>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            subscriptions,
            email,
            protector,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Public link that unsubscribes `email_address` when followed.
    pub fn unsubscribe_url(&self, email_address: &str) -> Result<String, DataProtectionError> {
        let token = self.protector.protect(email_address)?;
        Ok(format!("{}/v1/unsubscribe/{token}", self.base_url))
    }

    async fn send_confirmation(
        &self,
        email_address: &str,
        template: EmailTemplate,
    ) -> Result<(), ApplicationError> {
        let (subject, unsubscribe_url) = match template {
            EmailTemplate::SubscriptionConfirmation => (
                "You're subscribed",
                Some(self.unsubscribe_url(email_address)?),
            ),
            EmailTemplate::UnsubscribeConfirmation => ("You've been unsubscribed", None),
        };
        let model = ConfirmationModel {
            email_address,
            unsubscribe_url,
        };
        let message = EmailMessage::new(email_address, subject, &model)?;
        self.email.send_email(message, template).await?;
        Ok(())
    }

    /// Email failures never fail the command.
    async fn notify(&self, email_address: &str, template: EmailTemplate) {
        if let Err(e) = self.send_confirmation(email_address, template).await {
            warn!(template = template.name(), error = %e, "Confirmation email not sent");
        }
    }

    async fn unsubscribe_address(
        &self,
        email_address: &str,
    ) -> Result<CommandResponse<Subscription>, ApplicationError> {
        match self.subscriptions.unsubscribe(email_address).await? {
            UnsubscribeOutcome::Unsubscribed(subscription) => {
                self.notify(&subscription.email_address, EmailTemplate::UnsubscribeConfirmation)
                    .await;
                Ok(CommandResponse::success(Some(subscription)))
            }
            UnsubscribeOutcome::AlreadyUnsubscribed(subscription) => {
                debug!(subscription_id = %subscription.id, "Address already unsubscribed");
                Ok(CommandResponse::success(Some(subscription)))
            }
            UnsubscribeOutcome::NotSubscribed => Ok(CommandResponse::success(None)),
        }
    }
}

#[async_trait]
impl Handler<SubscribeCommand> for SubscriptionHandlers {
    async fn handle(
        &self,
        command: SubscribeCommand,
    ) -> Result<CommandResponse<Subscription>, ApplicationError> {
        let errors = validate_email_address(&command.email_address);
        if !errors.is_empty() {
            return Ok(CommandResponse::failure(errors));
        }

        let email_address = normalize_email(&command.email_address);
        let outcome = self.subscriptions.subscribe(&email_address).await?;
        if outcome.newly_subscribed {
            self.notify(&email_address, EmailTemplate::SubscriptionConfirmation)
                .await;
        }
        Ok(CommandResponse::success(Some(outcome.subscription)))
    }
}

#[async_trait]
impl Handler<UnsubscribeCommand> for SubscriptionHandlers {
    async fn handle(
        &self,
        command: UnsubscribeCommand,
    ) -> Result<CommandResponse<Subscription>, ApplicationError> {
        let errors = validate_email_address(&command.email_address);
        if !errors.is_empty() {
            return Ok(CommandResponse::failure(errors));
        }
        self.unsubscribe_address(&normalize_email(&command.email_address))
            .await
    }
}

#[async_trait]
impl Handler<UnsubscribeByTokenCommand> for SubscriptionHandlers {
    async fn handle(
        &self,
        command: UnsubscribeByTokenCommand,
    ) -> Result<CommandResponse<Subscription>, ApplicationError> {
        let email_address = match self.protector.unprotect(&command.token) {
            Ok(email_address) => email_address,
            Err(DataProtectionError::InvalidPayload) => {
                return Ok(CommandResponse::failure(vec![
                    FieldError::required_field_missing(TOKEN_FIELD, INVALID_UNSUBSCRIBE_LINK),
                ]));
            }
            Err(e) => return Err(e.into()),
        };
        self.unsubscribe_address(&email_address).await
    }
}

#[async_trait]
impl Handler<GetSubscriptionByEmailQuery> for SubscriptionHandlers {
    async fn handle(
        &self,
        query: GetSubscriptionByEmailQuery,
    ) -> Result<Option<Subscription>, ApplicationError> {
        Ok(self
            .subscriptions
            .get_subscription(&query.email_address)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::Mediator;
    use crate::data_protection::{DataProtectionPurpose, DEFAULT_KEY_LIFETIME};
    use crate::notifications::EmailError;
    use crate::storage::{Database, SubscriptionStatus};
    use crate::subscription::StoredSubscriptionService;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records sent messages instead of delivering them.
    #[derive(Default)]
    struct RecordingEmail {
        sent: Mutex<Vec<(EmailTemplate, EmailMessage)>>,
        fail: bool,
    }

    #[async_trait]
    impl EmailNotification for RecordingEmail {
        async fn send_email(
            &self,
            message: EmailMessage,
            template: EmailTemplate,
        ) -> Result<(), EmailError> {
            if self.fail {
                return Err(EmailError::Transport("smtp down".into()));
            }
            self.sent.lock().unwrap().push((template, message));
            Ok(())
        }
    }

    fn mediator(email: Arc<RecordingEmail>) -> (Mediator<SubscriptionHandlers>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open(&temp_dir.path().join("test.redb")).unwrap());
        let protector = DataProtector::new(
            &[3u8; 32],
            DataProtectionPurpose::RouteValues,
            DEFAULT_KEY_LIFETIME,
        )
        .unwrap();
        let handlers = SubscriptionHandlers::new(
            Arc::new(StoredSubscriptionService::new(db)),
            email,
            Arc::new(protector),
            "https://comms.example.com/",
        );
        (Mediator::new(handlers), temp_dir)
    }

    fn subscribe(email: &str) -> SubscribeCommand {
        SubscribeCommand {
            email_address: email.to_string(),
        }
    }

    #[tokio::test]
    async fn subscribe_validates_email() {
        let email = Arc::new(RecordingEmail::default());
        let (mediator, _dir) = mediator(email.clone());

        let empty = mediator.send(subscribe("")).await.unwrap();
        assert_eq!(
            empty.errors,
            vec![FieldError::required_field_missing(
                "EmailAddress",
                "Email Address cannot be empty."
            )]
        );

        let invalid = mediator.send(subscribe("bogus")).await.unwrap();
        assert_eq!(invalid.errors[0].message, "bogus is not a valid email address");
        assert!(invalid.data.is_none());
        assert!(email.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscribe_sends_confirmation_with_working_unsubscribe_link() {
        let email = Arc::new(RecordingEmail::default());
        let (mediator, _dir) = mediator(email.clone());

        let response = mediator.send(subscribe("Reader@Example.com")).await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.data.unwrap().email_address, "reader@example.com");

        let url = {
            let sent = email.sent.lock().unwrap();
            assert_eq!(sent.len(), 1);
            let (template, message) = &sent[0];
            assert_eq!(*template, EmailTemplate::SubscriptionConfirmation);
            assert_eq!(message.to, "reader@example.com");
            message.model["unsubscribe_url"].as_str().unwrap().to_string()
        };
        let token = url
            .strip_prefix("https://comms.example.com/v1/unsubscribe/")
            .unwrap();

        let response = mediator
            .send(UnsubscribeByTokenCommand {
                token: token.to_string(),
            })
            .await
            .unwrap();
        assert_eq!(response.data.unwrap().status, SubscriptionStatus::Unsubscribed);
        assert_eq!(
            email.sent.lock().unwrap()[1].0,
            EmailTemplate::UnsubscribeConfirmation
        );
    }

    #[tokio::test]
    async fn repeated_subscribe_sends_one_email() {
        let email = Arc::new(RecordingEmail::default());
        let (mediator, _dir) = mediator(email.clone());

        mediator.send(subscribe("reader@example.com")).await.unwrap();
        mediator.send(subscribe("reader@example.com")).await.unwrap();
        assert_eq!(email.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn email_failure_does_not_fail_subscribe() {
        let email = Arc::new(RecordingEmail {
            fail: true,
            ..RecordingEmail::default()
        });
        let (mediator, _dir) = mediator(email);

        let response = mediator.send(subscribe("reader@example.com")).await.unwrap();
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn unsubscribe_unknown_address_succeeds_without_data() {
        let email = Arc::new(RecordingEmail::default());
        let (mediator, _dir) = mediator(email.clone());

        let response = mediator
            .send(UnsubscribeCommand {
                email_address: "nobody@example.com".into(),
            })
            .await
            .unwrap();
        assert!(response.is_success());
        assert!(response.data.is_none());
        assert!(email.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_token_is_a_field_error() {
        let email = Arc::new(RecordingEmail::default());
        let (mediator, _dir) = mediator(email);

        let response = mediator
            .send(UnsubscribeByTokenCommand {
                token: "garbage".into(),
            })
            .await
            .unwrap();
        assert_eq!(response.errors[0].field, TOKEN_FIELD);
        assert_eq!(response.errors[0].message, INVALID_UNSUBSCRIBE_LINK);
    }

    #[tokio::test]
    async fn query_returns_subscription() {
        let email = Arc::new(RecordingEmail::default());
        let (mediator, _dir) = mediator(email);

        assert!(mediator
            .send(GetSubscriptionByEmailQuery {
                email_address: "reader@example.com".into()
            })
            .await
            .unwrap()
            .is_none());

        mediator.send(subscribe("reader@example.com")).await.unwrap();
        let found = mediator
            .send(GetSubscriptionByEmailQuery {
                email_address: "READER@example.com".into(),
            })
            .await
            .unwrap()
            .unwrap();
        assert!(found.is_active());
    }
}
